// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Proto <-> domain conversions for the `SessionService` surface.

use session_manager::{FieldMask, Session, SessionConfig, SessionFilter, SessionStatus};

pub fn status_to_proto(status: SessionStatus) -> i32 {
    let proto_status = match status {
        SessionStatus::Submitted => protos::SessionStatus::Submitted,
        SessionStatus::Running => protos::SessionStatus::Running,
        SessionStatus::Finished => protos::SessionStatus::Finished,
    };
    proto_status as i32
}

fn millis_to_timestamp(millis: u128) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: (millis / 1000) as i64,
        nanos: ((millis % 1000) * 1_000_000) as i32,
    }
}

pub fn session_to_proto(session: &Session) -> protos::SessionDetail {
    protos::SessionDetail {
        session_id: session.session_id.clone(),
        status: status_to_proto(session.status),
        config: session.config.properties.clone(),
        output: Some(protos::SessionOutput {
            properties: session.output.properties.clone(),
            start_time: session.output.started_at_millis.map(millis_to_timestamp),
            end_time: session.output.finished_at_millis.map(millis_to_timestamp),
            error: session.output.error.clone().unwrap_or_default(),
        }),
        client_id: session.client_id.clone().unwrap_or_default(),
        aborted: session.aborted_flag,
    }
}

pub fn field_mask_from_proto(mask: Option<protos::FieldMask>) -> FieldMask {
    match mask {
        Some(mask) if !mask.paths.is_empty() => FieldMask { paths: mask.paths },
        _ => FieldMask::everything(),
    }
}

pub fn filter_from_proto(filter: Option<protos::SessionFilter>) -> SessionFilter {
    let Some(filter) = filter else {
        return SessionFilter::default();
    };
    SessionFilter {
        status_regex: (!filter.status_regex.is_empty()).then_some(filter.status_regex),
        client_id_include: (!filter.client_id_include.is_empty()).then_some(filter.client_id_include),
        included_properties: filter.included_session_property,
        excluded_property_keys: filter.excluded_session_property_key,
    }
}

pub fn config_from_proto(config: std::collections::HashMap<String, String>) -> SessionConfig {
    SessionConfig { properties: config }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_field_mask_becomes_everything() {
        let mask = field_mask_from_proto(None);
        assert!(mask.paths.is_empty());
    }

    #[test]
    fn empty_status_regex_becomes_none() {
        let filter = filter_from_proto(Some(protos::SessionFilter {
            status_regex: String::new(),
            client_id_include: String::new(),
            client_id_exclude: Vec::new(),
            included_session_property: std::collections::HashMap::new(),
            excluded_session_property_key: Vec::new(),
        }));
        assert!(filter.status_regex.is_none());
        assert!(filter.client_id_include.is_none());
    }
}

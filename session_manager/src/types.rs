// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

/// A session's monotonic lifecycle stage (spec §3 "Monotonic status; terminal status is
/// permanent"). Ordered: `Submitted < Running < Finished`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum SessionStatus {
    Submitted,
    Running,
    Finished,
}

impl SessionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Submitted => "SUBMITTED",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Finished => "FINISHED",
        }
    }
}

/// The opaque client-supplied session configuration (spec §3 `Session.config`).
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct SessionConfig {
    pub properties: HashMap<String, String>,
}

/// Terminal (or in-progress) output of a session's execution (spec §3 `Session.output`).
#[derive(Clone, Default, Debug)]
pub struct SessionOutput {
    pub properties: HashMap<String, String>,
    pub started_at_millis: Option<u128>,
    pub finished_at_millis: Option<u128>,
    pub error: Option<String>,
}

/// A full session record (spec §3 `Session`).
#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: String,
    pub config: SessionConfig,
    pub status: SessionStatus,
    pub output: SessionOutput,
    pub client_id: Option<String>,
    pub aborted_flag: bool,
}

impl Session {
    pub fn new(session_id: String, config: SessionConfig, client_id: Option<String>) -> Session {
        Session {
            session_id,
            config,
            status: SessionStatus::Submitted,
            output: SessionOutput::default(),
            client_id,
            aborted_flag: false,
        }
    }
}

pub(crate) fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis()
}

/// A selector over `Session`'s top-level fields, named the way `core.proto`'s `SessionDetail`
/// names them (spec §4.3 "Field masks"). A nil/empty mask means "everything" (spec §4.3 "MUST
/// tolerate a nil mask").
#[derive(Clone, Default, Debug)]
pub struct FieldMask {
    pub paths: Vec<String>,
}

impl FieldMask {
    pub fn everything() -> FieldMask {
        FieldMask { paths: Vec::new() }
    }

    fn wants(&self, field: &str) -> bool {
        self.paths.is_empty() || self.paths.iter().any(|p| p == field)
    }

    /// Applies this mask to `session`, zeroing every field not named (spec §4.3 "apply the mask
    /// before trimming the returned record"). `session_id` always survives: a record with no
    /// identity is not a meaningful partial view.
    pub fn apply(&self, session: &Session) -> Session {
        let mut trimmed = Session::new(
            session.session_id.clone(),
            SessionConfig::default(),
            None,
        );
        trimmed.status = if self.wants("status") {
            session.status
        } else {
            SessionStatus::Submitted
        };
        if self.wants("config") {
            trimmed.config = session.config.clone();
        }
        if self.wants("output") {
            trimmed.output = session.output.clone();
        }
        if self.wants("client_id") {
            trimmed.client_id = session.client_id.clone();
        }
        if self.wants("aborted_flag") {
            trimmed.aborted_flag = session.aborted_flag;
        }
        trimmed
    }
}

/// The closed filter set of spec §4.3 "Filter semantics".
#[derive(Clone, Default, Debug)]
pub struct SessionFilter {
    pub status_regex: Option<String>,
    pub client_id_include: Option<String>,
    pub included_properties: HashMap<String, String>,
    pub excluded_property_keys: Vec<String>,
}

impl SessionFilter {
    /// A session matches iff every clause of spec §4.3 "Filter semantics" holds.
    pub fn matches(&self, session: &Session) -> bool {
        if let Some(pattern) = &self.status_regex {
            if !pattern.is_empty() {
                let matches_status = Regex::new(&format!("^(?:{pattern})$"))
                    .map(|re| re.is_match(session.status.name()))
                    .unwrap_or(false);
                if !matches_status {
                    return false;
                }
            }
        }

        for (key, value) in &self.included_properties {
            if session.config.properties.get(key) != Some(value) {
                return false;
            }
        }

        for key in &self.excluded_property_keys {
            if session.config.properties.contains_key(key) {
                return false;
            }
        }

        if let Some(client_id) = &self.client_id_include {
            if session.client_id.as_deref() != Some(client_id.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Errors raised by `SessionManager`'s operations (spec §7's `NOT_FOUND`/`INVALID_ARGUMENT`
/// surface, kept local to this crate and mapped to `grpc_util::CoreError` at the RPC boundary).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionManagerError {
    NotFound(String),
    InvalidArgument(String),
}

impl std::fmt::Display for SessionManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionManagerError::NotFound(id) => write!(f, "no such session: {id}"),
            SessionManagerError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for SessionManagerError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(status: SessionStatus, client_id: Option<&str>) -> Session {
        let mut s = Session::new("s1".to_owned(), SessionConfig::default(), client_id.map(String::from));
        s.status = status;
        s
    }

    #[test]
    fn field_mask_everything_is_a_nil_mask() {
        let mut session = session(SessionStatus::Running, Some("client-x"));
        session.config.properties.insert("k".to_owned(), "v".to_owned());
        let trimmed = FieldMask::everything().apply(&session);
        assert_eq!(trimmed.status, SessionStatus::Running);
        assert_eq!(trimmed.client_id.as_deref(), Some("client-x"));
    }

    #[test]
    fn field_mask_trims_unselected_fields() {
        let mut session = session(SessionStatus::Running, Some("client-x"));
        session.config.properties.insert("k".to_owned(), "v".to_owned());
        let mask = FieldMask {
            paths: vec!["status".to_owned()],
        };
        let trimmed = mask.apply(&session);
        assert_eq!(trimmed.status, SessionStatus::Running);
        assert!(trimmed.client_id.is_none());
        assert!(trimmed.config.properties.is_empty());
    }

    #[test]
    fn filter_matches_on_status_regex_full_match() {
        let filter = SessionFilter {
            status_regex: Some("RUNNING|FINISHED".to_owned()),
            ..Default::default()
        };
        assert!(filter.matches(&session(SessionStatus::Running, None)));
        assert!(!filter.matches(&session(SessionStatus::Submitted, None)));
    }

    #[test]
    fn filter_excludes_sessions_carrying_an_excluded_property_key() {
        let mut session = session(SessionStatus::Running, None);
        session.config.properties.insert("secret".to_owned(), "1".to_owned());
        let filter = SessionFilter {
            excluded_property_keys: vec!["secret".to_owned()],
            ..Default::default()
        };
        assert!(!filter.matches(&session));
    }

    #[test]
    fn filter_requires_client_id_include_to_match_exactly() {
        let filter = SessionFilter {
            client_id_include: Some("client-x".to_owned()),
            ..Default::default()
        };
        assert!(filter.matches(&session(SessionStatus::Running, Some("client-x"))));
        assert!(!filter.matches(&session(SessionStatus::Running, Some("client-y"))));
        assert!(!filter.matches(&session(SessionStatus::Running, None)));
    }
}

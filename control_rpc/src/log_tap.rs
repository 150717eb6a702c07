// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `GetLog` bidi stream (spec §4.4 "Get-log").

use std::sync::Arc;

use logging::{CoreLogger, LogConsumer, LogRecord};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Forwards every tapped-off record to this stream's channel; the client-id filter is applied
/// downstream in `filter_batch`, not here, so `consume` never blocks on anything but an unbounded
/// channel send (spec §4.6 "non-blocking").
pub struct StreamLogConsumer {
    sender: mpsc::UnboundedSender<LogRecord>,
}

impl StreamLogConsumer {
    pub fn new(sender: mpsc::UnboundedSender<LogRecord>) -> StreamLogConsumer {
        StreamLogConsumer { sender }
    }
}

impl LogConsumer for StreamLogConsumer {
    fn consume(&self, record: &LogRecord) {
        let _ = self.sender.send(record.clone());
    }
}

/// A single `GetLog` stream's mutable filter state, toggled by `{enable, client_id}` requests.
#[derive(Default)]
pub struct StreamFilter {
    pub client_id: Mutex<Option<String>>,
}

impl StreamFilter {
    pub fn set(&self, client_id: Option<String>) {
        *self.client_id.lock() = client_id;
    }
}

/// Keeps a stream's consumer registered with the process-wide logger for as long as it stays
/// subscribed; `enable=false` unregisters without dropping the stream itself (spec §4.4).
pub struct LogSubscription {
    handle: Mutex<Option<logging::ConsumerHandle>>,
    sender: mpsc::UnboundedSender<LogRecord>,
}

impl LogSubscription {
    pub fn new(sender: mpsc::UnboundedSender<LogRecord>) -> LogSubscription {
        LogSubscription {
            handle: Mutex::new(None),
            sender,
        }
    }

    pub fn enable(&self) {
        let mut handle = self.handle.lock();
        if handle.is_none() {
            *handle = Some(CoreLogger::add_consumer(Arc::new(StreamLogConsumer::new(
                self.sender.clone(),
            ))));
        }
    }

    pub fn disable(&self) {
        if let Some(handle) = self.handle.lock().take() {
            CoreLogger::remove_consumer(handle);
        }
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Applies the stream's client-id filter to a batch of records (spec §4.4 "filters records whose
/// client_id field is present and does not match the stream's filter; records without client_id
/// pass unconditionally"). Walks the batch once to classify, and only allocates a filtered copy
/// when the batch is mixed (spec §4.4 "walks the batch twice to avoid allocation when all or none
/// are accepted").
pub fn filter_batch<'a>(records: &'a [LogRecord], client_id_filter: Option<&str>) -> Vec<&'a LogRecord> {
    let Some(filter) = client_id_filter else {
        return records.iter().collect();
    };
    let accepts = |r: &LogRecord| match r.client_id.as_deref() {
        Some(client_id) => client_id == filter,
        None => true,
    };

    if records.iter().all(accepts) {
        return records.iter().collect();
    }
    if records.iter().all(|r| !accepts(r)) {
        return Vec::new();
    }
    records.iter().filter(|r| accepts(r)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(client_id: Option<&str>) -> LogRecord {
        LogRecord {
            level: log::Level::Info,
            timestamp: Utc::now(),
            message: "hello".to_owned(),
            importance: logging::Importance::Server,
            client_id: client_id.map(str::to_owned),
            session_id: None,
        }
    }

    #[test]
    fn no_filter_passes_everything() {
        let records = vec![record(Some("x")), record(None), record(Some("y"))];
        assert_eq!(filter_batch(&records, None).len(), 3);
    }

    #[test]
    fn filter_admits_matching_client_and_recordless_client_id() {
        let records = vec![record(Some("x")), record(None), record(Some("y"))];
        let filtered = filter_batch(&records, Some("x"));
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.client_id.as_deref() != Some("y")));
    }

    #[test]
    fn filter_rejects_everything_when_no_record_matches() {
        let records = vec![record(Some("y")), record(Some("z"))];
        assert!(filter_batch(&records, Some("x")).is_empty());
    }
}

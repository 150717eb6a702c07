// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The default monitor sink and batch callbacks (spec §4.6). The concrete cloud log/metric
//! publisher is an external collaborator out of this core's scope (spec §1 "Non-goals"); this
//! sink logs each batch's canonical JSON instead, so the pipeline has somewhere real to publish
//! to until a network sink is wired in.

use async_trait::async_trait;
use monitor::{BatchFailureCallback, BatchSuccessCallback, MonitorMessage, MonitorSink};

pub struct LoggingMonitorSink;

#[async_trait]
impl MonitorSink for LoggingMonitorSink {
    async fn publish(&self, batch: &[MonitorMessage]) -> Result<Vec<String>, String> {
        let mut ids = Vec::with_capacity(batch.len());
        for message in batch {
            let json = message.to_canonical_json()?;
            log::info!("monitor: {json}");
            ids.push(message.entity_id.clone());
        }
        Ok(ids)
    }
}

pub struct LoggingBatchCallbacks;

impl BatchSuccessCallback for LoggingBatchCallbacks {
    fn on_success(&self, batch: &[MonitorMessage], ids: &[String]) {
        log::debug!("monitor: published {} messages ({:?})", batch.len(), ids);
    }
}

impl BatchFailureCallback for LoggingBatchCallbacks {
    fn on_failure(&self, batch: &[MonitorMessage], cause: &str) {
        log::warn!("monitor: failed to publish {} messages: {cause}", batch.len());
    }
}

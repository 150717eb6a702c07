// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

/// One host- or device-level fact, canonically serialized with sorted attribute keys so that
/// identical snapshots always produce byte-identical JSON (spec §4.6 "canonical JSON").
#[derive(Clone, Debug, Serialize)]
pub struct MonitorMessage {
    pub entity_id: String,
    pub timestamp_millis: i64,
    pub attributes: BTreeMap<String, String>,
}

impl MonitorMessage {
    /// Approximate wire size used for the 9 MiB batch cap (spec §4.6); exact enough since the
    /// cap exists to bound request size, not to account a byte precisely.
    pub fn approximate_size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    pub fn to_canonical_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("failed to serialize monitor message: {e}"))
    }
}

/// A snapshot of the fleet at one instant: one host entry plus zero or more device entries.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub host: MonitorMessage,
    pub devices: Vec<MonitorMessage>,
}

impl Snapshot {
    pub fn into_messages(self) -> Vec<MonitorMessage> {
        let mut messages = vec![self.host];
        messages.extend(self.devices);
        messages
    }
}

/// The external collaborator that produces snapshots (spec §4.6 "periodically pull() a
/// snapshot"); a concrete implementation talks to the lab/device inventory.
#[async_trait]
pub trait Puller: Send + Sync {
    async fn pull(&self) -> Result<Snapshot, String>;
}

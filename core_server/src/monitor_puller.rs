// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Turns the scheduler's live device inventory and fairness counters into the monitor pipeline's
//! periodic snapshot (spec §4.6, SPEC_FULL §2 "Scheduler fairness counters").

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use allocation_store::PersistenceAdapter;
use async_trait::async_trait;
use monitor::{MonitorMessage, Puller, Snapshot};
use scheduler::Scheduler;

pub struct SchedulerPuller<P: PersistenceAdapter> {
    scheduler: Arc<Scheduler<P>>,
    host_name: String,
}

impl<P: PersistenceAdapter> SchedulerPuller<P> {
    pub fn new(scheduler: Arc<Scheduler<P>>, host_name: String) -> SchedulerPuller<P> {
        SchedulerPuller { scheduler, host_name }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl<P: PersistenceAdapter> Puller for SchedulerPuller<P> {
    async fn pull(&self) -> Result<Snapshot, String> {
        let timestamp_millis = now_millis();
        let fairness = self.scheduler.fairness_snapshot();

        let mut host_attributes = BTreeMap::new();
        host_attributes.insert("job_count".to_owned(), fairness.len().to_string());
        let total_placements: u64 = fairness.values().map(|c| c.placements).sum();
        let total_starves: u64 = fairness.values().map(|c| c.starves).sum();
        host_attributes.insert("total_placements".to_owned(), total_placements.to_string());
        host_attributes.insert("total_starves".to_owned(), total_starves.to_string());

        let host = MonitorMessage {
            entity_id: self.host_name.clone(),
            timestamp_millis,
            attributes: host_attributes,
        };

        let devices = self
            .scheduler
            .devices_snapshot()
            .into_iter()
            .map(|device| {
                let mut attributes = BTreeMap::new();
                attributes.insert("lab_ip".to_owned(), device.lab_ip.clone());
                attributes.insert("status".to_owned(), format!("{:?}", device.status));
                attributes.insert("types".to_owned(), device.types.join(","));
                attributes.extend(device.dimensions.clone());
                MonitorMessage {
                    entity_id: device.universal_id.clone(),
                    timestamp_millis,
                    attributes,
                }
            })
            .collect();

        Ok(Snapshot { host, devices })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use allocation_store::{AllocationStore, NoopPersistence};
    use scheduler::EventBus;

    use super::*;

    #[tokio::test]
    async fn pull_reports_devices_and_fairness_totals() {
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(AllocationStore::new(NoopPersistence)),
            Arc::new(EventBus::new()),
        ));
        scheduler.upsert_device(
            testutil::device("d1", "lab-1", &["phone"]),
            testutil::lab("lab-1"),
        );

        let puller = SchedulerPuller::new(scheduler, "core-host".to_owned());
        let snapshot = puller.pull().await.unwrap();

        assert_eq!(snapshot.host.entity_id, "core-host");
        assert_eq!(snapshot.devices.len(), 1);
        assert_eq!(snapshot.devices[0].entity_id, "d1");
    }
}

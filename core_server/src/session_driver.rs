// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The production `SessionDriver` (spec §4.3 "Execution"): turns a session's opaque config into
//! job/test configs via the planner, and submits them to the scheduler. The concrete device
//! driver that would actually run a test is an external collaborator out of this core's scope
//! (spec §1 "Non-goals"); this driver's job ends once the work is placed in the scheduler's care.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use allocation_store::PersistenceAdapter;
use async_latch::AsyncLatch;
use async_trait::async_trait;
use planner::{DeviceSelection, ModuleFilterClause, SessionRequestInfo};
use scheduler::{Scheduler, Test};
use session_manager::{SessionConfig, SessionDriver, SessionOutput};

pub struct PlannerSchedulerDriver<P: PersistenceAdapter> {
    scheduler: Arc<Scheduler<P>>,
    xts_root: PathBuf,
}

impl<P: PersistenceAdapter> PlannerSchedulerDriver<P> {
    pub fn new(scheduler: Arc<Scheduler<P>>, xts_root: PathBuf) -> PlannerSchedulerDriver<P> {
        PlannerSchedulerDriver { scheduler, xts_root }
    }
}

fn bool_property(properties: &HashMap<String, String>, key: &str, default: bool) -> bool {
    properties
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn request_info_from(config: &SessionConfig) -> SessionRequestInfo {
    let properties = &config.properties;
    let module_filters = properties
        .get("modules")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(|module| ModuleFilterClause {
                    module: module.to_owned(),
                    test_name: None,
                    exclude: false,
                })
                .collect()
        })
        .unwrap_or_default();

    SessionRequestInfo {
        device_type: properties.get("device_type").cloned().unwrap_or_default(),
        device_selection: DeviceSelection::default(),
        shard_count: properties
            .get("shard_count")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        module_sharding_enabled: bool_property(properties, "module_sharding_enabled", false),
        test_name: properties.get("test_name").cloned(),
        plan: properties.get("plan").cloned().unwrap_or_default(),
        is_tradefed: bool_property(properties, "is_tradefed", true),
        driver: properties.get("driver").cloned().unwrap_or_else(|| "tradefed".to_owned()),
        run_as_user: properties.get("run_as_user").cloned(),
        explicit_job_timeout: None,
        explicit_start_timeout: None,
        module_filters,
        static_mcts_modules: Vec::new(),
        params: properties.clone(),
    }
}

#[async_trait]
impl<P: PersistenceAdapter> SessionDriver for PlannerSchedulerDriver<P> {
    async fn run(&self, session_id: &str, config: &SessionConfig, _abort: AsyncLatch) -> SessionOutput {
        let request = request_info_from(config);
        let devices = self.scheduler.devices_snapshot();

        let planned = match planner::plan(&request, &self.xts_root, &devices, |_| Vec::new()) {
            Ok(planned) => planned,
            Err(e) => {
                return SessionOutput {
                    error: Some(format!("planning failed: {e}")),
                    ..Default::default()
                };
            }
        };

        let mut job_ids = Vec::with_capacity(planned.len());
        for planned_job in planned {
            let job_id = planned_job.job.job_id.clone();
            if let Err(e) = self.scheduler.add_job(planned_job.job) {
                log::warn!("session {session_id}: failed to submit job {job_id}: {e}");
                continue;
            }
            if let Err(e) = self.scheduler.add_test(Test {
                test_id: job_id.clone(),
                job_id: job_id.clone(),
            }) {
                log::warn!("session {session_id}: failed to submit test for job {job_id}: {e}");
                continue;
            }
            job_ids.push(job_id);
        }

        SessionOutput {
            properties: HashMap::from([
                ("job_ids".to_owned(), job_ids.join(",")),
                ("planned_job_count".to_owned(), job_ids.len().to_string()),
            ]),
            started_at_millis: None,
            finished_at_millis: None,
            error: None,
        }
    }
}

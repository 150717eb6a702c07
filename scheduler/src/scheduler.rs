// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The scheduler control loop and mutation operations (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use allocation_store::{Allocation, AllocationStore, DeviceLocator, PersistenceAdapter, TestLocator};
use async_latch::AsyncLatch;
use parking_lot::RwLock;

use crate::event_bus::EventBus;
use crate::placement::{self, AdhocTestbedMatcher, GreedyAdhocTestbedMatcher, PlacementStrategy};
use crate::types::{AllocationEvent, Device, DeviceStatus, Job, Lab, SchedulerError, Test};

/// How long a pass sleeps after finding nothing to allocate (spec §4.2 "~50 ms").
const IDLE_PASS_SLEEP: StdDuration = StdDuration::from_millis(50);
/// How long the loop yields between jobs within a pass (spec §4.2 "~10 ms").
const INTER_JOB_YIELD: StdDuration = StdDuration::from_millis(10);

struct State {
    labs: HashMap<String, Lab>,
    devices: HashMap<DeviceLocator, Device>,
    jobs: HashMap<String, Job>,
    /// Tests in arrival order per job, so the control loop always considers "the first test
    /// whose id is not in the allocation store" (spec §4.2).
    tests: HashMap<String, Vec<Test>>,
    fairness: HashMap<String, FairnessCounters>,
}

/// Per-job placement/starve counts, surfaced to the monitor pipeline's periodic pull so the
/// non-starvation guarantee of spec §4.2 is observable from outside the process (SPEC_FULL §2).
#[derive(Clone, Copy, Default, Debug)]
pub struct FairnessCounters {
    pub placements: u64,
    pub starves: u64,
}

/// The single control loop and mutable device/job/test state of spec §4.2, parameterized over the
/// allocation store's persistence adapter exactly as `AllocationStore<P>` is.
pub struct Scheduler<P: PersistenceAdapter> {
    allocation_store: Arc<AllocationStore<P>>,
    event_bus: Arc<EventBus>,
    state: RwLock<State>,
    strategy: PlacementStrategy,
    adhoc_matcher: Arc<dyn AdhocTestbedMatcher>,
    interrupt: AsyncLatch,
}

impl<P: PersistenceAdapter> Scheduler<P> {
    pub fn new(allocation_store: Arc<AllocationStore<P>>, event_bus: Arc<EventBus>) -> Scheduler<P> {
        Scheduler {
            allocation_store,
            event_bus,
            state: RwLock::new(State {
                labs: HashMap::new(),
                devices: HashMap::new(),
                jobs: HashMap::new(),
                tests: HashMap::new(),
                fairness: HashMap::new(),
            }),
            strategy: PlacementStrategy::default(),
            adhoc_matcher: Arc::new(GreedyAdhocTestbedMatcher),
            interrupt: AsyncLatch::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: PlacementStrategy) -> Scheduler<P> {
        self.strategy = strategy;
        self
    }

    pub fn with_adhoc_matcher(mut self, matcher: Arc<dyn AdhocTestbedMatcher>) -> Scheduler<P> {
        self.adhoc_matcher = matcher;
        self
    }

    /// Signals the control loop to exit after its current pass, leaving the allocation store
    /// intact (spec §4.2 "on interruption, exit the loop but leave the store intact").
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }

    // ---- Mutation operations (spec §4.2 "Mutation operations") ----

    pub fn add_job(&self, job: Job) -> Result<(), SchedulerError> {
        let mut state = self.state.write();
        if state.jobs.contains_key(&job.job_id) {
            return Err(SchedulerError::JobDuplicated(job.job_id));
        }
        state.tests.insert(job.job_id.clone(), Vec::new());
        state.fairness.insert(job.job_id.clone(), FairnessCounters::default());
        state.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    /// Removes the job; for each of its tests with an allocation, calls `unallocate` (spec §4.2).
    pub async fn remove_job(
        &self,
        job_id: &str,
        remove_devices: bool,
    ) -> Result<(), SchedulerError> {
        let tests = {
            let mut state = self.state.write();
            if state.jobs.remove(job_id).is_none() {
                return Err(SchedulerError::JobNotFound(job_id.to_owned()));
            }
            state.tests.remove(job_id).unwrap_or_default()
        };

        for test in tests {
            if let Some(alloc) = self.allocation_store.by_test(&test.locator()) {
                self.unallocate(&alloc, remove_devices, false).await;
            }
        }
        Ok(())
    }

    pub fn add_test(&self, test: Test) -> Result<(), SchedulerError> {
        let mut state = self.state.write();
        if !state.jobs.contains_key(&test.job_id) {
            return Err(SchedulerError::JobNotFound(test.job_id));
        }
        let tests = state.tests.entry(test.job_id.clone()).or_default();
        if tests.iter().any(|t| t.test_id == test.test_id) {
            return Err(SchedulerError::TestDuplicated(test.job_id, test.test_id));
        }
        tests.push(test);
        Ok(())
    }

    /// Ensures the lab, replaces/updates the device record (spec §4.2).
    pub fn upsert_device(&self, device: Device, lab: Lab) {
        let mut state = self.state.write();
        state.labs.entry(lab.ip.clone()).or_insert(lab);
        state.devices.insert(device.universal_id.clone(), device);
    }

    /// Looks up the allocation by device; if none and `remove_devices`, removes the device record;
    /// otherwise delegates to the allocation-centric variant (spec §4.2).
    pub async fn unallocate_device(
        &self,
        device: &DeviceLocator,
        remove_devices: bool,
        close_test: bool,
    ) {
        match self.allocation_store.by_device(device) {
            Some(alloc) => self.unallocate(&alloc, remove_devices, close_test).await,
            None => {
                if remove_devices {
                    self.state.write().devices.remove(device);
                }
            }
        }
    }

    /// Releases the allocation via the allocation store; depending on flags, also removes the
    /// device records and/or the test (spec §4.2).
    pub async fn unallocate(&self, alloc: &Allocation, remove_devices: bool, close_test: bool) {
        self.allocation_store.remove_by_test(&alloc.test).await;

        let mut state = self.state.write();
        if remove_devices {
            for device in &alloc.devices {
                state.devices.remove(device);
            }
        }
        if close_test {
            if let Some(tests) = state.tests.get_mut(&alloc.test.job_id) {
                tests.retain(|t| t.test_id != alloc.test.test_id);
            }
        }
    }

    /// A point-in-time copy of every known device, for the monitor pipeline's periodic pull
    /// (spec §4.6) and for the planner's device-selection pass (spec §4.5).
    pub fn devices_snapshot(&self) -> Vec<Device> {
        self.state.read().devices.values().cloned().collect()
    }

    pub fn labs_snapshot(&self) -> Vec<Lab> {
        self.state.read().labs.values().cloned().collect()
    }

    pub fn fairness_snapshot(&self) -> HashMap<String, FairnessCounters> {
        self.state.read().fairness.clone()
    }

    // ---- Control loop (spec §4.2 "Control loop") ----

    /// Runs the control loop until `interrupt()` is called. Never panics: allocation failures are
    /// caught and logged, never fatal to the loop (spec §4.2 "Failure semantics").
    pub async fn run(&self) {
        loop {
            if self.interrupt.poll_triggered() {
                return;
            }

            let job_ids: Vec<String> = self.state.read().jobs.keys().cloned().collect();
            let mut allocated_this_pass = false;

            for job_id in job_ids {
                if self.interrupt.poll_triggered() {
                    return;
                }

                match self.try_place_next_test(&job_id).await {
                    Ok(true) => allocated_this_pass = true,
                    Ok(false) => {}
                    Err(e) => log::warn!("scheduler pass failed for job {job_id}: {e}"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(INTER_JOB_YIELD) => {}
                    _ = self.interrupt.triggered() => return,
                }
            }

            if !allocated_this_pass {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_PASS_SLEEP) => {}
                    _ = self.interrupt.triggered() => return,
                }
            }
        }
    }

    /// Considers only the first test of `job_id` that has no allocation yet (spec §4.2
    /// "rotating"). Returns `Ok(true)` if it placed an allocation this call.
    async fn try_place_next_test(&self, job_id: &str) -> Result<bool, SchedulerError> {
        let Some((job, test)) = self.next_unallocated_test(job_id) else {
            return Ok(false);
        };
        let placed = self.place(&job, &test).await;
        let mut state = self.state.write();
        let counters = state.fairness.entry(job_id.to_owned()).or_default();
        if placed {
            counters.placements += 1;
        } else {
            counters.starves += 1;
        }
        Ok(placed)
    }

    fn next_unallocated_test(&self, job_id: &str) -> Option<(Job, Test)> {
        let state = self.state.read();
        let job = state.jobs.get(job_id)?.clone();
        let test = state
            .tests
            .get(job_id)?
            .iter()
            .find(|t| !self.allocation_store.has_test(&t.locator()))?
            .clone();
        Some((job, test))
    }

    /// Attempts to place `test`, double-checking every precondition immediately before the
    /// allocation-store write (spec §4.2 "Double-check on placement").
    async fn place(&self, job: &Job, test: &Test) -> bool {
        let candidate = if job.is_adhoc() {
            self.plan_adhoc_allocation(job)
        } else {
            self.plan_single_device_allocation(job)
        };
        let Some((devices, lab_ip)) = candidate else {
            return false;
        };

        if !self.revalidate(job, test, &devices, &lab_ip) {
            return false;
        }

        let alloc = Allocation::new(test.locator(), devices.clone(), lab_ip.clone());
        if !self.allocation_store.add(alloc).await {
            return false;
        }

        self.event_bus.publish(&AllocationEvent {
            test: test.locator(),
            devices,
            lab_ip,
        });
        true
    }

    fn plan_single_device_allocation(&self, job: &Job) -> Option<(Vec<DeviceLocator>, String)> {
        let state = self.state.read();
        let candidates: Vec<&Device> = state
            .devices
            .values()
            .filter(|d| !self.allocation_store.has_device(&d.universal_id))
            .collect();
        let picked = placement::pick_single_device(job, candidates, self.strategy)?;
        Some((vec![picked.universal_id.clone()], picked.lab_ip.clone()))
    }

    fn plan_adhoc_allocation(&self, job: &Job) -> Option<(Vec<DeviceLocator>, String)> {
        let state = self.state.read();
        for lab in state.labs.keys() {
            let candidates: Vec<Device> = state
                .devices
                .values()
                .filter(|d| {
                    &d.lab_ip == lab
                        && d.is_idle()
                        && !self.allocation_store.has_device(&d.universal_id)
                        && job.is_adhoc_candidate(d)
                })
                .cloned()
                .collect();
            if candidates.is_empty() {
                continue;
            }
            if let Some(devices) = self.adhoc_matcher.match_devices(job, &candidates) {
                return Some((devices, lab.clone()));
            }
        }
        None
    }

    fn revalidate(&self, job: &Job, test: &Test, devices: &[DeviceLocator], lab_ip: &str) -> bool {
        let state = self.state.read();
        if !state.jobs.contains_key(&job.job_id) {
            return false;
        }
        if !state
            .tests
            .get(&test.job_id)
            .is_some_and(|tests| tests.iter().any(|t| t.test_id == test.test_id))
        {
            return false;
        }
        if !state.labs.contains_key(lab_ip) {
            return false;
        }
        devices.iter().all(|locator| {
            state
                .devices
                .get(locator)
                .is_some_and(|d| d.lab_ip == lab_ip && d.is_idle())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use allocation_store::NoopPersistence;
    use concrete_time::Duration;

    use super::*;
    use crate::types::JobTimeouts;

    fn scheduler() -> Scheduler<NoopPersistence> {
        Scheduler::new(
            Arc::new(AllocationStore::new(NoopPersistence)),
            Arc::new(EventBus::new()),
        )
    }

    fn lab(ip: &str) -> Lab {
        Lab {
            ip: ip.to_owned(),
            host_name: "host".to_owned(),
            labels: Vec::new(),
        }
    }

    fn device(id: &str, lab_ip: &str, types: &[&str]) -> Device {
        Device {
            device_id: id.to_owned(),
            lab_ip: lab_ip.to_owned(),
            universal_id: id.to_owned(),
            types: types.iter().map(|t| (*t).to_owned()).collect(),
            owners: Vec::new(),
            dimensions: StdHashMap::new(),
            status: DeviceStatus::Idle,
        }
    }

    fn job(id: &str, required_device_type: Option<&str>) -> Job {
        Job {
            job_id: id.to_owned(),
            exec_mode: "single".to_owned(),
            driver: "driver".to_owned(),
            params: StdHashMap::new(),
            sub_device_specs: Vec::new(),
            timeouts: JobTimeouts {
                job: Duration::from_secs(60),
                test: Duration::from_secs(60),
                start: Duration::from_secs(60),
            },
            priority: 0,
            attempts: 0,
            run_as_user: None,
            required_device_type: required_device_type.map(|s| s.to_owned()),
        }
    }

    #[tokio::test]
    async fn places_single_device_test_and_fires_event() {
        let scheduler = scheduler();
        scheduler.upsert_device(device("d1", "lab-1", &["A"]), lab("lab-1"));
        scheduler.add_job(job("job-1", Some("A"))).unwrap();
        scheduler
            .add_test(Test {
                test_id: "t1".to_owned(),
                job_id: "job-1".to_owned(),
            })
            .unwrap();

        let placed = scheduler.try_place_next_test("job-1").await.unwrap();
        assert!(placed);
        assert!(scheduler.allocation_store.has_device(&"d1".to_owned()));
    }

    #[tokio::test]
    async fn placement_fails_gracefully_with_no_matching_device() {
        let scheduler = scheduler();
        scheduler.upsert_device(device("d1", "lab-1", &["B"]), lab("lab-1"));
        scheduler.add_job(job("job-1", Some("A"))).unwrap();
        scheduler
            .add_test(Test {
                test_id: "t1".to_owned(),
                job_id: "job-1".to_owned(),
            })
            .unwrap();

        let placed = scheduler.try_place_next_test("job-1").await.unwrap();
        assert!(!placed);
    }

    #[tokio::test]
    async fn add_job_rejects_duplicate() {
        let scheduler = scheduler();
        scheduler.add_job(job("job-1", None)).unwrap();
        let err = scheduler.add_job(job("job-1", None)).unwrap_err();
        assert_eq!(err, SchedulerError::JobDuplicated("job-1".to_owned()));
    }

    #[tokio::test]
    async fn add_test_rejects_duplicate_and_missing_job() {
        let scheduler = scheduler();
        assert!(matches!(
            scheduler.add_test(Test {
                test_id: "t1".to_owned(),
                job_id: "missing".to_owned(),
            }),
            Err(SchedulerError::JobNotFound(_))
        ));

        scheduler.add_job(job("job-1", None)).unwrap();
        scheduler
            .add_test(Test {
                test_id: "t1".to_owned(),
                job_id: "job-1".to_owned(),
            })
            .unwrap();
        assert!(matches!(
            scheduler.add_test(Test {
                test_id: "t1".to_owned(),
                job_id: "job-1".to_owned(),
            }),
            Err(SchedulerError::TestDuplicated(_, _))
        ));
    }

    #[tokio::test]
    async fn remove_job_unallocates_its_tests() {
        let scheduler = scheduler();
        scheduler.upsert_device(device("d1", "lab-1", &["A"]), lab("lab-1"));
        scheduler.add_job(job("job-1", Some("A"))).unwrap();
        scheduler
            .add_test(Test {
                test_id: "t1".to_owned(),
                job_id: "job-1".to_owned(),
            })
            .unwrap();
        scheduler.try_place_next_test("job-1").await.unwrap();
        assert!(scheduler.allocation_store.has_device(&"d1".to_owned()));

        scheduler.remove_job("job-1", false).await.unwrap();
        assert!(!scheduler.allocation_store.has_device(&"d1".to_owned()));
    }

    #[tokio::test]
    async fn fairness_counters_track_placements_and_starves() {
        let scheduler = scheduler();
        scheduler.add_job(job("job-1", Some("A"))).unwrap();
        scheduler
            .add_test(Test {
                test_id: "t1".to_owned(),
                job_id: "job-1".to_owned(),
            })
            .unwrap();

        // No matching device yet: a pass starves.
        scheduler.try_place_next_test("job-1").await.unwrap();
        assert_eq!(scheduler.fairness_snapshot()["job-1"].starves, 1);
        assert_eq!(scheduler.fairness_snapshot()["job-1"].placements, 0);

        scheduler.upsert_device(device("d1", "lab-1", &["A"]), lab("lab-1"));
        scheduler.try_place_next_test("job-1").await.unwrap();
        assert_eq!(scheduler.fairness_snapshot()["job-1"].placements, 1);
    }

    #[tokio::test]
    async fn unallocate_device_with_no_allocation_and_remove_flag_drops_device() {
        let scheduler = scheduler();
        scheduler.upsert_device(device("d1", "lab-1", &["A"]), lab("lab-1"));
        scheduler
            .unallocate_device(&"d1".to_owned(), true, false)
            .await;
        assert!(!scheduler.state.read().devices.contains_key("d1"));
    }
}

// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The allocation store (spec §4.1): the exclusive `{device <-> test}` mapping, persisted so that
//! unfinished allocations can be resumed across a restart.

mod persistence;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

pub use persistence::{
    InMemoryPersistence, NoopPersistence, PersistenceAdapter, ShardedLmdbPersistence,
};

/// Identifies a test uniquely within the process: `(job_id, test_id)` per spec §3's `Test{job_id,
/// test_id}`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct TestLocator {
    pub job_id: String,
    pub test_id: String,
}

impl TestLocator {
    pub fn new(job_id: impl Into<String>, test_id: impl Into<String>) -> TestLocator {
        TestLocator {
            job_id: job_id.into(),
            test_id: test_id.into(),
        }
    }
}

/// A device's `universal_id`, globally unique across labs (spec §3).
pub type DeviceLocator = String;

/// The exclusive binding of a test to one or more devices within one lab (spec §3, invariant A3).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Allocation {
    pub test: TestLocator,
    pub devices: Vec<DeviceLocator>,
    pub lab_ip: String,
    pub created_at_millis: u128,
}

impl Allocation {
    pub fn new(test: TestLocator, devices: Vec<DeviceLocator>, lab_ip: String) -> Allocation {
        assert!(!devices.is_empty(), "an allocation must have at least one device");
        Allocation {
            test,
            devices,
            lab_ip,
            created_at_millis: now_millis(),
        }
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis()
}

/// Summary of a `restore()` call, logged once at `core_server` startup (SPEC_FULL §2).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub resumed: usize,
    pub dropped_conflicting: usize,
}

struct Inner {
    by_test: HashMap<TestLocator, Allocation>,
    by_device: HashMap<DeviceLocator, TestLocator>,
}

/// Enforces invariants A1-A4 of spec §3 and exposes the transactional API of spec §4.1. A single
/// mutex guards every index-touching operation so that consumers can never observe a partial
/// state (spec §4.1 "Invariants").
pub struct AllocationStore<P: PersistenceAdapter> {
    inner: Mutex<Inner>,
    persistence: P,
}

impl<P: PersistenceAdapter> AllocationStore<P> {
    pub fn new(persistence: P) -> AllocationStore<P> {
        AllocationStore {
            inner: Mutex::new(Inner {
                by_test: HashMap::new(),
                by_device: HashMap::new(),
            }),
            persistence,
        }
    }

    /// Rejects (returns `false`, no side effect) if the test or any device is already allocated;
    /// otherwise records both indexes atomically and persists. A persistence failure is logged
    /// and ignored: in-memory state remains authoritative until the next restart (spec §4.1).
    pub async fn add(&self, alloc: Allocation) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.by_test.contains_key(&alloc.test) {
                return false;
            }
            if alloc.devices.iter().any(|d| inner.by_device.contains_key(d)) {
                return false;
            }
            for device in &alloc.devices {
                inner.by_device.insert(device.clone(), alloc.test.clone());
            }
            inner.by_test.insert(alloc.test.clone(), alloc.clone());
        }

        if let Err(e) = self.persistence.put(&alloc).await {
            log::warn!(
                "failed to persist allocation for test {:?}: {e}",
                alloc.test
            );
        }
        true
    }

    /// Removes and returns the allocation for `test`, or `None` if it had none. A no-op for an
    /// absent key never raises (spec §4.1).
    pub async fn remove_by_test(&self, test: &TestLocator) -> Option<Allocation> {
        let removed = {
            let mut inner = self.inner.lock();
            let Some(alloc) = inner.by_test.remove(test) else {
                return None;
            };
            for device in &alloc.devices {
                inner.by_device.remove(device);
            }
            alloc
        };

        if let Err(e) = self.persistence.delete(&removed.test).await {
            log::warn!(
                "failed to delete persisted allocation for test {:?}: {e}",
                removed.test
            );
        }
        Some(removed)
    }

    pub async fn remove_by_device(&self, device: &DeviceLocator) -> Option<Allocation> {
        let test = {
            let inner = self.inner.lock();
            inner.by_device.get(device).cloned()
        };
        match test {
            Some(test) => self.remove_by_test(&test).await,
            None => None,
        }
    }

    pub fn by_test(&self, test: &TestLocator) -> Option<Allocation> {
        self.inner.lock().by_test.get(test).cloned()
    }

    pub fn by_device(&self, device: &DeviceLocator) -> Option<Allocation> {
        let inner = self.inner.lock();
        inner
            .by_device
            .get(device)
            .and_then(|test| inner.by_test.get(test))
            .cloned()
    }

    pub fn has_test(&self, test: &TestLocator) -> bool {
        self.inner.lock().by_test.contains_key(test)
    }

    pub fn has_device(&self, device: &DeviceLocator) -> bool {
        self.inner.lock().by_device.contains_key(device)
    }

    /// Reads every persisted record and re-adds it via `add`; any record whose `add` is rejected
    /// (a post-crash conflict) is dropped with a warning (spec §4.1). `restore` is the only
    /// caller of `add` at startup (spec §6).
    pub async fn restore(&self) -> Result<RestoreSummary, String> {
        let persisted = self.persistence.list().await?;
        let mut summary = RestoreSummary::default();
        for alloc in persisted {
            let test = alloc.test.clone();
            if self.add(alloc).await {
                summary.resumed += 1;
            } else {
                log::warn!("dropping persisted allocation for test {test:?}: conflicts with an allocation already restored");
                summary.dropped_conflicting += 1;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(id: &str) -> TestLocator {
        TestLocator::new("job-1", id)
    }

    #[tokio::test]
    async fn add_rejects_duplicate_test() {
        let store = AllocationStore::new(NoopPersistence);
        let alloc = Allocation::new(locator("t1"), vec!["d1".to_owned()], "lab-1".to_owned());
        assert!(store.add(alloc.clone()).await);

        let conflicting =
            Allocation::new(locator("t1"), vec!["d2".to_owned()], "lab-1".to_owned());
        assert!(!store.add(conflicting).await);
    }

    #[tokio::test]
    async fn add_rejects_duplicate_device() {
        let store = AllocationStore::new(NoopPersistence);
        store
            .add(Allocation::new(
                locator("t1"),
                vec!["d1".to_owned()],
                "lab-1".to_owned(),
            ))
            .await;

        let conflicting =
            Allocation::new(locator("t2"), vec!["d1".to_owned()], "lab-1".to_owned());
        assert!(!store.add(conflicting).await);
    }

    #[tokio::test]
    async fn remove_by_test_is_idempotent() {
        let store = AllocationStore::new(NoopPersistence);
        let test = locator("t1");
        store
            .add(Allocation::new(test.clone(), vec!["d1".to_owned()], "lab-1".to_owned()))
            .await;

        assert!(store.remove_by_test(&test).await.is_some());
        assert!(store.remove_by_test(&test).await.is_none());
        assert!(!store.has_device(&"d1".to_owned()));
    }

    #[tokio::test]
    async fn remove_by_device_absent_is_a_no_op() {
        let store = AllocationStore::new(NoopPersistence);
        assert!(store.remove_by_device(&"missing".to_owned()).await.is_none());
    }

    #[tokio::test]
    async fn indexes_stay_consistent_across_operations() {
        let store = AllocationStore::new(NoopPersistence);
        let test = locator("t1");
        store
            .add(Allocation::new(
                test.clone(),
                vec!["d1".to_owned(), "d2".to_owned()],
                "lab-1".to_owned(),
            ))
            .await;

        assert!(store.has_device(&"d1".to_owned()));
        assert!(store.has_device(&"d2".to_owned()));
        assert!(store.has_test(&test));

        store.remove_by_test(&test).await;

        assert!(!store.has_device(&"d1".to_owned()));
        assert!(!store.has_device(&"d2".to_owned()));
        assert!(!store.has_test(&test));
    }

    #[tokio::test]
    async fn restore_resumes_from_persistence_and_drops_conflicts() {
        let persistence = persistence::InMemoryPersistence::default();
        persistence
            .seed(Allocation::new(locator("t1"), vec!["d1".to_owned()], "lab-1".to_owned()))
            .await;
        // A conflicting record sharing device d1: restore should drop it.
        persistence
            .seed(Allocation::new(locator("t2"), vec!["d1".to_owned()], "lab-1".to_owned()))
            .await;

        let store = AllocationStore::new(persistence);
        let summary = store.restore().await.unwrap();

        assert_eq!(summary.resumed, 1);
        assert_eq!(summary.dropped_conflicting, 1);
        assert!(store.has_test(&locator("t1")));
        assert!(!store.has_test(&locator("t2")));
    }
}

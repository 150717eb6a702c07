// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The persistence adapter contract of spec §4.1: `list()`, `put(alloc)`, `delete(test_id)`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sharded_lmdb::ShardedLmdb;
use task_executor::Executor;

use crate::{Allocation, TestLocator};

#[async_trait]
pub trait PersistenceAdapter: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Allocation>, String>;
    async fn put(&self, alloc: &Allocation) -> Result<(), String>;
    async fn delete(&self, test: &TestLocator) -> Result<(), String>;
}

/// A persistence adapter that does nothing: restart resumes no allocations, which spec §4.1
/// calls out as "well-defined."
pub struct NoopPersistence;

#[async_trait]
impl PersistenceAdapter for NoopPersistence {
    async fn list(&self) -> Result<Vec<Allocation>, String> {
        Ok(Vec::new())
    }

    async fn put(&self, _alloc: &Allocation) -> Result<(), String> {
        Ok(())
    }

    async fn delete(&self, _test: &TestLocator) -> Result<(), String> {
        Ok(())
    }
}

/// The production persistence adapter: allocations serialized as JSON, keyed by a deterministic
/// encoding of their `TestLocator`, in an embedded `sharded_lmdb` store.
pub struct ShardedLmdbPersistence {
    store: ShardedLmdb,
}

impl ShardedLmdbPersistence {
    pub fn new(db_path: PathBuf, executor: Executor) -> Result<ShardedLmdbPersistence, String> {
        Ok(ShardedLmdbPersistence {
            store: ShardedLmdb::new(db_path, executor)?,
        })
    }

    fn key_for(test: &TestLocator) -> Vec<u8> {
        format!("{}\0{}", test.job_id, test.test_id).into_bytes()
    }
}

#[async_trait]
impl PersistenceAdapter for ShardedLmdbPersistence {
    async fn list(&self) -> Result<Vec<Allocation>, String> {
        let entries = self.store.list().await?;
        entries
            .into_iter()
            .map(|(_, value)| {
                serde_json::from_slice(&value)
                    .map_err(|e| format!("corrupt persisted allocation record: {e}"))
            })
            .collect()
    }

    async fn put(&self, alloc: &Allocation) -> Result<(), String> {
        let value = serde_json::to_vec(alloc)
            .map_err(|e| format!("failed to serialize allocation: {e}"))?;
        self.store.put(Self::key_for(&alloc.test), value).await
    }

    async fn delete(&self, test: &TestLocator) -> Result<(), String> {
        self.store.delete(Self::key_for(test)).await
    }
}

/// An in-memory double used by `allocation_store`'s own tests (and available to other crates'
/// tests via `testutil::mock`) to exercise `restore()` without a real LMDB file.
#[derive(Default, Clone)]
pub struct InMemoryPersistence {
    records: Arc<Mutex<Vec<Allocation>>>,
}

impl InMemoryPersistence {
    /// Seeds a persisted record directly, bypassing `put`, to set up `restore()` scenarios.
    pub async fn seed(&self, alloc: Allocation) {
        self.records.lock().push(alloc);
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistence {
    async fn list(&self) -> Result<Vec<Allocation>, String> {
        Ok(self.records.lock().clone())
    }

    async fn put(&self, alloc: &Allocation) -> Result<(), String> {
        let mut records = self.records.lock();
        records.retain(|a| a.test != alloc.test);
        records.push(alloc.clone());
        Ok(())
    }

    async fn delete(&self, test: &TestLocator) -> Result<(), String> {
        self.records.lock().retain(|a| &a.test != test);
        Ok(())
    }
}

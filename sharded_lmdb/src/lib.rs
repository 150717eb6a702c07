// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! An embedded, sharded LMDB key-value store. Backs the allocation store's persistence adapter
//! (spec §4.1), sharding writes across several LMDB environments keyed by a fingerprint of the
//! key so that no single environment serializes every writer.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashing::Fingerprint;
use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use task_executor::Executor;

const DEFAULT_SHARD_COUNT: usize = 4;
const DEFAULT_MAP_SIZE_BYTES: usize = 16 * 1024 * 1024 * 1024;

struct Shard {
    env: Environment,
    db: Database,
}

/// A key-value store spread across `shard_count` independent LMDB environments under
/// `root_path/shard-<n>/`.
pub struct ShardedLmdb {
    shards: Vec<Arc<Shard>>,
    executor: Executor,
}

impl ShardedLmdb {
    pub fn new(root_path: PathBuf, executor: Executor) -> Result<ShardedLmdb, String> {
        Self::with_shard_count(root_path, DEFAULT_SHARD_COUNT, executor)
    }

    pub fn with_shard_count(
        root_path: PathBuf,
        shard_count: usize,
        executor: Executor,
    ) -> Result<ShardedLmdb, String> {
        assert!(shard_count > 0, "shard_count must be at least 1");

        let mut shards = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let shard_path = root_path.join(format!("shard-{index}"));
            fs::create_dir_all(&shard_path)
                .map_err(|e| format!("failed to create {}: {e}", shard_path.display()))?;

            let env = Environment::new()
                .set_map_size(DEFAULT_MAP_SIZE_BYTES)
                .set_max_dbs(1)
                .open(&shard_path)
                .map_err(|e| format!("failed to open LMDB environment at {shard_path:?}: {e}"))?;
            let db = env
                .create_db(None, DatabaseFlags::empty())
                .map_err(|e| format!("failed to open LMDB database: {e}"))?;

            shards.push(Arc::new(Shard { env, db }));
        }

        Ok(ShardedLmdb { shards, executor })
    }

    fn shard_for(&self, key: &[u8]) -> &Arc<Shard> {
        let fingerprint = Fingerprint::from_bytes(key);
        let index = fingerprint.0[0] as usize % self.shards.len();
        &self.shards[index]
    }

    pub async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), String> {
        let shard = self.shard_for(&key).clone();
        self.executor
            .spawn_blocking(move || {
                let mut txn = shard
                    .env
                    .begin_rw_txn()
                    .map_err(|e| format!("failed to begin write transaction: {e}"))?;
                txn.put(shard.db, &key, &value, WriteFlags::empty())
                    .map_err(|e| format!("failed to write key: {e}"))?;
                txn.commit()
                    .map_err(|e| format!("failed to commit write: {e}"))
            })
            .await
            .map_err(|e| format!("put task panicked: {e}"))?
    }

    pub async fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, String> {
        let shard = self.shard_for(&key).clone();
        self.executor
            .spawn_blocking(move || {
                let txn = shard
                    .env
                    .begin_ro_txn()
                    .map_err(|e| format!("failed to begin read transaction: {e}"))?;
                match txn.get(shard.db, &key) {
                    Ok(value) => Ok(Some(value.to_vec())),
                    Err(lmdb::Error::NotFound) => Ok(None),
                    Err(e) => Err(format!("failed to read key: {e}")),
                }
            })
            .await
            .map_err(|e| format!("get task panicked: {e}"))?
    }

    pub async fn delete(&self, key: Vec<u8>) -> Result<(), String> {
        let shard = self.shard_for(&key).clone();
        self.executor
            .spawn_blocking(move || {
                let mut txn = shard
                    .env
                    .begin_rw_txn()
                    .map_err(|e| format!("failed to begin write transaction: {e}"))?;
                match txn.del(shard.db, &key, None) {
                    Ok(()) => {}
                    Err(lmdb::Error::NotFound) => {}
                    Err(e) => return Err(format!("failed to delete key: {e}")),
                }
                txn.commit()
                    .map_err(|e| format!("failed to commit delete: {e}"))
            })
            .await
            .map_err(|e| format!("delete task panicked: {e}"))?
    }

    /// Lists every `(key, value)` pair across all shards. Used only at restart time (spec §4.1
    /// `restore()`); not on any hot path.
    pub async fn list(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, String> {
        let shards = self.shards.clone();
        self.executor
            .spawn_blocking(move || {
                let mut all = Vec::new();
                for shard in &shards {
                    let txn = shard
                        .env
                        .begin_ro_txn()
                        .map_err(|e| format!("failed to begin read transaction: {e}"))?;
                    let mut cursor = txn
                        .open_ro_cursor(shard.db)
                        .map_err(|e| format!("failed to open cursor: {e}"))?;
                    for result in cursor.iter_start() {
                        let (key, value) = result.map_err(|e| format!("cursor error: {e}"))?;
                        all.push((key.to_vec(), value.to_vec()));
                    }
                }
                Ok(all)
            })
            .await
            .map_err(|e| format!("list task panicked: {e}"))?
    }
}

pub fn safe_create_dir_all(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path).map_err(|e| format!("failed to create {}: {e}", path.display()))
}

// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The resolver contract shared by every file-resolver chain link (spec §4.7).

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hashing::Digest;

/// Identifies a file to resolve: an opaque `path` (scheme-qualified, e.g. `gs://bucket/obj`) plus
/// resolver-specific `parameters`, which together form the cache key used by `CachingResolver`
/// (spec §4.7 "memoizes result futures by `{path, parameters}`").
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct ResolveSource {
    pub path: String,
    pub parameters: BTreeMap<String, String>,
}

impl ResolveSource {
    pub fn new(path: impl Into<String>) -> ResolveSource {
        ResolveSource {
            path: path.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> ResolveSource {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// The outcome of a successful resolve: where the file landed locally, plus enough to detect
/// staleness on a later lookup (spec §4.7 "on stale results (missing file or expired timestamp),
/// it re-resolves").
#[derive(Clone, Debug)]
pub struct ResolveOutcome {
    pub local_path: std::path::PathBuf,
    pub digest: Option<Digest>,
    pub resolved_at: Instant,
}

impl ResolveOutcome {
    pub fn is_stale(&self, ttl: Duration) -> bool {
        !self.local_path.exists() || self.resolved_at.elapsed() > ttl
    }
}

/// One link in the file-resolver chain (spec §4.7). The source's distinct `resolve` (sync) and
/// `resolveAsync` methods collapse to a single async method here: Rust's async/await makes the
/// sync/async split the source draws unnecessary.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Whether this resolver claims `source`; the chain runner short-circuits on the first `true`.
    fn should_resolve(&self, source: &ResolveSource) -> bool;

    async fn resolve(&self, source: &ResolveSource) -> Result<ResolveOutcome, String>;

    /// Batch hook run before a set of sources is resolved (e.g. to warm a shared connection).
    /// Default is a no-op; most resolvers never need it.
    async fn pre_process(&self, _sources: &[ResolveSource]) -> Result<(), String> {
        Ok(())
    }
}

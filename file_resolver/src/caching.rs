// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The caching resolver that sits at the head of the chain (spec §4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_oncecell::OnceCell;
use async_trait::async_trait;
use file_resolver_traits::{ResolveOutcome, ResolveSource, Resolver};
use parking_lot::Mutex;

/// Cached successes expire after 3 hours; cached failures after 3 minutes (spec §4.7).
pub const SUCCESS_TTL: Duration = Duration::from_secs(3 * 60 * 60);
pub const FAILURE_TTL: Duration = Duration::from_secs(3 * 60);

struct CacheEntry {
    result: Result<ResolveOutcome, String>,
    recorded_at: Instant,
}

impl CacheEntry {
    fn ttl(&self) -> Duration {
        if self.result.is_ok() {
            SUCCESS_TTL
        } else {
            FAILURE_TTL
        }
    }

    fn is_expired(&self) -> bool {
        if let Ok(outcome) = &self.result {
            if outcome.is_stale(self.ttl()) {
                return true;
            }
        }
        self.recorded_at.elapsed() > self.ttl()
    }
}

/// Memoizes `inner`'s result futures by `{path, parameters}` so that concurrent resolves for the
/// same key share a single in-flight future (spec §4.7). Delegates `should_resolve` to `inner`
/// unchanged: this resolver only ever wraps one other resolver in the chain.
pub struct CachingResolver {
    inner: Arc<dyn Resolver>,
    cells: Mutex<HashMap<ResolveSource, Arc<OnceCell<CacheEntry>>>>,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn Resolver>) -> CachingResolver {
        CachingResolver {
            inner,
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell_for(&self, source: &ResolveSource) -> Arc<OnceCell<CacheEntry>> {
        let mut cells = self.cells.lock();
        if let Some(existing) = cells.get(source) {
            if existing.get().is_some_and(CacheEntry::is_expired) {
                cells.remove(source);
            }
        }
        cells
            .entry(source.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

#[async_trait]
impl Resolver for CachingResolver {
    fn should_resolve(&self, source: &ResolveSource) -> bool {
        self.inner.should_resolve(source)
    }

    async fn resolve(&self, source: &ResolveSource) -> Result<ResolveOutcome, String> {
        let cell = self.cell_for(source);
        let entry = cell
            .get_or_init(|| async {
                CacheEntry {
                    result: self.inner.resolve(source).await,
                    recorded_at: Instant::now(),
                }
            })
            .await;
        entry.result.clone()
    }
}

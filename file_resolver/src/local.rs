// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A minimal resolver for `file://`-scheme sources, used as the tail of the chain and in tests.

use async_trait::async_trait;
use file_resolver_traits::{ResolveOutcome, ResolveSource, Resolver};

pub struct LocalFileResolver;

#[async_trait]
impl Resolver for LocalFileResolver {
    fn should_resolve(&self, source: &ResolveSource) -> bool {
        source.path.starts_with("file://")
    }

    async fn resolve(&self, source: &ResolveSource) -> Result<ResolveOutcome, String> {
        let path = std::path::PathBuf::from(source.path.trim_start_matches("file://"));
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| format!("failed to stat {}: {e}", path.display()))?
        {
            return Err(format!("no such file: {}", path.display()));
        }
        Ok(ResolveOutcome {
            local_path: path,
            digest: None,
            resolved_at: std::time::Instant::now(),
        })
    }
}

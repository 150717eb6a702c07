// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Runs a responsibility chain of resolvers, short-circuiting on the first acceptor (spec §4.7).

use std::sync::Arc;

use file_resolver_traits::{ResolveOutcome, ResolveSource, Resolver};
use grpc_util::core_error::CoreError;

/// Ordered chain of resolvers; `resolvers[0]` is tried first. Construct with the caching resolver
/// as the first entry to get the head-of-chain memoization spec §4.7 describes.
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl ResolverChain {
    pub fn new(resolvers: Vec<Arc<dyn Resolver>>) -> ResolverChain {
        ResolverChain { resolvers }
    }

    pub async fn resolve(&self, source: &ResolveSource) -> Result<ResolveOutcome, CoreError> {
        for resolver in &self.resolvers {
            if !resolver.should_resolve(source) {
                continue;
            }
            return resolver
                .resolve(source)
                .await
                .map_err(|e| CoreError::new(grpc_util::core_error::ErrorKind::ResolveFileError, e));
        }
        Err(CoreError::not_found(format!(
            "no resolver in the chain claims source {:?}",
            source.path
        )))
    }

    pub async fn pre_process(&self, sources: &[ResolveSource]) -> Result<(), CoreError> {
        for resolver in &self.resolvers {
            resolver
                .pre_process(sources)
                .await
                .map_err(|e| CoreError::internal(e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct OnlyAccepts {
        prefix: &'static str,
    }

    #[async_trait]
    impl Resolver for OnlyAccepts {
        fn should_resolve(&self, source: &ResolveSource) -> bool {
            source.path.starts_with(self.prefix)
        }

        async fn resolve(&self, source: &ResolveSource) -> Result<ResolveOutcome, String> {
            Ok(ResolveOutcome {
                local_path: source.path.clone().into(),
                digest: None,
                resolved_at: std::time::Instant::now(),
            })
        }
    }

    #[tokio::test]
    async fn chain_short_circuits_on_the_first_acceptor() {
        let chain = ResolverChain::new(vec![
            Arc::new(OnlyAccepts { prefix: "gs://" }),
            Arc::new(OnlyAccepts { prefix: "" }),
        ]);

        let outcome = chain.resolve(&ResolveSource::new("gs://bucket/obj")).await.unwrap();
        assert_eq!(outcome.local_path.to_str().unwrap(), "gs://bucket/obj");
    }

    #[tokio::test]
    async fn chain_falls_through_to_a_later_resolver() {
        let chain = ResolverChain::new(vec![
            Arc::new(OnlyAccepts { prefix: "gs://" }),
            Arc::new(OnlyAccepts { prefix: "" }),
        ]);

        let outcome = chain.resolve(&ResolveSource::new("http://example/obj")).await.unwrap();
        assert_eq!(outcome.local_path.to_str().unwrap(), "http://example/obj");
    }

    #[tokio::test]
    async fn chain_fails_not_found_when_nothing_claims_the_source() {
        let chain = ResolverChain::new(vec![Arc::new(OnlyAccepts { prefix: "gs://" })]);
        let err = chain.resolve(&ResolveSource::new("http://example/obj")).await.unwrap_err();
        assert_eq!(err.kind, grpc_util::core_error::ErrorKind::NotFound);
    }
}

// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The pluggable file-resolver chain (spec §4.7).

pub mod caching;
pub mod chain;
pub mod local;

pub use caching::CachingResolver;
pub use chain::ResolverChain;
pub use local::LocalFileResolver;
pub use file_resolver_traits::{ResolveOutcome, ResolveSource, Resolver};

// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Shared tonic/rustls plumbing for the RPC facade: channel setup, prost helpers, TLS
//! configuration, and the `CoreError` -> `tonic::Status` mapping.

pub mod channel;
pub mod core_error;
pub mod prost;
pub mod tls;

pub use channel::Channel;
pub use core_error::{CoreError, ErrorKind};
pub use prost::MessageExt;

/// Installs the process-wide `rustls` crypto provider. Safe to call more than once; only the
/// first call has an effect. Must run before any TLS channel is constructed.
pub fn initialize() -> Result<(), Box<dyn std::error::Error>> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    Ok(())
}

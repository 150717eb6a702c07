// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A stub gRPC server standing in for a running core process (spec §6), for tests of anything
//! that talks to the core over the wire.

mod core_server;

pub use crate::core_server::{CannedResponses, TestServer};

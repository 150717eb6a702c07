// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Generated protobuf/tonic bindings for the RPC surface of spec §6: `SessionService`,
//! `ControlService`, and `VersionService`.

#![allow(clippy::all)]

tonic::include_proto!("core");

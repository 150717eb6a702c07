// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The core's RPC facade (spec §4.4, §6): `SessionService`, `ControlService`, and
//! `VersionService`, plus their shared collaborators (alive-clients cache, log tap-off).

pub mod alive_clients;
pub mod control_service;
pub mod convert;
pub mod log_tap;
pub mod session_service;
pub mod version_service;

use std::sync::Arc;

use async_latch::AsyncLatch;
use session_manager::SessionManager;

pub use alive_clients::AliveClients;
pub use control_service::ControlServiceImpl;
pub use session_service::SessionServiceImpl;
pub use version_service::VersionServiceImpl;

/// The three tonic services the core exposes, plus the shutdown latch `KillServer` triggers.
///
/// `core_server`'s binary awaits `shutdown.triggered()` to drive the soft/forced shutdown
/// sequence (spec §4.4 "shut the server down gracefully ... then forced shutdown after a small
/// grace period").
pub struct CoreServices {
    pub session_service: protos::session_service_server::SessionServiceServer<SessionServiceImpl>,
    pub control_service: protos::control_service_server::ControlServiceServer<ControlServiceImpl>,
    pub version_service: protos::version_service_server::VersionServiceServer<VersionServiceImpl>,
    pub alive_clients: Arc<AliveClients>,
    pub shutdown: AsyncLatch,
}

pub fn build_services(manager: Arc<SessionManager>) -> CoreServices {
    let alive_clients = Arc::new(AliveClients::new());
    let shutdown = AsyncLatch::new();

    let session_service = protos::session_service_server::SessionServiceServer::new(
        SessionServiceImpl::new(manager.clone()),
    );
    let control_service = protos::control_service_server::ControlServiceServer::new(
        ControlServiceImpl::new(manager, alive_clients.clone(), shutdown.clone()),
    );
    let version_service = protos::version_service_server::VersionServiceServer::new(
        VersionServiceImpl::default(),
    );

    CoreServices {
        session_service,
        control_service,
        version_service,
        alive_clients,
        shutdown,
    }
}

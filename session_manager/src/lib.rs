// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The session manager (spec §4.3): session life-cycle, plugin execution, and field-mask-aware
//! queries.

pub mod driver;
pub mod event_bus;
pub mod manager;
pub mod types;

pub use driver::SessionDriver;
pub use event_bus::{SessionEventBus, SessionLifecycleEvent, SessionPlugin};
pub use manager::SessionManager;
pub use types::{
    FieldMask, Session, SessionConfig, SessionFilter, SessionManagerError, SessionOutput,
    SessionStatus,
};

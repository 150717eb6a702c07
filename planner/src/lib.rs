// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The session-request planner (spec §4.5): translates an opaque `SessionRequestInfo` into
//! zero-or-more tradefed/non-tradefed job configs.

pub mod device_config;
pub mod device_selection;
pub mod job_builder;
pub mod module_filter;
pub mod request;
pub mod sharding;
pub mod timeouts;

pub use device_config::{DeviceConfigurations, ModuleDeviceConfig};
pub use device_selection::DeviceSelection;
pub use job_builder::PlannedJob;
pub use module_filter::{ModuleFilterClause, PlannerError};
pub use request::{plan, SessionRequestInfo};

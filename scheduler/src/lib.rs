// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The scheduler (spec §4.2): a single control loop that allocates idle devices to waiting tests
//! and fires allocation events, built on top of `allocation_store`'s exclusive `{device <-> test}`
//! mapping.

pub mod event_bus;
pub mod placement;
pub mod scheduler;
pub mod types;

pub use event_bus::{AllocationEventSubscriber, EventBus};
pub use placement::{AdhocTestbedMatcher, GreedyAdhocTestbedMatcher, PlacementStrategy};
pub use scheduler::{FairnessCounters, Scheduler};
pub use types::{
    AllocationEvent, Device, DeviceStatus, Job, JobTimeouts, Lab, SchedulerError, SubDeviceSpec,
    Test, TestLocator,
};

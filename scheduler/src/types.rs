// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use allocation_store::DeviceLocator;
use concrete_time::Duration;

pub use allocation_store::TestLocator;

/// A host that owns devices (spec §3). `ip` is the lab's key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Lab {
    pub ip: String,
    pub host_name: String,
    pub labels: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeviceStatus {
    Idle,
    Busy,
    Offline,
}

/// A schedulable resource within a lab (spec §3). `universal_id` is globally unique across labs;
/// `device_id` may repeat between labs.
#[derive(Clone, PartialEq, Debug)]
pub struct Device {
    pub device_id: String,
    pub lab_ip: String,
    pub universal_id: DeviceLocator,
    pub types: Vec<String>,
    pub owners: Vec<String>,
    pub dimensions: HashMap<String, String>,
    pub status: DeviceStatus,
}

impl Device {
    pub fn is_idle(&self) -> bool {
        self.status == DeviceStatus::Idle
    }
}

/// Wall-clock bounds on a job's execution (spec §4.5).
#[derive(Clone, Copy, Debug)]
pub struct JobTimeouts {
    pub job: Duration,
    pub test: Duration,
    pub start: Duration,
}

/// A single requested device slot within a job's ad-hoc testbed (spec §4.2 "ad-hoc placement").
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SubDeviceSpec {
    pub device_type: String,
}

/// An executable unit with a device selection and driver (spec §3), owned by a session.
#[derive(Clone, Debug)]
pub struct Job {
    pub job_id: String,
    pub exec_mode: String,
    pub driver: String,
    pub params: HashMap<String, String>,
    pub sub_device_specs: Vec<SubDeviceSpec>,
    pub timeouts: JobTimeouts,
    pub priority: i32,
    pub attempts: u32,
    /// The job's run-as user, checked against a device's `owners` for ad-hoc placement
    /// eligibility (spec §4.2).
    pub run_as_user: Option<String>,
    pub required_device_type: Option<String>,
}

impl Job {
    /// True if a single idle device satisfies `required_device_type` (spec §4.2
    /// "single-device placement"). A job with no required type is satisfied by any device.
    pub fn device_supports(&self, device: &Device) -> bool {
        match &self.required_device_type {
            Some(device_type) => device.types.iter().any(|t| t == device_type),
            None => true,
        }
    }

    /// True if `device` is a candidate for this job's ad-hoc testbed (spec §4.2): its type set
    /// intersects the job's requested sub-device types, and the job's run-as user is one of the
    /// device's owners.
    pub fn is_adhoc_candidate(&self, device: &Device) -> bool {
        let type_matches = self
            .sub_device_specs
            .iter()
            .any(|spec| device.types.contains(&spec.device_type));
        let owner_matches = match &self.run_as_user {
            Some(user) => device.owners.iter().any(|o| o == user),
            None => true,
        };
        type_matches && owner_matches
    }

    pub fn is_adhoc(&self) -> bool {
        self.sub_device_specs.len() > 1
    }
}

/// The smallest schedulable unit within a job; consumes an allocation (spec §3).
#[derive(Clone, Debug)]
pub struct Test {
    pub test_id: String,
    pub job_id: String,
}

impl Test {
    pub fn locator(&self) -> TestLocator {
        TestLocator::new(self.job_id.clone(), self.test_id.clone())
    }
}

/// Fired after a successful allocation (spec §4.2 "Events").
#[derive(Clone, Debug)]
pub struct AllocationEvent {
    pub test: TestLocator,
    pub devices: Vec<DeviceLocator>,
    pub lab_ip: String,
}

/// Errors returned by the scheduler's mutation operations (spec §4.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    JobDuplicated(String),
    TestDuplicated(String, String),
    JobNotFound(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::JobDuplicated(id) => write!(f, "job already exists: {id}"),
            SchedulerError::TestDuplicated(job_id, test_id) => {
                write!(f, "test {test_id} already exists in job {job_id}")
            }
            SchedulerError::JobNotFound(id) => write!(f, "no such job: {id}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

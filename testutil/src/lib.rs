// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Fixture constructors shared across crates' test suites: a lab, a device, a job, a test, and the
//! session/allocation records built on top of them. Every field not relevant to a given test is
//! defaulted so call sites only spell out what they care about.

use std::collections::HashMap;

use allocation_store::{Allocation, TestLocator};
use concrete_time::Duration;
use scheduler::{Device, DeviceStatus, Job, JobTimeouts, Lab, SubDeviceSpec, Test};
use session_manager::SessionConfig;

pub fn lab(ip: &str) -> Lab {
    Lab {
        ip: ip.to_owned(),
        host_name: format!("host-{ip}"),
        labels: Vec::new(),
    }
}

pub fn device(universal_id: &str, lab_ip: &str, types: &[&str]) -> Device {
    device_with_status(universal_id, lab_ip, types, DeviceStatus::Idle)
}

pub fn device_with_status(
    universal_id: &str,
    lab_ip: &str,
    types: &[&str],
    status: DeviceStatus,
) -> Device {
    Device {
        device_id: universal_id.to_owned(),
        lab_ip: lab_ip.to_owned(),
        universal_id: universal_id.to_owned(),
        types: types.iter().map(|t| t.to_string()).collect(),
        owners: Vec::new(),
        dimensions: HashMap::new(),
        status,
    }
}

/// Permissive bounds: none of `resolve_timeouts`'s floors or formulas are exercised, just a value
/// every `Job` needs to be constructed.
pub fn default_job_timeouts() -> JobTimeouts {
    JobTimeouts {
        job: Duration::from_days(1),
        test: Duration::from_secs(120),
        start: Duration::from_days(1),
    }
}

pub fn job(job_id: &str, required_device_type: Option<&str>) -> Job {
    Job {
        job_id: job_id.to_owned(),
        exec_mode: "tradefed".to_owned(),
        driver: "tradefed".to_owned(),
        params: HashMap::new(),
        sub_device_specs: Vec::new(),
        timeouts: default_job_timeouts(),
        priority: 0,
        attempts: 0,
        run_as_user: None,
        required_device_type: required_device_type.map(str::to_owned),
    }
}

pub fn adhoc_job(job_id: &str, sub_device_types: &[&str]) -> Job {
    let mut j = job(job_id, None);
    j.sub_device_specs = sub_device_types
        .iter()
        .map(|device_type| SubDeviceSpec {
            device_type: device_type.to_string(),
        })
        .collect();
    j
}

pub fn test_case(job_id: &str, test_id: &str) -> Test {
    Test {
        test_id: test_id.to_owned(),
        job_id: job_id.to_owned(),
    }
}

pub fn allocation(job_id: &str, test_id: &str, devices: &[&str], lab_ip: &str) -> Allocation {
    Allocation::new(
        TestLocator::new(job_id, test_id),
        devices.iter().map(|d| d.to_string()).collect(),
        lab_ip.to_owned(),
    )
}

pub fn session_config(properties: &[(&str, &str)]) -> SessionConfig {
    SessionConfig {
        properties: properties
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

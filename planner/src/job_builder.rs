// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Job construction (spec §4.5 "Job construction"): turns a resolved device selection or a
//! matched module into a `scheduler::Job` plus the isolated generation directory it writes into.

use std::collections::HashMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use scheduler::{Job, JobTimeouts, SubDeviceSpec};
use uuid::Uuid;

const NON_TF_JOB_NAME_PREFIX: &str = "xts-mobly-aosp-package-job-";

/// An executable job alongside the isolated `job_gen_<urlenc name>_<uuid>` directory it should
/// write into (spec §4.5 "writes into an isolated ... directory").
#[derive(Clone, Debug)]
pub struct PlannedJob {
    pub job: Job,
    pub work_dir: PathBuf,
}

fn generation_dir(xts_root: &Path, job_name: &str) -> PathBuf {
    let encoded = fs::urlencode_job_name(job_name);
    xts_root.join(format!("job_gen_{encoded}_{}", Uuid::new_v4()))
}

/// Builds the single tradefed job for a run (spec §4.5 "a tradefed job carries exactly one
/// `sub_device_spec` per picked device or one regex spec when collapsed").
pub fn build_tradefed_job(
    job_id: impl Into<String>,
    job_name: &str,
    xts_root: &Path,
    device_type: &str,
    sub_device_specs: Vec<SubDeviceSpec>,
    driver: impl Into<String>,
    params: HashMap<String, String>,
    run_as_user: Option<String>,
    timeouts: JobTimeouts,
) -> PlannedJob {
    let (sub_device_specs, required_device_type) = match sub_device_specs.len() {
        // A single spec is a single-device placement (spec §4.2); only >1 spec is ad-hoc.
        0 | 1 => (Vec::new(), Some(device_type.to_owned())),
        _ => (sub_device_specs, None),
    };
    let job = Job {
        job_id: job_id.into(),
        exec_mode: "tradefed".to_owned(),
        driver: driver.into(),
        params,
        sub_device_specs,
        timeouts,
        priority: 0,
        attempts: 0,
        run_as_user,
        required_device_type,
    };
    PlannedJob {
        work_dir: generation_dir(xts_root, job_name),
        job,
    }
}

/// Builds one non-tradefed job for a matched module (spec §4.5 "produce one job per matched
/// expanded module, with names of the form `xts-mobly-aosp-package-job-<module>`").
/// `device_count` comes from the module's entry in `device_configurations.textproto` (spec §4.5
/// "non-tradefed jobs read a per-module device-configuration proto"); a module needing more than
/// one companion device becomes an ad-hoc placement the same way a multi-spec tradefed job does.
#[allow(clippy::too_many_arguments)]
pub fn build_non_tradefed_job(
    job_id: impl Into<String>,
    module: &str,
    test_subset: Option<BTreeSet<String>>,
    xts_root: &Path,
    device_type: &str,
    device_count: u32,
    driver: impl Into<String>,
    mut params: HashMap<String, String>,
    run_as_user: Option<String>,
    timeouts: JobTimeouts,
) -> PlannedJob {
    let job_name = format!("{NON_TF_JOB_NAME_PREFIX}{}", module.replace(' ', "_"));
    params.insert("module".to_owned(), module.to_owned());
    if let Some(tests) = test_subset {
        params.insert("included_tests".to_owned(), tests.into_iter().collect::<Vec<_>>().join(","));
    }
    let (sub_device_specs, required_device_type) = match device_count {
        0 | 1 => (Vec::new(), Some(device_type.to_owned())),
        n => (
            (0..n).map(|_| SubDeviceSpec { device_type: device_type.to_owned() }).collect(),
            None,
        ),
    };
    let job = Job {
        job_id: job_id.into(),
        exec_mode: "non_tradefed".to_owned(),
        driver: driver.into(),
        params,
        sub_device_specs,
        timeouts,
        priority: 0,
        attempts: 0,
        run_as_user,
        required_device_type,
    };
    PlannedJob {
        work_dir: generation_dir(xts_root, &job_name),
        job,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_spec_becomes_a_single_device_placement() {
        let planned = build_tradefed_job(
            "job-1",
            "xts-tf",
            Path::new("/xts"),
            "phone",
            vec![SubDeviceSpec { device_type: "phone".to_owned() }],
            "tradefed-driver",
            HashMap::new(),
            None,
            JobTimeouts {
                job: concrete_time::Duration::from_days(15),
                test: concrete_time::Duration::from_days(15),
                start: concrete_time::Duration::from_days(14),
            },
        );
        assert!(planned.job.sub_device_specs.is_empty());
        assert_eq!(planned.job.required_device_type.as_deref(), Some("phone"));
    }

    #[test]
    fn multiple_specs_stay_adhoc() {
        let specs = vec![
            SubDeviceSpec { device_type: "phone".to_owned() },
            SubDeviceSpec { device_type: "phone".to_owned() },
        ];
        let planned = build_tradefed_job(
            "job-1",
            "xts-tf",
            Path::new("/xts"),
            "phone",
            specs,
            "tradefed-driver",
            HashMap::new(),
            None,
            JobTimeouts {
                job: concrete_time::Duration::from_days(15),
                test: concrete_time::Duration::from_days(15),
                start: concrete_time::Duration::from_days(14),
            },
        );
        assert_eq!(planned.job.sub_device_specs.len(), 2);
        assert!(planned.job.required_device_type.is_none());
    }

    #[test]
    fn non_tradefed_job_name_replaces_spaces() {
        let planned = build_non_tradefed_job(
            "job-1",
            "Cts Foo Test",
            None,
            Path::new("/xts"),
            "phone",
            1,
            "mobly-driver",
            HashMap::new(),
            None,
            JobTimeouts {
                job: concrete_time::Duration::from_days(5),
                test: concrete_time::Duration::from_days(5),
                start: concrete_time::Duration::from_days(4),
            },
        );
        assert!(planned
            .work_dir
            .to_string_lossy()
            .contains("job_gen_xts-mobly-aosp-package-job-Cts_Foo_Test_"));
        assert_eq!(planned.job.required_device_type.as_deref(), Some("phone"));
    }

    #[test]
    fn non_tradefed_job_with_multiple_devices_becomes_adhoc() {
        let planned = build_non_tradefed_job(
            "job-1",
            "CtsMultiDeviceTest",
            None,
            Path::new("/xts"),
            "phone",
            2,
            "mobly-driver",
            HashMap::new(),
            None,
            JobTimeouts {
                job: concrete_time::Duration::from_days(5),
                test: concrete_time::Duration::from_days(5),
                start: concrete_time::Duration::from_days(4),
            },
        );
        assert_eq!(planned.job.sub_device_specs.len(), 2);
        assert!(planned.job.required_device_type.is_none());
    }
}

// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Top-level `SessionRequestInfo` -> job-config translation (spec §4.5 "Responsibility").

use std::collections::HashMap;
use std::path::Path;

use concrete_time::Duration;
use fs::XtsLayout;
use scheduler::Device;

use crate::device_config::DeviceConfigurations;
use crate::device_selection::{matches, DeviceSelection};
use crate::job_builder::{build_non_tradefed_job, build_tradefed_job, PlannedJob};
use crate::module_filter::{apply_module_filters, ModuleFilterClause, PlannerError};
use crate::sharding::shard_sub_device_specs;
use crate::timeouts::resolve_timeouts;

/// The opaque run command the planner translates into job configs (spec §4.5).
#[derive(Clone, Debug)]
pub struct SessionRequestInfo {
    pub device_type: String,
    pub device_selection: DeviceSelection,
    pub shard_count: u32,
    pub module_sharding_enabled: bool,
    pub test_name: Option<String>,
    pub plan: String,
    pub is_tradefed: bool,
    pub driver: String,
    pub run_as_user: Option<String>,
    pub explicit_job_timeout: Option<Duration>,
    pub explicit_start_timeout: Option<Duration>,
    pub module_filters: Vec<ModuleFilterClause>,
    pub static_mcts_modules: Vec<String>,
    pub params: HashMap<String, String>,
}

fn union_sorted(local: Vec<String>, static_list: &[String]) -> Vec<String> {
    let mut all: Vec<String> = local;
    all.extend(static_list.iter().cloned());
    all.sort();
    all.dedup();
    all
}

/// Translates `request` into zero-or-more job configs (spec §4.5). `all_tests_in_module` is the
/// collaborator that lists a non-tradefed module's full test set, consulted only when a test-level
/// exclude filter needs "all tests in module" as its base set.
pub fn plan(
    request: &SessionRequestInfo,
    xts_root: &Path,
    available_devices: &[Device],
    all_tests_in_module: impl Fn(&str) -> Vec<String>,
) -> Result<Vec<PlannedJob>, PlannerError> {
    let eligible_device_count = available_devices
        .iter()
        .filter(|d| matches(d, &request.device_selection))
        .count();
    let timeouts = resolve_timeouts(
        request.is_tradefed,
        request.explicit_job_timeout,
        request.explicit_start_timeout,
    );

    if request.is_tradefed {
        let specs = shard_sub_device_specs(
            &request.device_type,
            request.shard_count,
            request.module_sharding_enabled,
            request.test_name.as_deref().unwrap_or("").is_empty(),
            &request.plan,
            eligible_device_count,
        );
        let job_name = "xts-tf";
        let planned = build_tradefed_job(
            format!("job-{}", uuid::Uuid::new_v4()),
            job_name,
            xts_root,
            &request.device_type,
            specs,
            request.driver.clone(),
            request.params.clone(),
            request.run_as_user.clone(),
            timeouts,
        );
        return Ok(vec![planned]);
    }

    let layout = XtsLayout::new(xts_root, &request.device_type);
    let local_modules = layout.list_modules().map_err(|e| PlannerError::Io(e.to_string()))?;
    let available_modules = union_sorted(local_modules, &request.static_mcts_modules);

    let resolved = apply_module_filters(&available_modules, &request.module_filters, all_tests_in_module)?;
    let device_configs = DeviceConfigurations::load(&layout.device_configurations_textproto())?;

    let mut jobs = Vec::with_capacity(resolved.len());
    for (module, test_subset) in resolved {
        let device_count = device_configs.for_module(&module).device_count;
        jobs.push(build_non_tradefed_job(
            format!("job-{}", uuid::Uuid::new_v4()),
            &module,
            test_subset,
            xts_root,
            &request.device_type,
            device_count,
            request.driver.clone(),
            request.params.clone(),
            request.run_as_user.clone(),
            timeouts,
        ));
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(is_tradefed: bool) -> SessionRequestInfo {
        SessionRequestInfo {
            device_type: "phone".to_owned(),
            device_selection: DeviceSelection::default(),
            shard_count: 1,
            module_sharding_enabled: false,
            test_name: None,
            plan: "fresh".to_owned(),
            is_tradefed,
            driver: "driver".to_owned(),
            run_as_user: None,
            explicit_job_timeout: None,
            explicit_start_timeout: None,
            module_filters: Vec::new(),
            static_mcts_modules: Vec::new(),
            params: HashMap::new(),
        }
    }

    #[test]
    fn tradefed_request_produces_exactly_one_job() {
        let request = base_request(true);
        let jobs = plan(&request, Path::new("/xts"), &[], |_| Vec::new()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.exec_mode, "tradefed");
    }

    #[test]
    fn non_tradefed_request_with_no_local_modules_uses_the_static_list() {
        let mut request = base_request(false);
        request.static_mcts_modules = vec!["CtsFooTest".to_owned(), "CtsBarTest".to_owned()];
        let dir = tempfile::tempdir().unwrap();
        let jobs = plan(&request, dir.path(), &[], |_| Vec::new()).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.job.exec_mode == "non_tradefed"));
    }

    #[test]
    fn non_tradefed_job_picks_up_device_count_from_the_configuration_file() {
        let mut request = base_request(false);
        request.static_mcts_modules = vec!["CtsMultiDeviceTest".to_owned()];
        let dir = tempfile::tempdir().unwrap();
        let tools_dir = dir.path().join("android-phone").join("tools");
        std::fs::create_dir_all(&tools_dir).unwrap();
        std::fs::write(
            tools_dir.join("device_configurations.textproto"),
            r#"
            module_configuration {
              module_name: "CtsMultiDeviceTest"
              device_count: 2
            }
            "#,
        )
        .unwrap();

        let jobs = plan(&request, dir.path(), &[], |_| Vec::new()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.sub_device_specs.len(), 2);
        assert!(jobs[0].job.required_device_type.is_none());
    }

    #[test]
    fn invalid_device_configuration_file_surfaces_config_parse_error() {
        let mut request = base_request(false);
        request.static_mcts_modules = vec!["CtsFooTest".to_owned()];
        let dir = tempfile::tempdir().unwrap();
        let tools_dir = dir.path().join("android-phone").join("tools");
        std::fs::create_dir_all(&tools_dir).unwrap();
        std::fs::write(
            tools_dir.join("device_configurations.textproto"),
            "module_configuration { device_count: 1 }",
        )
        .unwrap();

        let err = plan(&request, dir.path(), &[], |_| Vec::new()).unwrap_err();
        assert!(matches!(err, PlannerError::ConfigParseError(_)));
    }
}

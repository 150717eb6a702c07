// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Reads the per-module device-configuration proto non-tradefed jobs consult (spec §4.5,
//! `device_configurations.textproto`): how many companion devices a Mobly module needs.

use std::collections::HashMap;
use std::path::Path;

use crate::module_filter::PlannerError;

/// A single module's device requirement; `device_count` defaults to 1 when the module has no
/// entry in the file at all, which is the common case for single-device Mobly modules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleDeviceConfig {
    pub device_count: u32,
}

impl Default for ModuleDeviceConfig {
    fn default() -> ModuleDeviceConfig {
        ModuleDeviceConfig { device_count: 1 }
    }
}

/// Per-module device requirements parsed from `device_configurations.textproto`.
#[derive(Clone, Debug, Default)]
pub struct DeviceConfigurations(HashMap<String, ModuleDeviceConfig>);

impl DeviceConfigurations {
    pub fn for_module(&self, module: &str) -> ModuleDeviceConfig {
        self.0.get(module).copied().unwrap_or_default()
    }

    /// A file that doesn't exist contributes no per-module overrides; a file that exists but
    /// fails to parse is `ConfigParseError` (spec §7 "invalid device-configuration file").
    pub fn load(path: &Path) -> Result<DeviceConfigurations, PlannerError> {
        if !path.is_file() {
            return Ok(DeviceConfigurations::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PlannerError::ConfigParseError(format!("{}: {e}", path.display())))?;
        parse(&contents)
            .map(DeviceConfigurations)
            .map_err(|e| PlannerError::ConfigParseError(format!("{}: {e}", path.display())))
    }
}

/// Finds each `module_configuration { ... }` block and parses its fields. Unrecognized fields are
/// ignored for forward compatibility; a missing `module_name` or unparsable `device_count` is a
/// parse error.
fn parse(contents: &str) -> Result<HashMap<String, ModuleDeviceConfig>, String> {
    let mut modules = HashMap::new();
    let mut rest = contents;
    while let Some(start) = rest.find("module_configuration") {
        rest = &rest[start + "module_configuration".len()..];
        let open = rest.find('{').ok_or("missing `{` after module_configuration")?;
        let close = rest[open..].find('}').map(|i| open + i).ok_or("missing closing `}`")?;
        let (name, config) = parse_block(&rest[open + 1..close])?;
        modules.insert(name, config);
        rest = &rest[close + 1..];
    }
    Ok(modules)
}

fn parse_block(block: &str) -> Result<(String, ModuleDeviceConfig), String> {
    let mut module_name = None;
    let mut device_count = 1u32;
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| format!("malformed field `{line}`"))?;
        match key.trim() {
            "module_name" => module_name = Some(value.trim().trim_matches('"').to_owned()),
            "device_count" => {
                device_count = value
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid device_count `{}`", value.trim()))?;
            }
            _ => {}
        }
    }
    let module_name = module_name.ok_or("module_configuration block missing module_name")?;
    Ok((module_name, ModuleDeviceConfig { device_count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_configurations() {
        let configs = DeviceConfigurations::load(Path::new("/no/such/file.textproto")).unwrap();
        assert_eq!(configs.for_module("CtsFooTest"), ModuleDeviceConfig::default());
    }

    #[test]
    fn parses_device_count_per_module() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_configurations.textproto");
        std::fs::write(
            &path,
            r#"
            module_configuration {
              module_name: "CtsFooTest"
              device_count: 2
            }
            module_configuration {
              module_name: "CtsBarTest"
              device_count: 1
            }
            "#,
        )
        .unwrap();

        let configs = DeviceConfigurations::load(&path).unwrap();
        assert_eq!(configs.for_module("CtsFooTest").device_count, 2);
        assert_eq!(configs.for_module("CtsBarTest").device_count, 1);
        assert_eq!(configs.for_module("CtsUnlisted"), ModuleDeviceConfig::default());
    }

    #[test]
    fn invalid_device_count_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_configurations.textproto");
        std::fs::write(
            &path,
            r#"
            module_configuration {
              module_name: "CtsFooTest"
              device_count: not_a_number
            }
            "#,
        )
        .unwrap();

        let err = DeviceConfigurations::load(&path).unwrap_err();
        assert!(matches!(err, PlannerError::ConfigParseError(_)));
    }

    #[test]
    fn missing_module_name_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_configurations.textproto");
        std::fs::write(
            &path,
            r#"
            module_configuration {
              device_count: 1
            }
            "#,
        )
        .unwrap();

        let err = DeviceConfigurations::load(&path).unwrap_err();
        assert!(matches!(err, PlannerError::ConfigParseError(_)));
    }
}

// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Device selection (spec §4.5 "Device selection"): a closed set of criteria, each optional, that
//! together decide whether a device is eligible for a job.

use scheduler::Device;

const BATTERY_LEVEL_KEY: &str = "battery_level";
const BATTERY_TEMPERATURE_KEY: &str = "battery_temperature";
const SDK_LEVEL_KEY: &str = "sdk_level";

/// A job's device-selection criteria. Every field is a wildcard when absent (spec §4.5 "missing
/// criterion = wildcard").
#[derive(Clone, Default, Debug)]
pub struct DeviceSelection {
    pub serials: Vec<String>,
    pub exclude_serials: Vec<String>,
    pub product_types: Vec<String>,
    pub properties: Vec<(String, String)>,
    pub min_battery_level: Option<u32>,
    pub max_battery_level: Option<u32>,
    pub max_battery_temperature: Option<u32>,
    pub min_sdk_level: Option<u32>,
    pub max_sdk_level: Option<u32>,
}

fn dimension_as_u32(device: &Device, key: &str) -> Option<u32> {
    device.dimensions.get(key).and_then(|v| v.parse().ok())
}

/// True iff every criterion of `selection` individually matches `device` (spec §4.5
/// "`matches(device, selection)` is true iff every criterion individually matches"). A bound
/// criterion that names a dimension the device doesn't report fails closed, since there is no
/// value to check the bound against.
pub fn matches(device: &Device, selection: &DeviceSelection) -> bool {
    if !selection.serials.is_empty() && !selection.serials.contains(&device.universal_id) {
        return false;
    }
    if selection.exclude_serials.contains(&device.universal_id) {
        return false;
    }
    if !selection.product_types.is_empty()
        && !selection
            .product_types
            .iter()
            .any(|t| device.types.contains(t))
    {
        return false;
    }
    for (key, value) in &selection.properties {
        if device.dimensions.get(key) != Some(value) {
            return false;
        }
    }
    fn within_bound(reported: Option<u32>, ok: impl Fn(u32) -> bool) -> bool {
        match reported {
            Some(v) => ok(v),
            None => false,
        }
    }
    if let Some(min) = selection.min_battery_level {
        if !within_bound(dimension_as_u32(device, BATTERY_LEVEL_KEY), |v| v >= min) {
            return false;
        }
    }
    if let Some(max) = selection.max_battery_level {
        if !within_bound(dimension_as_u32(device, BATTERY_LEVEL_KEY), |v| v <= max) {
            return false;
        }
    }
    if let Some(max) = selection.max_battery_temperature {
        if !within_bound(dimension_as_u32(device, BATTERY_TEMPERATURE_KEY), |v| v <= max) {
            return false;
        }
    }
    if let Some(min) = selection.min_sdk_level {
        if !within_bound(dimension_as_u32(device, SDK_LEVEL_KEY), |v| v >= min) {
            return false;
        }
    }
    if let Some(max) = selection.max_sdk_level {
        if !within_bound(dimension_as_u32(device, SDK_LEVEL_KEY), |v| v <= max) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use scheduler::DeviceStatus;

    use super::*;

    fn device(universal_id: &str, types: &[&str], dimensions: &[(&str, &str)]) -> Device {
        Device {
            device_id: universal_id.to_owned(),
            lab_ip: "10.0.0.1".to_owned(),
            universal_id: universal_id.to_owned(),
            types: types.iter().map(|t| t.to_string()).collect(),
            owners: Vec::new(),
            dimensions: dimensions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            status: DeviceStatus::Idle,
        }
    }

    #[test]
    fn empty_selection_matches_everything() {
        let device = device("d1", &["phone"], &[]);
        assert!(matches(&device, &DeviceSelection::default()));
    }

    #[test]
    fn serial_selection_is_exact() {
        let device = device("d1", &["phone"], &[]);
        let selection = DeviceSelection {
            serials: vec!["d2".to_owned()],
            ..Default::default()
        };
        assert!(!matches(&device, &selection));
    }

    #[test]
    fn exclude_serials_veto_a_match() {
        let device = device("d1", &["phone"], &[]);
        let selection = DeviceSelection {
            exclude_serials: vec!["d1".to_owned()],
            ..Default::default()
        };
        assert!(!matches(&device, &selection));
    }

    #[test]
    fn battery_bounds_require_the_reported_dimension() {
        let reported = device("d1", &["phone"], &[(BATTERY_LEVEL_KEY, "40")]);
        let unreported = device("d2", &["phone"], &[]);
        let selection = DeviceSelection {
            min_battery_level: Some(30),
            ..Default::default()
        };
        assert!(matches(&reported, &selection));
        assert!(!matches(&unreported, &selection));
    }

    #[test]
    fn property_selection_requires_exact_value_match() {
        let device = device("d1", &["phone"], &[("sim", "dual")]);
        let selection = DeviceSelection {
            properties: vec![("sim".to_owned(), "single".to_owned())],
            ..Default::default()
        };
        assert!(!matches(&device, &selection));
    }
}

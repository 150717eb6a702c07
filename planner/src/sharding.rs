// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Sharding (spec §4.5 "Sharding"): expands a device-type selection into one-or-more
//! `sub_device_spec`s, or collapses it to a single multi-matching dimension.

use scheduler::SubDeviceSpec;

/// Expands `device_type` into sub-device specs for a job (spec §4.5 "Sharding").
///
/// Collapses to a single spec when module-sharding is enabled, no explicit test name narrows the
/// run, and the plan isn't a retry; otherwise expands to `min(available_device_count, shard_count)`
/// identical specs, one per shard.
pub fn shard_sub_device_specs(
    device_type: &str,
    shard_count: u32,
    module_sharding_enabled: bool,
    test_name_is_empty: bool,
    plan: &str,
    available_device_count: usize,
) -> Vec<SubDeviceSpec> {
    if module_sharding_enabled && test_name_is_empty && plan != "retry" {
        return vec![SubDeviceSpec {
            device_type: device_type.to_owned(),
        }];
    }
    let count = (shard_count.max(1) as usize).min(available_device_count.max(1));
    (0..count)
        .map(|_| SubDeviceSpec {
            device_type: device_type.to_owned(),
        })
        .collect()
}

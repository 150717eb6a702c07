// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::time::Duration;

use crate::{Level, SpanId, WorkunitMetadata, WorkunitStore};

#[test]
fn heavy_hitters_only_leaves() {
    let ws = WorkunitStore::new(true, Level::Debug);
    ws.start_workunit(SpanId(0), "root", Level::Info, None, None);
    ws.start_workunit(SpanId(1), "child", Level::Info, Some(SpanId(0)), None);

    // Only the leaf (child) should be reported: the root has a running child.
    let hitters = ws.heavy_hitters(10);
    assert_eq!(hitters.keys().cloned().collect::<Vec<_>>(), vec![SpanId(1)]);
}

#[test]
fn heavy_hitters_respects_blocked() {
    let ws = WorkunitStore::new(true, Level::Debug);
    ws.start_workunit(SpanId(0), "root", Level::Info, None, None);
    ws.mark_blocked(SpanId(0));

    assert!(ws.heavy_hitters(10).is_empty());
}

#[test]
fn completed_workunit_disappears_from_heavy_hitters() {
    let ws = WorkunitStore::new(true, Level::Debug);
    let wu = ws.start_workunit(SpanId(0), "root", Level::Info, None, None);
    ws.complete_workunit(wu);

    assert!(ws.heavy_hitters(10).is_empty());
}

#[test]
fn straggling_workunits_reports_only_over_threshold() {
    let ws = WorkunitStore::new(true, Level::Debug);
    ws.start_workunit(SpanId(0), "root", Level::Info, None, None);

    let stragglers = ws.straggling_workunits(Duration::from_secs(0));
    assert_eq!(stragglers.len(), 1);
    assert_eq!(stragglers[0].1, "root");

    let none = ws.straggling_workunits(Duration::from_secs(3600));
    assert!(none.is_empty());
}

#[test]
fn disabled_store_records_nothing() {
    let ws = WorkunitStore::new(false, Level::Debug);
    ws.start_workunit(SpanId(0), "root", Level::Info, None, None);
    assert!(ws.heavy_hitters(10).is_empty());
}

#[test]
fn span_id_renders_as_16_hex_digits() {
    let hex_string = SpanId(1).to_string();
    assert_eq!(16, hex_string.len());
    for ch in hex_string.chars() {
        assert!(ch.is_ascii_hexdigit());
    }
    assert_eq!(SpanId(0x_ffff_ffff_ffff_ffff).to_string(), "ffffffffffffffff");
}

#[test]
fn workunit_metadata_default_has_no_description() {
    assert_eq!(WorkunitMetadata::default().desc, None);
}

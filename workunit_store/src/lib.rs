// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A structured span store used to trace session/job/test execution for the monitor pipeline's
//! periodic pull (spec §4.6) and for diagnosing straggling scheduler placements.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use log::Level;

/// Uniquely identifies a workunit within a single process lifetime. Rendered as a fixed-width hex
/// string so that log lines sort and align predictably.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SpanId(pub u64);

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub type ParentIds = Vec<SpanId>;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct WorkunitMetadata {
    pub desc: Option<String>,
}

enum WorkunitState {
    Started { start_time: Instant, blocked: bool },
    Completed { duration: Duration },
}

struct WorkunitRecord {
    name: &'static str,
    level: Level,
    parent_id: Option<SpanId>,
    metadata: Option<WorkunitMetadata>,
    state: WorkunitState,
}

/// A handle to a started workunit. Must be completed via `WorkunitStore::complete_workunit`, or it
/// is leaked as permanently "running" (surfacing in `heavy_hitters`/`straggling_workunits`).
pub struct Workunit {
    pub span_id: SpanId,
    pub parent_id: Option<SpanId>,
}

pub struct WorkunitStore {
    enabled: bool,
    min_level: Level,
    records: Mutex<HashMap<SpanId, WorkunitRecord>>,
}

impl WorkunitStore {
    pub fn new(enabled: bool, min_level: Level) -> WorkunitStore {
        WorkunitStore {
            enabled,
            min_level,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// No-op placeholder mirroring the teacher's thread-local workunit parent tracking; this
    /// workspace threads `parent_id` explicitly instead of relying on thread-local state.
    pub fn init_thread_state(&self, _parent_id: Option<SpanId>) {}

    pub fn start_workunit(
        &self,
        span_id: SpanId,
        name: &'static str,
        level: Level,
        parent_id: Option<SpanId>,
        metadata: Option<WorkunitMetadata>,
    ) -> Workunit {
        if self.enabled && level <= self.min_level {
            self.records.lock().insert(
                span_id,
                WorkunitRecord {
                    name,
                    level,
                    parent_id,
                    metadata,
                    state: WorkunitState::Started {
                        start_time: Instant::now(),
                        blocked: false,
                    },
                },
            );
        }
        Workunit { span_id, parent_id }
    }

    #[doc(hidden)]
    pub fn _start_workunit(
        &self,
        span_id: SpanId,
        name: &'static str,
        level: Level,
        parent_id: Option<SpanId>,
        metadata: Option<WorkunitMetadata>,
    ) -> Workunit {
        self.start_workunit(span_id, name, level, parent_id, metadata)
    }

    pub fn mark_blocked(&self, span_id: SpanId) {
        if let Some(record) = self.records.lock().get_mut(&span_id) {
            if let WorkunitState::Started { blocked, .. } = &mut record.state {
                *blocked = true;
            }
        }
    }

    pub fn complete_workunit(&self, workunit: Workunit) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(&workunit.span_id) {
            if let WorkunitState::Started { start_time, .. } = record.state {
                record.state = WorkunitState::Completed {
                    duration: start_time.elapsed(),
                };
            }
        }
    }

    /// Returns the `count` outermost still-running, unblocked workunits: the leaves of the
    /// currently-active span tree are the ones worth surfacing to an operator.
    pub fn heavy_hitters(&self, count: usize) -> HashMap<SpanId, String> {
        let records = self.records.lock();
        let has_running_child = |span_id: SpanId| {
            records.values().any(|r| {
                r.parent_id == Some(span_id) && matches!(r.state, WorkunitState::Started { .. })
            })
        };
        let mut hitters: Vec<(SpanId, String)> = records
            .iter()
            .filter(|(span_id, r)| {
                matches!(r.state, WorkunitState::Started { blocked: false, .. })
                    && !has_running_child(**span_id)
            })
            .map(|(span_id, r)| (*span_id, r.name.to_string()))
            .collect();
        hitters.sort_by_key(|(span_id, _)| *span_id);
        hitters.truncate(count);
        hitters.into_iter().collect()
    }

    /// Returns running, unblocked workunits that have been alive for at least `threshold`.
    pub fn straggling_workunits(&self, threshold: Duration) -> Vec<(Duration, String)> {
        let records = self.records.lock();
        let mut stragglers: Vec<(Duration, String)> = records
            .values()
            .filter_map(|r| match r.state {
                WorkunitState::Started {
                    start_time,
                    blocked: false,
                } if start_time.elapsed() >= threshold => {
                    Some((start_time.elapsed(), r.name.to_string()))
                }
                _ => None,
            })
            .collect();
        stragglers.sort_by(|a, b| b.0.cmp(&a.0));
        stragglers
    }

    /// Returns (still-running, completed) workunit names at or above `level`, for diagnostics.
    pub fn latest_workunits(&self, level: Level) -> (Vec<String>, Vec<String>) {
        let records = self.records.lock();
        let mut started = Vec::new();
        let mut completed = Vec::new();
        for record in records.values() {
            if record.level > level {
                continue;
            }
            match record.state {
                WorkunitState::Started { .. } => started.push(record.name.to_string()),
                WorkunitState::Completed { .. } => completed.push(record.name.to_string()),
            }
        }
        (started, completed)
    }
}

#[cfg(test)]
mod tests;

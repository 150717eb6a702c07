// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Timeout defaults and the `test_timeout` formula (spec §4.5 "Timeouts").

use concrete_time::Duration;
use scheduler::JobTimeouts;

const TF_JOB_DEFAULT_DAYS: u64 = 15;
const TF_START_DEFAULT_DAYS: u64 = 14;
const NON_TF_JOB_DEFAULT_DAYS: u64 = 5;
const NON_TF_START_DEFAULT_DAYS: u64 = 4;

const TEST_TIMEOUT_FLOOR: Duration = Duration::from_secs(2 * 60);
const TEST_TIMEOUT_TRIM: Duration = Duration::from_secs(60);

/// `test_timeout = max(jobTimeout - 1 min, jobTimeout / 2)` when `jobTimeout >= 2 min`, else
/// `jobTimeout / 2` (spec §4.5).
fn test_timeout(job_timeout: Duration) -> Duration {
    let half = job_timeout.div_u32(2);
    if job_timeout < TEST_TIMEOUT_FLOOR {
        return half;
    }
    match job_timeout.checked_sub(TEST_TIMEOUT_TRIM) {
        Some(trimmed) if trimmed > half => trimmed,
        _ => half,
    }
}

/// Resolves a job's timeout triple from explicit overrides, falling back to the tradefed or
/// non-tradefed defaults (spec §4.5 "Timeouts").
pub fn resolve_timeouts(
    is_tradefed: bool,
    explicit_job: Option<Duration>,
    explicit_start: Option<Duration>,
) -> JobTimeouts {
    let job = explicit_job.unwrap_or_else(|| {
        Duration::from_days(if is_tradefed {
            TF_JOB_DEFAULT_DAYS
        } else {
            NON_TF_JOB_DEFAULT_DAYS
        })
    });
    let start = explicit_start.unwrap_or_else(|| {
        Duration::from_days(if is_tradefed {
            TF_START_DEFAULT_DAYS
        } else {
            NON_TF_START_DEFAULT_DAYS
        })
    });
    JobTimeouts {
        job,
        test: test_timeout(job),
        start,
    }
}

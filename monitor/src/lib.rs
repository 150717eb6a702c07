// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The monitor pipeline (spec §4.6): periodic pull, batching, canonical-JSON publish.

pub mod batch;
pub mod pipeline;
pub mod snapshot;

pub use batch::{MAX_BATCH_BYTES, MAX_BATCH_COUNT};
pub use pipeline::{
    BatchFailureCallback, BatchSuccessCallback, MonitorPipeline, MonitorSink,
    PublishLatencyRecorder,
};
pub use snapshot::{MonitorMessage, Puller, Snapshot};

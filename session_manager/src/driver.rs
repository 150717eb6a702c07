// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The execution hook a session's cooperative task calls into (spec §4.3 "Execution").
//!
//! The core does not itself execute tests (spec §1 "Non-goals"); constructing job configs via
//! the planner and submitting them to the scheduler is real work performed by whatever
//! `SessionDriver` `core_server` wires up. This trait is the seam between the two.

use async_trait::async_trait;
use async_latch::AsyncLatch;

use crate::types::{SessionConfig, SessionOutput};

#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Runs `config` to completion, observing `abort` at cooperative checkpoints (spec §5
    /// "Cancellation": "a well-behaved plugin observes it at its next cooperative checkpoint").
    async fn run(&self, session_id: &str, config: &SessionConfig, abort: AsyncLatch) -> SessionOutput;
}

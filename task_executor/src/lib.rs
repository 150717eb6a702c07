// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A cheaply-`Clone`-able handle to a tokio runtime, used to spawn session executions and
//! scheduler/monitor background loops without passing a `tokio::runtime::Handle` around directly.

use std::future::Future;

use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Executor {
    handle: tokio::runtime::Handle,
}

impl Executor {
    /// Construct an `Executor` wrapping the handle of the currently-running tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime context.
    pub fn new() -> Executor {
        Executor {
            handle: tokio::runtime::Handle::current(),
        }
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(f)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

impl Default for Executor {
    fn default() -> Executor {
        Executor::new()
    }
}

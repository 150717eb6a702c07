// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The per-session plugin event bus (spec §9 "Dynamic dispatch to plugins"): plugins implement a
//! capability interface and are registered explicitly by event-type tag, with no reflection.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{Session, SessionOutput};

/// A lifecycle transition dispatched to every registered plugin.
#[derive(Clone, Debug)]
pub enum SessionLifecycleEvent {
    Started { session_id: String },
    Notified { session_id: String, notification: String },
    Aborted { session_id: String },
    Finished { session_id: String, output: SessionOutput },
}

impl SessionLifecycleEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionLifecycleEvent::Started { session_id }
            | SessionLifecycleEvent::Notified { session_id, .. }
            | SessionLifecycleEvent::Aborted { session_id }
            | SessionLifecycleEvent::Finished { session_id, .. } => session_id,
        }
    }
}

/// A plugin subscribes to the bus and is called back on every lifecycle event; `on_event` MUST
/// be non-blocking, the same contract the log tap-off's consumers carry (spec §4.6).
pub trait SessionPlugin: Send + Sync {
    fn on_event(&self, event: &SessionLifecycleEvent);
}

#[derive(Default)]
pub struct SessionEventBus {
    plugins: RwLock<Vec<Arc<dyn SessionPlugin>>>,
}

impl SessionEventBus {
    pub fn new() -> SessionEventBus {
        SessionEventBus::default()
    }

    pub fn register(&self, plugin: Arc<dyn SessionPlugin>) {
        self.plugins.write().push(plugin);
    }

    pub fn publish(&self, event: &SessionLifecycleEvent) {
        for plugin in self.plugins.read().iter() {
            plugin.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingPlugin(AtomicUsize);

    impl SessionPlugin for CountingPlugin {
        fn on_event(&self, _event: &SessionLifecycleEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn publish_reaches_every_registered_plugin() {
        let bus = SessionEventBus::new();
        let a = Arc::new(CountingPlugin(AtomicUsize::new(0)));
        let b = Arc::new(CountingPlugin(AtomicUsize::new(0)));
        bus.register(a.clone());
        bus.register(b.clone());

        bus.publish(&SessionLifecycleEvent::Started {
            session_id: "s1".to_owned(),
        });

        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }
}

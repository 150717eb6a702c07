// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The allocation-event subscriber bus (spec §4.2 "Events"): external collaborators are notified
//! after each successful allocation, and are responsible for calling `unallocate` themselves if
//! they reject the event (spec §4.2).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::AllocationEvent;

pub trait AllocationEventSubscriber: Send + Sync {
    fn on_allocated(&self, event: &AllocationEvent);
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn AllocationEventSubscriber>>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AllocationEventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn publish(&self, event: &AllocationEvent) {
        for subscriber in self.subscribers.read().iter() {
            subscriber.on_allocated(event);
        }
    }
}

// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Batching of monitor messages under the spec §4.6 caps.

use crate::snapshot::MonitorMessage;

/// Batch size cap (9 MiB) and count cap (1 000 messages) per spec §4.6.
pub const MAX_BATCH_BYTES: usize = 9 * 1024 * 1024;
pub const MAX_BATCH_COUNT: usize = 1_000;

/// Greedily packs `messages` into batches no larger than `MAX_BATCH_BYTES`/`MAX_BATCH_COUNT`. A
/// message that alone exceeds `MAX_BATCH_BYTES` is dropped with a warning (spec §4.6 "Messages
/// exceeding the batch cap individually are dropped").
pub fn batch(messages: Vec<MonitorMessage>) -> Vec<Vec<MonitorMessage>> {
    let mut batches: Vec<Vec<MonitorMessage>> = Vec::new();
    let mut current: Vec<MonitorMessage> = Vec::new();
    let mut current_bytes = 0usize;

    for message in messages {
        let size = message.approximate_size_bytes();
        if size > MAX_BATCH_BYTES {
            log::warn!(
                "dropping monitor message for {} ({size} bytes exceeds the {MAX_BATCH_BYTES}-byte batch cap)",
                message.entity_id
            );
            continue;
        }

        let would_overflow =
            current.len() >= MAX_BATCH_COUNT || current_bytes + size > MAX_BATCH_BYTES;
        if would_overflow && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }

        current_bytes += size;
        current.push(message);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn message(id: &str) -> MonitorMessage {
        MonitorMessage {
            entity_id: id.to_owned(),
            timestamp_millis: 0,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn respects_the_count_cap() {
        let messages: Vec<MonitorMessage> = (0..2500).map(|i| message(&i.to_string())).collect();
        let batches = batch(messages);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), MAX_BATCH_COUNT);
        assert_eq!(batches[2].len(), 500);
    }

    #[test]
    fn drops_a_single_oversized_message() {
        let mut oversized = message("big");
        oversized
            .attributes
            .insert("blob".to_owned(), "x".repeat(MAX_BATCH_BYTES + 1));
        let batches = batch(vec![message("a"), oversized, message("b")]);
        let all: Vec<&MonitorMessage> = batches.iter().flatten().collect();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|m| m.entity_id != "big"));
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(batch(Vec::new()).is_empty());
    }
}

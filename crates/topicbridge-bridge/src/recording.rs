// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! Without a recorder the calls are no-ops.

use metrics::{describe_counter, describe_gauge};

use crate::queue::JobKind;

/// Register all topicbridge metric descriptions.
pub fn register_metrics() {
    describe_counter!("topicbridge_queue_enqueued_total", "Relay items queued");
    describe_counter!(
        "topicbridge_queue_outcomes_total",
        "Relay item outcomes by kind and result"
    );
    describe_counter!(
        "topicbridge_media_fallbacks_total",
        "Media relays degraded to a text message"
    );
    describe_counter!("topicbridge_topics_created_total", "Forum topics created");
    describe_gauge!("topicbridge_message_pairs", "Indexed message pairs");
}

pub fn record_enqueued(kind: JobKind) {
    metrics::counter!("topicbridge_queue_enqueued_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_outcome(kind: JobKind, outcome: &'static str) {
    metrics::counter!(
        "topicbridge_queue_outcomes_total",
        "kind" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_media_fallback(kind: &str) {
    metrics::counter!("topicbridge_media_fallbacks_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_topic_created() {
    metrics::counter!("topicbridge_topics_created_total").increment(1);
}

pub fn set_message_pairs(count: usize) {
    metrics::gauge!("topicbridge_message_pairs").set(count as f64);
}

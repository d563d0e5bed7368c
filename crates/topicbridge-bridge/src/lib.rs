// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge engine for the topicbridge relay.
//!
//! The [`BridgeEngine`] is the central coordinator that:
//! - maps conversations and identities between the two networks
//! - creates, verifies and recreates forum topics
//! - serializes relay work through a retrying delivery queue
//! - correlates messages across networks for replies and read receipts

pub mod correlation;
pub mod engine;
pub mod media;
pub mod presence;
pub mod queue;
pub mod receipts;
pub mod recording;
pub mod state;
pub mod topic_cache;
pub mod topics;

pub use engine::{BridgeEngine, EngineDeps, MaintenanceReport};
pub use media::{FfmpegTranscoder, MediaRelay, Transcoder};
pub use queue::{DeliveryQueue, DrainSummary, JobKind, JobPayload, QueueStats};
pub use state::BridgeState;
pub use topics::{RecreateReport, TopicManager};

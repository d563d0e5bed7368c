// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for topicbridge integration tests.
//!
//! Provides mock adapters and a fake clock for fast, deterministic,
//! CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockPrimary`] - Mock primary transport with call capture and failure injection
//! - [`MockSecondary`] - Mock forum transport with sequential ids and deletable topics
//! - [`InMemoryStore`] - Mapping store with write counting
//! - [`FakeClock`] - Clock whose sleeps return instantly and are recorded

pub mod clock;
pub mod memory_store;
pub mod mock_primary;
pub mod mock_secondary;

pub use clock::FakeClock;
pub use memory_store::InMemoryStore;
pub use mock_primary::{MockPrimary, SentPrimary};
pub use mock_secondary::{CreatedTopic, MockSecondary, SecondaryCall, THREAD_NOT_FOUND};

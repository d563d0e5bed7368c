// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp adapter for the topicbridge relay.
//!
//! Talks to a WhatsApp Web gateway sidecar: outbound calls go through
//! [`GatewayClient`] (the bridge's [`PrimaryTransport`](topicbridge_core::PrimaryTransport)),
//! inbound events arrive on the signed [`webhook`].

pub mod client;
pub mod webhook;
pub mod wire;

pub use client::GatewayClient;
pub use webhook::{WebhookState, router, serve, verify_signature};

// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the mapping and snapshot tables.

pub mod mappings;
pub mod snapshot;

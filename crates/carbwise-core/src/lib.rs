// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Carbwise dosing assistant.
//!
//! This crate provides the error taxonomy, domain types, time-of-day
//! arithmetic, shared vision prompts and the adapter traits implemented by
//! the storage, channel and provider crates.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;
pub mod vision;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{MINUTES_PER_DAY, TimePeriod};
pub use error::{Bound, CarbwiseError, ErrorCategory, ValidationError};
pub use types::{AdapterType, ConversationState, HealthStatus, MessageId};

pub use traits::{ChannelAdapter, PluginAdapter, StateStore, StorageAdapter, VisionProvider};

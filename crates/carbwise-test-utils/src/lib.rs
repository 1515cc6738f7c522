// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Carbwise integration tests.
//!
//! Provides mock adapters and a harness that wires a real conversation
//! engine to a temp SQLite database, so flows run end to end without
//! Telegram or any vision API.
//!
//! # Components
//!
//! - [`MockVisionProvider`] - Vision provider with scripted replies
//! - [`MockChannel`] - Chat channel with message injection and capture
//! - [`TestHarness`] - Engine, storage and mocks assembled for one user

pub mod harness;
pub mod mock_channel;
pub mod mock_vision;

pub use harness::{TEST_CHAT, TEST_USER, TestHarness, TestHarnessBuilder, joined_text};
pub use mock_channel::MockChannel;
pub use mock_vision::MockVisionProvider;

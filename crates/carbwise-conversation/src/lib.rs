// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation layer for the Carbwise dosing assistant.
//!
//! [`ConversationEngine`] turns chat events into replies. It owns no
//! transport details: replies carry transport-neutral menus built in
//! [`menus`], and the text around them is rendered in [`render`]. Dialog
//! state lives behind the `StateStore` trait; [`MemoryStateStore`] is the
//! in-process implementation with inactivity expiry, and `RedisStateStore`
//! (feature `redis`) shares state through a Redis server.

pub mod action;
pub mod engine;
pub mod menus;
#[cfg(feature = "redis")]
pub mod redis_state;
pub mod render;
pub mod shutdown;
pub mod state;

pub use action::{Action, Simple};
pub use engine::ConversationEngine;
pub use state::MemoryStateStore;

#[cfg(feature = "redis")]
pub use redis_state::RedisStateStore;

// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Channel, storage and vision adapters extend the [`PluginAdapter`] base
//! trait and use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod channel;
pub mod state;
pub mod storage;
pub mod vision;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use state::StateStore;
pub use storage::StorageAdapter;
pub use vision::VisionProvider;

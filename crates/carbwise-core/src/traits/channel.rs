// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for chat transports.

use async_trait::async_trait;

use crate::error::CarbwiseError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelCapabilities, ChatId, InboundMessage, MessageId, OutboundMessage};

/// Adapter for a bidirectional chat transport.
///
/// The transport renders [`OutboundMessage`] menus and formatting in its own
/// terms; the conversation core only produces descriptors.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Establishes a connection to the messaging platform.
    async fn connect(&mut self) -> Result<(), CarbwiseError>;

    /// Sends a message through the channel.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, CarbwiseError>;

    /// Removes a previously sent message.
    async fn delete_message(&self, chat_id: ChatId, id: &MessageId) -> Result<(), CarbwiseError>;

    /// Receives the next inbound event from the channel.
    async fn receive(&self) -> Result<InboundMessage, CarbwiseError>;
}

// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with injectable inbound events
//! and captured outbound messages for assertion in tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use carbwise_core::traits::adapter::PluginAdapter;
use carbwise_core::traits::channel::ChannelAdapter;
use carbwise_core::types::{
    AdapterType, ChannelCapabilities, ChatId, HealthStatus, InboundMessage, MessageId,
    OutboundMessage,
};
use carbwise_core::CarbwiseError;

/// A mock chat channel for testing.
///
/// - **inbound**: events injected via `inject_message()` are returned by `receive()`
/// - **sent**: messages passed to `send()` are captured with the id they were given
/// - **deleted**: ids passed to `delete_message()`
pub struct MockChannel {
    inbound: Arc<Mutex<VecDeque<InboundMessage>>>,
    sent: Arc<Mutex<Vec<(MessageId, OutboundMessage)>>>,
    deleted: Arc<Mutex<Vec<MessageId>>>,
    notify: Arc<Notify>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Queues an event for the next `receive()`.
    pub async fn inject_message(&self, msg: InboundMessage) {
        self.inbound.lock().await.push_back(msg);
        self.notify.notify_one();
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Removes and returns everything sent so far.
    pub async fn take_sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .drain(..)
            .map(|(_, msg)| msg)
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Plain texts of sent messages that were later deleted.
    pub async fn deleted_texts(&self) -> Vec<String> {
        let deleted = self.deleted.lock().await;
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(id, _)| deleted.contains(id))
            .map(|(_, msg)| msg.plain_text())
            .collect()
    }

    pub async fn deleted_count(&self) -> usize {
        self.deleted.lock().await.len()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, CarbwiseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CarbwiseError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_photos: true,
            supports_menus: true,
            supports_markdown: false,
            supports_delete: true,
        }
    }

    async fn connect(&mut self) -> Result<(), CarbwiseError> {
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, CarbwiseError> {
        let id = MessageId(format!("mock-msg-{}", uuid::Uuid::new_v4()));
        self.sent.lock().await.push((id.clone(), msg));
        Ok(id)
    }

    async fn delete_message(&self, _chat_id: ChatId, id: &MessageId) -> Result<(), CarbwiseError> {
        self.deleted.lock().await.push(id.clone());
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, CarbwiseError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(msg) = queue.pop_front() {
                    return Ok(msg);
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbwise_core::types::{ExternalUserId, MessageContent, UserProfile};

    fn make_inbound(text: &str) -> InboundMessage {
        InboundMessage {
            id: format!("test-{}", uuid::Uuid::new_v4()),
            channel: "mock".to_string(),
            sender: ExternalUserId(7),
            chat_id: ChatId(7),
            profile: UserProfile::default(),
            content: MessageContent::Text(text.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn receive_returns_injected_messages_in_order() {
        let channel = MockChannel::new();
        channel.inject_message(make_inbound("first")).await;
        channel.inject_message(make_inbound("second")).await;

        let first = channel.receive().await.unwrap();
        let second = channel.receive().await.unwrap();
        assert_eq!(first.content, MessageContent::Text("first".into()));
        assert_eq!(second.content, MessageContent::Text("second".into()));
    }

    #[tokio::test]
    async fn receive_waits_for_injection() {
        let channel = Arc::new(MockChannel::new());
        let injector = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            injector.inject_message(make_inbound("delayed")).await;
        });

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), channel.receive())
            .await
            .expect("receive timed out")
            .unwrap();
        assert_eq!(received.content, MessageContent::Text("delayed".into()));
    }

    #[tokio::test]
    async fn sent_and_deleted_messages_are_captured() {
        let channel = MockChannel::new();
        let progress = channel
            .send(OutboundMessage::text(ChatId(7), "working"))
            .await
            .unwrap();
        channel
            .send(OutboundMessage::text(ChatId(7), "done"))
            .await
            .unwrap();
        channel.delete_message(ChatId(7), &progress).await.unwrap();

        assert_eq!(channel.sent_count().await, 2);
        assert_eq!(channel.deleted_texts().await, vec!["working"]);

        let taken = channel.take_sent().await;
        assert_eq!(taken.len(), 2);
        assert_eq!(channel.sent_count().await, 0);
    }
}

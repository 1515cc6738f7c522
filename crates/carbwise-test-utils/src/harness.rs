// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end conversation testing.
//!
//! `TestHarness` assembles a real [`ConversationEngine`] over a temp SQLite
//! database, an in-memory state store, a [`MockChannel`] and a
//! [`MockVisionProvider`]. Each helper feeds one event through
//! `ConversationEngine::handle` and returns the replies it produced.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use carbwise_analysis::{AnalysisOrchestrator, RetryPolicy};
use carbwise_config::model::StorageConfig;
use carbwise_conversation::{Action, ConversationEngine, MemoryStateStore};
use carbwise_core::types::{
    ChatId, ConversationState, ExternalUserId, InboundMessage, MessageContent, OutboundMessage,
    User, UserProfile,
};
use carbwise_core::{CarbwiseError, ChannelAdapter, StateStore, StorageAdapter, VisionProvider};
use carbwise_dosing::{DayClock, DoseCalculator};
use carbwise_ratio::RatioIntervalStore;
use carbwise_storage::SqliteStorage;

use crate::mock_channel::MockChannel;
use crate::mock_vision::MockVisionProvider;

/// The user every harness event comes from.
pub const TEST_USER: ExternalUserId = ExternalUserId(4242);
pub const TEST_CHAT: ChatId = ChatId(4242);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    state_ttl: Duration,
    clock: DayClock,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            state_ttl: Duration::from_secs(3600),
            clock: DayClock::Local,
        }
    }

    /// Inactivity window of the conversation state.
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: DayClock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, CarbwiseError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| CarbwiseError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        });
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let state = Arc::new(MemoryStateStore::new(self.state_ttl));
        let channel = Arc::new(MockChannel::new());
        let vision = Arc::new(MockVisionProvider::new("mock-vision"));

        let ratios = RatioIntervalStore::new(storage.clone());
        let dosing = DoseCalculator::new(ratios.clone(), self.clock);
        let analysis = AnalysisOrchestrator::new(
            vec![vision.clone() as Arc<dyn VisionProvider>],
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::ZERO,
            },
        )?;
        let cancel = CancellationToken::new();

        let engine = Arc::new(ConversationEngine::new(
            storage.clone(),
            state.clone() as Arc<dyn StateStore>,
            ratios.clone(),
            dosing,
            Arc::new(analysis),
            channel.clone() as Arc<dyn ChannelAdapter>,
            cancel.clone(),
        ));

        Ok(TestHarness {
            engine,
            storage,
            state,
            ratios,
            channel,
            vision,
            cancel,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete conversation stack with mock adapters and temp storage.
pub struct TestHarness {
    pub engine: Arc<ConversationEngine>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    pub state: Arc<MemoryStateStore>,
    pub ratios: RatioIntervalStore,
    pub channel: Arc<MockChannel>,
    pub vision: Arc<MockVisionProvider>,
    /// Shared with the engine; cancelling it aborts in-flight analyses.
    pub cancel: CancellationToken,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, CarbwiseError> {
        Self::builder().build().await
    }

    /// An inbound event from [`TEST_USER`].
    pub fn inbound(content: MessageContent) -> InboundMessage {
        InboundMessage {
            id: uuid::Uuid::new_v4().to_string(),
            channel: "mock".to_string(),
            sender: TEST_USER,
            chat_id: TEST_CHAT,
            profile: UserProfile {
                username: Some("tester".to_string()),
                first_name: Some("Test".to_string()),
                last_name: None,
            },
            content,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Feeds one event through the engine and returns the replies it sent.
    pub async fn send(&self, content: MessageContent) -> Vec<OutboundMessage> {
        self.channel.take_sent().await;
        self.engine.handle(Self::inbound(content)).await;
        self.channel.take_sent().await
    }

    pub async fn command(&self, name: &str, args: &str) -> Vec<OutboundMessage> {
        self.send(MessageContent::Command {
            name: name.to_string(),
            args: args.to_string(),
        })
        .await
    }

    pub async fn press(&self, action: impl Into<Action>) -> Vec<OutboundMessage> {
        self.send(MessageContent::Callback {
            data: action.into().to_string(),
        })
        .await
    }

    pub async fn text(&self, text: &str) -> Vec<OutboundMessage> {
        self.send(MessageContent::Text(text.to_string())).await
    }

    pub async fn photo(&self, caption: Option<&str>) -> Vec<OutboundMessage> {
        self.send(MessageContent::Photo {
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
            caption: caption.map(str::to_string),
            file_ref: Some("photo-file-id".to_string()),
        })
        .await
    }

    pub async fn conversation_state(&self) -> ConversationState {
        self.state.get_state(TEST_USER).await.unwrap_or_default()
    }

    /// The stored user behind [`TEST_USER`], created on first use.
    pub async fn user(&self) -> Result<User, CarbwiseError> {
        self.storage
            .get_or_create_user(TEST_USER, &UserProfile::default())
            .await
    }
}

/// Plain text of every reply, joined for substring assertions.
pub fn joined_text(replies: &[OutboundMessage]) -> String {
    replies
        .iter()
        .map(OutboundMessage::plain_text)
        .collect::<Vec<_>>()
        .join("\n")
}

// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Carbwise pipeline.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::clock::TimePeriod;

/// Internal user identifier assigned by storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// The chat platform's identifier for a person. Conversation state is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalUserId(pub i64);

/// Chat to deliver replies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Unique identifier for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Vision,
    Storage,
}

// --- Users ---

/// Display names reported by the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub external_id: ExternalUserId,
    pub profile: UserProfile,
    /// Informational only; never used in dose computation. Zero when unset.
    pub active_insulin_minutes: u32,
    pub created_at: String,
}

// --- Ratio periods ---

/// A stored dosing-ratio period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioPeriod {
    pub id: i64,
    pub user_id: UserId,
    pub period: TimePeriod,
    /// Insulin units per bread unit. Always `> 0`.
    pub ratio: f64,
}

impl RatioPeriod {
    pub fn start_minute(&self) -> u32 {
        self.period.start_minute()
    }

    pub fn end_minute(&self) -> u32 {
        self.period.end_minute()
    }
}

/// A period waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRatioPeriod {
    pub period: TimePeriod,
    pub ratio: f64,
}

/// A set of ratio-period mutations applied in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioBatch {
    pub delete: Vec<i64>,
    pub update: Vec<RatioPeriod>,
    pub insert: Vec<NewRatioPeriod>,
}

impl RatioBatch {
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.update.is_empty() && self.insert.is_empty()
    }
}

// --- Food analysis ---

/// Model-reported confidence in an analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Unknown,
}

impl Confidence {
    /// Reads a provider label; anything unrecognized is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        label
            .trim()
            .to_ascii_lowercase()
            .parse()
            .unwrap_or(Confidence::Unknown)
    }

    /// Numeric score used at the presentation and persistence boundary.
    pub fn score(self) -> f64 {
        match self {
            Confidence::High => 0.9,
            Confidence::Medium => 0.6,
            Confidence::Low => 0.3,
            Confidence::Unknown => 0.5,
        }
    }
}

/// Food analysis to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFoodAnalysis {
    pub user_id: UserId,
    pub image_ref: Option<String>,
    pub declared_weight_grams: Option<f64>,
    pub resolved_weight_grams: Option<f64>,
    pub food_items: Vec<String>,
    pub carbs_grams: f64,
    pub bread_units: f64,
    pub confidence: Confidence,
    pub rationale: String,
    pub provider: String,
    /// Ratio active at analysis time, if any.
    pub ratio: Option<f64>,
    pub dose_units: f64,
}

/// A persisted food analysis. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodAnalysisRecord {
    pub id: i64,
    pub user_id: UserId,
    pub image_ref: Option<String>,
    pub declared_weight_grams: Option<f64>,
    pub resolved_weight_grams: Option<f64>,
    pub food_items: Vec<String>,
    pub carbs_grams: f64,
    pub bread_units: f64,
    pub confidence: Confidence,
    pub confidence_score: f64,
    pub rationale: String,
    pub provider: String,
    pub ratio: Option<f64>,
    pub dose_units: f64,
    pub created_at: String,
}

/// A user's correction of an earlier analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCorrection {
    pub analysis_id: i64,
    pub user_id: UserId,
    pub original_carbs: f64,
    pub corrected_carbs: f64,
    pub original_weight: Option<f64>,
    pub corrected_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCorrection {
    pub id: i64,
    pub analysis_id: i64,
    pub user_id: UserId,
    pub original_carbs: f64,
    pub corrected_carbs: f64,
    pub original_weight: Option<f64>,
    pub corrected_weight: Option<f64>,
    pub created_at: String,
}

/// A blood glucose reading in mmol/L. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodSugarRecord {
    pub id: i64,
    pub user_id: UserId,
    pub value: f64,
    pub recorded_at: String,
}

// --- Conversation ---

/// Per-user dialog state.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    /// A photo sent now will be analysed.
    AnalysisArmed,
    AwaitingBloodSugarValue,
    AwaitingTimePeriod,
    AwaitingRatioValue,
    AwaitingActiveInsulinDuration,
    /// A pending changeset is shown and waits for yes/no.
    AwaitingChangeConfirmation,
}

// --- Channel messages ---

/// What an inbound chat event carries.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// `/name args`
    Command { name: String, args: String },
    /// Button press with its action payload.
    Callback { data: String },
    Text(String),
    Photo {
        data: Vec<u8>,
        caption: Option<String>,
        /// Platform reference to the uploaded image.
        file_ref: Option<String>,
    },
}

/// An inbound event received from a channel adapter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub channel: String,
    pub sender: ExternalUserId,
    pub chat_id: ChatId,
    pub profile: UserProfile,
    pub content: MessageContent,
    pub timestamp: String,
}

/// One run of formatted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Plain(String),
    Bold(String),
}

/// Transport-neutral formatted text. Channel adapters decide how to mark it up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    spans: Vec<Span>,
}

impl RichText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plain(mut self, text: impl Into<String>) -> Self {
        self.push_plain(text);
        self
    }

    pub fn bold(mut self, text: impl Into<String>) -> Self {
        self.push_bold(text);
        self
    }

    pub fn push_plain(&mut self, text: impl Into<String>) {
        self.spans.push(Span::Plain(text.into()));
    }

    pub fn push_bold(&mut self, text: impl Into<String>) {
        self.spans.push(Span::Bold(text.into()));
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn has_formatting(&self) -> bool {
        self.spans.iter().any(|s| matches!(s, Span::Bold(_)))
    }

    /// The text with all formatting dropped.
    pub fn to_plain_string(&self) -> String {
        self.spans
            .iter()
            .map(|s| match s {
                Span::Plain(t) | Span::Bold(t) => t.as_str(),
            })
            .collect()
    }
}

impl From<String> for RichText {
    fn from(text: String) -> Self {
        RichText::new().plain(text)
    }
}

impl From<&str> for RichText {
    fn from(text: &str) -> Self {
        RichText::new().plain(text)
    }
}

/// A button: visible label plus the action payload sent back on press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub action: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// Rows of buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    pub rows: Vec<Vec<MenuButton>>,
}

impl Menu {
    pub fn row(mut self, buttons: Vec<MenuButton>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    /// All action payloads, row by row.
    pub fn actions(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.action.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    Text(RichText),
    Photo { data: Vec<u8>, caption: RichText },
}

/// An abstract render request sent via a channel adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub body: OutboundBody,
    pub menu: Option<Menu>,
    pub markdown: bool,
}

impl OutboundMessage {
    pub fn text(chat_id: ChatId, text: impl Into<RichText>) -> Self {
        let text = text.into();
        Self {
            chat_id,
            markdown: text.has_formatting(),
            body: OutboundBody::Text(text),
            menu: None,
        }
    }

    pub fn photo(chat_id: ChatId, data: Vec<u8>, caption: RichText) -> Self {
        Self {
            chat_id,
            markdown: caption.has_formatting(),
            body: OutboundBody::Photo { data, caption },
            menu: None,
        }
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }

    /// Plain text of the body or caption, for logs and assertions.
    pub fn plain_text(&self) -> String {
        match &self.body {
            OutboundBody::Text(text) => text.to_plain_string(),
            OutboundBody::Photo { caption, .. } => caption.to_plain_string(),
        }
    }
}

/// Capabilities reported by a channel adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCapabilities {
    pub supports_photos: bool,
    pub supports_menus: bool,
    pub supports_markdown: bool,
    pub supports_delete: bool,
}

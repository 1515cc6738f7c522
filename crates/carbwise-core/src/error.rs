// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Carbwise dosing assistant.

use thiserror::Error;

use crate::clock::TimePeriod;

/// The primary error type used across all Carbwise adapter traits and core operations.
#[derive(Debug, Error)]
pub enum CarbwiseError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors (connection failure, message format, download failure).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Vision provider errors. `status` carries the HTTP status when the
    /// provider answered at all.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Model output could not be turned into a structured result.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// User input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A referenced entity does not exist (or belongs to another user).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Requested adapter was not found or none is available.
    #[error("adapter not found: {adapter_type}/{name}")]
    AdapterNotFound { adapter_type: String, name: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The operation was cancelled by shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// How a failure is surfaced to the person chatting with the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Corrective prompt, conversation state unchanged.
    Validation,
    /// Generic apology, analysis aborted, state reset.
    ExternalProvider,
    /// Generic failure message, logged with context.
    Persistence,
    /// Anything else.
    Internal,
}

impl CarbwiseError {
    /// Builds a provider error carrying an HTTP status.
    pub fn provider_status(message: impl Into<String>, status: u16) -> Self {
        Self::Provider {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Builds a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Returns true for failures worth retrying: rate limits, server errors, timeouts.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Maps the error onto the user-facing taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Provider { .. }
            | Self::Parse { .. }
            | Self::Timeout { .. }
            | Self::AdapterNotFound { .. } => ErrorCategory::ExternalProvider,
            Self::Storage { .. } | Self::NotFound { .. } => ErrorCategory::Persistence,
            Self::Config(_) | Self::Channel { .. } | Self::Cancelled | Self::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

/// Which side of a `HH:MM-HH:MM` range failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Start => f.write_str("start"),
            Bound::End => f.write_str("end"),
        }
    }
}

/// Rejected user input. Every variant maps to a corrective prompt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("period must look like HH:MM-HH:MM")]
    InvalidPeriodFormat,

    #[error("period bounds must not be empty")]
    EmptyBound,

    #[error("invalid {0} time, expected HH:MM on a 24-hour clock")]
    InvalidTimeFormat(Bound),

    #[error("start hour must be within 00-23")]
    StartHourOutOfRange,

    #[error("end hour must be within 00-24")]
    EndHourOutOfRange,

    #[error("hour 24 is only valid as 24:00")]
    Hour24WithMinutes,

    #[error("minute of day {0} is outside 0-1439")]
    MinuteOutOfRange(u32),

    #[error("ratio must be greater than zero")]
    NonPositiveRatio,

    #[error("not a number: {0:?}")]
    InvalidNumber(String),

    #[error("period overlaps {} existing period(s)", conflicts.len())]
    Overlap { conflicts: Vec<TimePeriod> },

    #[error("periods would cover {total_minutes} minutes, more than a day")]
    CoverageExceeded { total_minutes: u32 },

    #[error("duration must look like H:MM")]
    InvalidDurationFormat,

    #[error("duration hours must be within 0-24")]
    DurationHoursOutOfRange,

    #[error("duration minutes must be within 0-59")]
    DurationMinutesOutOfRange,

    #[error("duration must not be zero")]
    ZeroDuration,

    #[error("weight must be a positive number of grams")]
    InvalidWeight,

    #[error("blood sugar must be a positive number")]
    NonPositiveBloodSugar,

    #[error("the ratio schedule changed since the changes were confirmed")]
    StaleChangeset,
}

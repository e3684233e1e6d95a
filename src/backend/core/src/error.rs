//! Error handling for Rollcall Core.
//!
//! This module provides:
//! - A structured error type with context and chaining
//! - Stable error codes grouped by category
//! - User-friendly messages vs detailed internal messages
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use rollcall_core::error::{RollcallError, Result, ErrorContext};
//!
//! fn my_function() -> Result<()> {
//!     some_operation()
//!         .context("Failed to load roster")?;
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Rollcall operations.
pub type Result<T> = std::result::Result<T, RollcallError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers (scanning stations,
/// dashboards) for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Reference Errors (1000-1099)
    EventNotFound,
    ParticipantNotFound,
    ActivityNotFound,
    InvalidEvent,

    // Consistency Errors (1100-1199)
    Conflict,
    DuplicateRecord,

    // Store Errors (2000-2099)
    TransientIo,
    StoreQueryFailed,

    // Serialization Errors (2200-2299)
    SerializationError,

    // Validation Errors (4100-4199)
    ValidationError,

    // Configuration Errors (5000-5099)
    ConfigurationError,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::EventNotFound => 1000,
            Self::ParticipantNotFound => 1001,
            Self::ActivityNotFound => 1002,
            Self::InvalidEvent => 1003,

            Self::Conflict => 1100,
            Self::DuplicateRecord => 1101,

            Self::TransientIo => 2000,
            Self::StoreQueryFailed => 2001,

            Self::SerializationError => 2200,

            Self::ValidationError => 4100,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Whether this code belongs to the `NotFound` family.
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EventNotFound | Self::ParticipantNotFound | Self::ActivityNotFound
        )
    }

    /// Check if this error is retryable.
    ///
    /// Only store outages are; every other failure is deterministic for the
    /// same input.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "reference",
            1100..=1199 => "consistency",
            2000..=2099 => "store",
            2200..=2299 => "serialization",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad references, validation failures)
    Low,
    /// Operational issues (store outages, detected divergence)
    Medium,
    /// System errors (query failures, serialization bugs)
    High,
    /// Critical errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::EventNotFound
            | ErrorCode::ParticipantNotFound
            | ErrorCode::ActivityNotFound
            | ErrorCode::InvalidEvent
            | ErrorCode::DuplicateRecord
            | ErrorCode::ValidationError => Self::Low,

            ErrorCode::Conflict | ErrorCode::TransientIo => Self::Medium,

            ErrorCode::StoreQueryFailed
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (participant, activity, event)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Rollcall Core.
#[derive(Error, Debug)]
pub struct RollcallError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to show on a scanning station)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for RollcallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl RollcallError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a store-unavailable error. Always retryable.
    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::TransientIo,
            "Attendance store is temporarily unavailable",
            message,
        )
        .with_details(ErrorDetails::new().with_suggestion("Retry the operation"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Check if this error is in the `NotFound` family.
    pub fn is_not_found(&self) -> bool {
        self.code.is_not_found()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    retryable = self.is_retryable(),
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "rollcall_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for wrapping foreign errors as internal errors.
pub trait ErrorContext<T> {
    /// Wrap the error with a message, keeping it as the source.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| RollcallError::internal(message.into()).with_source(e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// External Error Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for RollcallError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => {
                RollcallError::new(ErrorCode::StoreQueryFailed, "Record not found").with_source(error)
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => {
                let message = error.to_string();
                RollcallError::transient_io(message).with_source(error)
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let message = db_err.message().to_string();
                RollcallError::with_internal(
                    ErrorCode::DuplicateRecord,
                    "Record already exists",
                    message,
                )
                .with_source(error)
            }
            _ => {
                let message = error.to_string();
                RollcallError::with_internal(
                    ErrorCode::StoreQueryFailed,
                    "Attendance store query failed",
                    message,
                )
                .with_source(error)
            }
        }
    }
}

impl From<serde_json::Error> for RollcallError {
    fn from(error: serde_json::Error) -> Self {
        let message = error.to_string();
        RollcallError::with_internal(ErrorCode::SerializationError, "Serialization failed", message)
            .with_source(error)
    }
}

impl From<std::io::Error> for RollcallError {
    fn from(error: std::io::Error) -> Self {
        let message = error.to_string();
        RollcallError::transient_io(message).with_source(error)
    }
}

impl From<config::ConfigError> for RollcallError {
    fn from(error: config::ConfigError) -> Self {
        let message = error.to_string();
        RollcallError::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error",
            message,
        )
        .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Domain-Specific Error Constructors
// ═══════════════════════════════════════════════════════════════════════════════

impl RollcallError {
    // ─────────────────────────────────────────────────────────────────────────
    // Reference Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an event not found error.
    pub fn event_not_found(event_id: impl fmt::Display) -> Self {
        let id = event_id.to_string();
        Self::new(ErrorCode::EventNotFound, format!("Event not found: {}", id))
            .with_details(ErrorDetails::new().with_entity("event", &id))
    }

    /// Create a participant not found error.
    pub fn participant_not_found(participant: impl fmt::Display) -> Self {
        let id = participant.to_string();
        Self::new(
            ErrorCode::ParticipantNotFound,
            format!("Participant not found: {}", id),
        )
        .with_details(ErrorDetails::new().with_entity("participant", &id))
    }

    /// Create an activity not found error.
    pub fn activity_not_found(activity_id: impl fmt::Display) -> Self {
        let id = activity_id.to_string();
        Self::new(
            ErrorCode::ActivityNotFound,
            format!("Activity not found: {}", id),
        )
        .with_details(ErrorDetails::new().with_entity("activity", &id))
    }

    /// Create an error for a check-in to an activity that is being deleted.
    pub fn activity_closed(activity_id: impl fmt::Display) -> Self {
        let id = activity_id.to_string();
        Self::new(
            ErrorCode::ActivityNotFound,
            format!("Activity is being removed: {}", id),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("activity", &id)
                .with_suggestion("Choose another activity"),
        )
        .with_context("closed", true)
    }

    /// Create a cross-event reference error.
    pub fn invalid_event(
        entity_type: &str,
        entity_id: impl fmt::Display,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        let id = entity_id.to_string();
        Self::new(
            ErrorCode::InvalidEvent,
            format!("{} {} does not belong to event {}", entity_type, id, expected),
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, &id))
        .with_context("expected_event", expected.to_string())
        .with_context("actual_event", actual.to_string())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consistency Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a roster/ledger divergence error.
    pub fn conflict(event_id: impl fmt::Display, divergent: usize) -> Self {
        Self::new(
            ErrorCode::Conflict,
            format!(
                "Roster and ledger disagree for {} participant(s) in event {}",
                divergent, event_id
            ),
        )
        .with_details(ErrorDetails::new().with_suggestion("Run reconcile to repair the roster"))
        .with_context("divergent", divergent)
    }

    /// Create a duplicate activity name error.
    pub fn duplicate_activity(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::DuplicateRecord,
            format!("An activity named \"{}\" already exists", name),
        )
        .with_context("name", &name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

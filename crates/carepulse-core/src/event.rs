//! Inbound client events and the append-only event log record.
//!
//! Every mutation of a user's engine state enters through an
//! [`InboundEvent`]. The `event_id` is the idempotency key: the engine
//! accepts each id exactly once and replays return the committed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Kind of client event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// User submitted a wellbeing self-report.
    CheckIn,
    /// The client displayed a prompt to the user.
    PopupShown,
    /// The user dismissed a prompt without answering.
    PopupDismissed,
    /// The user brought the app to the foreground.
    AppOpened,
}

/// Where the event originated on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Scheduler,
    Manual,
    Push,
    System,
}

/// Wellbeing level reported in a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelfReport {
    Normal,
    Tired,
    Emergency,
}

/// An event submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Globally unique idempotency key.
    pub event_id: String,

    /// User the event belongs to.
    pub user_id: String,

    /// Kind of event.
    pub event_type: EventType,

    /// Client-reported timestamp (epoch milliseconds).
    pub client_ts: Option<i64>,

    /// Client-reported IANA time zone name.
    pub client_tz: Option<String>,

    /// UI session the event was emitted from.
    pub ui_session_id: Option<String>,

    /// Origin of the event on the client.
    pub source: EventSource,

    /// Reported wellbeing level. Present exactly when `event_type` is
    /// `CheckIn`.
    pub self_report: Option<SelfReport>,

    /// Free-form client payload, stored verbatim.
    pub payload: Option<serde_json::Value>,
}

impl InboundEvent {
    /// Validate the event shape before any storage work happens.
    ///
    /// # Errors
    /// Returns a `ValidationError` for empty ids or a `self_report` that
    /// does not match the event type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.event_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "event_id".to_string(),
                message: "event id must not be empty".to_string(),
            });
        }
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "user_id".to_string(),
                message: "user id must not be empty".to_string(),
            });
        }
        match (self.event_type, self.self_report) {
            (EventType::CheckIn, None) => Err(ValidationError::MissingField {
                field: "self_report".to_string(),
                message: "check-in events must carry a self report".to_string(),
            }),
            (EventType::CheckIn, Some(_)) => Ok(()),
            (_, Some(_)) => Err(ValidationError::InvalidValue {
                field: "self_report".to_string(),
                message: "only check-in events may carry a self report".to_string(),
            }),
            (_, None) => Ok(()),
        }
    }

    /// Effective event time: the client timestamp when representable,
    /// otherwise `now`.
    pub fn effective_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.client_ts
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(now)
    }
}

/// A row in the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub event_id: String,
    pub user_id: String,
    pub event_type: EventType,
    /// Effective event time used for ordering.
    pub occurred_at: DateTime<Utc>,
    pub client_tz: Option<String>,
    pub ui_session_id: Option<String>,
    pub source: EventSource,
    pub self_report: Option<SelfReport>,
    /// Minutes between the preceding emergency prompt and this check-in.
    /// Only set for check-in events with a prompt reference.
    pub silence_minutes: Option<f64>,
    /// Client payload carried through from the inbound event.
    pub payload: Option<serde_json::Value>,
    /// False for events rejected by the ordering check. Kept for audit
    /// and baseline estimation.
    pub accepted: bool,
    pub recorded_at: DateTime<Utc>,
}

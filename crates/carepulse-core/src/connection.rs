//! Caregiver connections and alert-target resolution.
//!
//! A connection links a monitored user to a caregiver with explicit
//! permission flags. Only accepted connections take part in escalation
//! routing or acknowledgement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a caregiver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Revoked,
}

/// A link between a monitored user and a caregiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaregiverConnection {
    pub id: String,
    /// Monitored user.
    pub user_id: String,
    /// Caregiver on the receiving end.
    pub caregiver_id: String,
    pub status: ConnectionStatus,
    /// Whether escalations may be routed to this connection.
    pub can_receive_alerts: bool,
    /// Whether this caregiver may acknowledge escalations.
    pub can_acknowledge: bool,
    pub created_at: DateTime<Utc>,
}

impl CaregiverConnection {
    /// New pending connection with full permissions.
    pub fn new(user_id: &str, caregiver_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            caregiver_id: caregiver_id.to_string(),
            status: ConnectionStatus::Pending,
            can_receive_alerts: true,
            can_acknowledge: true,
            created_at: now,
        }
    }

    /// Whether this connection may acknowledge for the given caregiver.
    pub fn permits_acknowledge(&self, caregiver_id: &str) -> bool {
        self.caregiver_id == caregiver_id
            && self.status == ConnectionStatus::Accepted
            && self.can_acknowledge
    }
}

/// Pick the escalation target: the oldest accepted connection that is
/// allowed to receive alerts.
pub fn resolve_alert_target(connections: &[CaregiverConnection]) -> Option<&CaregiverConnection> {
    connections
        .iter()
        .filter(|c| c.status == ConnectionStatus::Accepted && c.can_receive_alerts)
        .min_by_key(|c| c.created_at)
}

//! Caregiver escalation records and the escalation gate.
//!
//! An escalation is created at most once per emergency episode; the
//! storage layer backs this with a unique constraint on the episode id,
//! so concurrent ingestion cannot double-fire. A fresh episode after
//! recovery re-arms the gate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baseline::Baseline;
use crate::connection::CaregiverConnection;
use crate::scoring::AlertScore;
use crate::state::EngineState;

/// Lifecycle of a caregiver escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    /// Created, but no eligible caregiver was found to receive it.
    Pending,
    /// Handed to a caregiver connection.
    Sent,
    /// A caregiver confirmed they are handling it.
    Acknowledged,
}

/// A caregiver escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: String,
    pub user_id: String,
    /// Emergency episode this escalation belongs to. Unique per episode.
    pub episode_id: String,
    /// Connection the alert was routed to, once resolved.
    pub connection_id: Option<String>,
    /// Caregiver behind the routed connection.
    pub caregiver_id: Option<String>,
    pub status: EscalationStatus,
    /// Score reasons captured at creation time.
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

impl Escalation {
    /// New pending escalation for an episode.
    pub fn new(user_id: &str, episode_id: &str, reasons: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            episode_id: episode_id.to_string(),
            connection_id: None,
            caregiver_id: None,
            status: EscalationStatus::Pending,
            reasons,
            created_at: now,
            sent_at: None,
            acknowledged_at: None,
            acknowledged_by: None,
        }
    }

    /// Route the escalation to a resolved caregiver connection.
    pub fn mark_sent(&mut self, target: &CaregiverConnection, now: DateTime<Utc>) {
        self.connection_id = Some(target.id.clone());
        self.caregiver_id = Some(target.caregiver_id.clone());
        self.status = EscalationStatus::Sent;
        self.sent_at = Some(now);
    }
}

/// Whether the current moment warrants a caregiver escalation.
///
/// All four conditions must hold: critical tier, an armed episode,
/// enough unanswered prompts, and an emergency prompt old enough to have
/// given the user a real chance to respond.
pub fn should_escalate(
    now: DateTime<Utc>,
    state: &EngineState,
    baseline: &Baseline,
    score: &AlertScore,
) -> bool {
    if score.tier < 3 {
        return false;
    }
    if !state.emergency_armed {
        return false;
    }
    if state.silence_count < baseline.silence_threshold {
        return false;
    }
    match state.emergency_last_ask_at {
        Some(ask) => {
            now.signed_duration_since(ask)
                >= Duration::minutes(baseline.escalation_delay_minutes)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, SelfReport};
    use crate::scoring::compute_score;
    use chrono::TimeZone;

    fn utc(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, mi, 0).unwrap()
    }

    fn armed_state(ask: DateTime<Utc>) -> (EngineState, Baseline) {
        let baseline = Baseline::defaults("user-1", ask);
        let mut state = EngineState::new("user-1", ask);
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), ask);
        (state, baseline)
    }

    #[test]
    fn gate_requires_all_conditions() {
        let ask = utc(9, 0);
        let (mut state, baseline) = armed_state(ask);
        let now = utc(9, 40);

        // Tier 3 but no dismissals yet.
        let score = compute_score(now, &state, &baseline);
        assert_eq!(score.tier, 3);
        assert!(!should_escalate(now, &state, &baseline, &score));

        // Enough dismissals, delay elapsed.
        state.apply_event(EventType::PopupDismissed, None, utc(9, 20));
        state.apply_event(EventType::PopupDismissed, None, utc(9, 35));
        let score = compute_score(now, &state, &baseline);
        assert!(should_escalate(now, &state, &baseline, &score));
    }

    #[test]
    fn gate_respects_escalation_delay() {
        let ask = utc(9, 0);
        let (mut state, baseline) = armed_state(ask);
        state.apply_event(EventType::PopupDismissed, None, utc(9, 5));
        state.apply_event(EventType::PopupDismissed, None, utc(9, 10));

        // Only 15 minutes since the prompt, delay is 30.
        let now = utc(9, 15);
        let score = compute_score(now, &state, &baseline);
        assert!(!should_escalate(now, &state, &baseline, &score));

        let now = utc(9, 30);
        let score = compute_score(now, &state, &baseline);
        assert!(should_escalate(now, &state, &baseline, &score));
    }

    #[test]
    fn gate_never_fires_without_armed_episode() {
        let baseline = Baseline::defaults("user-1", utc(9, 0));
        let mut state = EngineState::new("user-1", utc(9, 0));
        state.apply_event(EventType::CheckIn, Some(SelfReport::Normal), utc(9, 0));
        state.silence_count = 5;

        let now = utc(12, 0);
        let score = compute_score(now, &state, &baseline);
        assert!(!should_escalate(now, &state, &baseline, &score));
    }

    #[test]
    fn mark_sent_records_target() {
        let mut esc = Escalation::new("user-1", "ep-1", vec!["silence=1.00".to_string()], utc(9, 0));
        assert_eq!(esc.status, EscalationStatus::Pending);

        let target = CaregiverConnection::new("user-1", "caregiver-1", utc(8, 0));
        esc.mark_sent(&target, utc(9, 0));
        assert_eq!(esc.status, EscalationStatus::Sent);
        assert_eq!(esc.connection_id.as_deref(), Some(target.id.as_str()));
        assert_eq!(esc.caregiver_id.as_deref(), Some("caregiver-1"));
        assert!(esc.sent_at.is_some());
    }
}

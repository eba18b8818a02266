//! Per-user engine state and the event transition function.
//!
//! The engine keeps a single current-state row per user. Transitions are
//! keyed by event type and touch only the fields enumerated for that
//! type; everything else carries forward. An emergency episode is the
//! continuous span with status EMERGENCY: entering it from any other
//! status mints a fresh episode id, and any non-emergency self-report
//! closes it, clearing the armed flag and prompt reference with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{EventType, SelfReport};

/// Wellbeing status a user can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Normal,
    Tired,
    Emergency,
}

impl From<SelfReport> for UserStatus {
    fn from(report: SelfReport) -> Self {
        match report {
            SelfReport::Normal => UserStatus::Normal,
            SelfReport::Tired => UserStatus::Tired,
            SelfReport::Emergency => UserStatus::Emergency,
        }
    }
}

impl UserStatus {
    /// Normalized severity of this status for alert scoring, in [0, 1].
    pub fn severity(self) -> f64 {
        match self {
            UserStatus::Normal => 0.2,
            UserStatus::Tired => 0.6,
            UserStatus::Emergency => 1.0,
        }
    }
}

/// Current engine state for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub user_id: String,

    /// Current wellbeing status.
    pub status: UserStatus,

    /// When the user last submitted a check-in.
    pub last_check_in_at: Option<DateTime<Utc>>,

    /// When the client should prompt next.
    pub next_ask_at: Option<DateTime<Utc>>,

    /// Until when re-prompts are suppressed.
    pub cooldown_until: Option<DateTime<Utc>>,

    /// Prompts dismissed without an answer during the open episode.
    pub silence_count: u32,

    /// True while an emergency episode is open.
    pub emergency_armed: bool,

    /// When the user was last prompted during an emergency.
    pub emergency_last_ask_at: Option<DateTime<Utc>>,

    /// When the user last foregrounded the app.
    pub last_app_opened_at: Option<DateTime<Utc>>,

    /// Identifier of the open emergency episode, if any.
    pub episode_id: Option<String>,

    /// Last computed alert score in [0, 1].
    pub aps: f64,

    /// Last computed urgency tier (0-3).
    pub tier: u8,

    /// Reason codes explaining the last score.
    pub reasons: Vec<String>,

    /// Effective time of the newest accepted event. Events older than
    /// this are logged but never mutate state.
    pub last_event_ts: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl EngineState {
    /// Fresh state for a user with no history.
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            status: UserStatus::Normal,
            last_check_in_at: None,
            next_ask_at: None,
            cooldown_until: None,
            silence_count: 0,
            emergency_armed: false,
            emergency_last_ask_at: None,
            last_app_opened_at: None,
            episode_id: None,
            aps: 0.0,
            tier: 0,
            reasons: Vec::new(),
            last_event_ts: None,
            updated_at: now,
        }
    }

    // === Transitions ===

    /// Apply one accepted event to the state.
    ///
    /// `at` is the event's effective time. The caller has already
    /// validated the event shape, so a check-in always carries a report.
    pub fn apply_event(&mut self, event_type: EventType, report: Option<SelfReport>, at: DateTime<Utc>) {
        match event_type {
            EventType::CheckIn => {
                if let Some(report) = report {
                    self.apply_check_in(report, at);
                }
            }
            EventType::PopupShown => {
                self.emergency_last_ask_at = Some(at);
            }
            EventType::PopupDismissed => {
                if self.status == UserStatus::Emergency && self.emergency_armed {
                    self.silence_count += 1;
                }
            }
            EventType::AppOpened => {
                self.last_app_opened_at = Some(at);
            }
        }
        self.last_event_ts = Some(at);
    }

    fn apply_check_in(&mut self, report: SelfReport, at: DateTime<Utc>) {
        let was_emergency = self.status == UserStatus::Emergency;
        self.status = UserStatus::from(report);
        self.last_check_in_at = Some(at);
        self.silence_count = 0;

        match report {
            SelfReport::Emergency => {
                // A check-in during an open episode keeps it; only entry
                // from a non-emergency status starts a new one.
                if !was_emergency {
                    self.episode_id = Some(Uuid::new_v4().to_string());
                    self.emergency_armed = true;
                    self.emergency_last_ask_at = Some(at);
                }
            }
            SelfReport::Normal | SelfReport::Tired => {
                self.emergency_armed = false;
                self.emergency_last_ask_at = None;
                self.episode_id = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_state() -> EngineState {
        EngineState::new("user-1", Utc::now())
    }

    #[test]
    fn new_state_is_normal_and_zeroed() {
        let state = make_state();
        assert_eq!(state.status, UserStatus::Normal);
        assert_eq!(state.silence_count, 0);
        assert!(!state.emergency_armed);
        assert!(state.episode_id.is_none());
        assert!(state.last_event_ts.is_none());
    }

    #[test]
    fn emergency_check_in_opens_episode() {
        let mut state = make_state();
        let at = Utc::now();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), at);

        assert_eq!(state.status, UserStatus::Emergency);
        assert!(state.emergency_armed);
        assert_eq!(state.emergency_last_ask_at, Some(at));
        assert!(state.episode_id.is_some());
        assert_eq!(state.last_check_in_at, Some(at));
        assert_eq!(state.last_event_ts, Some(at));
    }

    #[test]
    fn repeated_emergency_check_in_keeps_episode() {
        let mut state = make_state();
        let t0 = Utc::now();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), t0);
        let episode = state.episode_id.clone();
        let ask = state.emergency_last_ask_at;

        let t1 = t0 + Duration::minutes(10);
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), t1);

        assert_eq!(state.episode_id, episode);
        assert_eq!(state.emergency_last_ask_at, ask);
        assert_eq!(state.last_check_in_at, Some(t1));
    }

    #[test]
    fn recovery_clears_episode_atomically() {
        let mut state = make_state();
        let t0 = Utc::now();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), t0);
        state.apply_event(EventType::PopupDismissed, None, t0 + Duration::minutes(5));
        assert_eq!(state.silence_count, 1);

        state.apply_event(
            EventType::CheckIn,
            Some(SelfReport::Normal),
            t0 + Duration::minutes(10),
        );
        assert_eq!(state.status, UserStatus::Normal);
        assert!(!state.emergency_armed);
        assert!(state.emergency_last_ask_at.is_none());
        assert!(state.episode_id.is_none());
        assert_eq!(state.silence_count, 0);
    }

    #[test]
    fn popup_shown_always_records_ask() {
        let mut state = make_state();
        let at = Utc::now();
        state.apply_event(EventType::PopupShown, None, at);
        assert_eq!(state.emergency_last_ask_at, Some(at));
        assert_eq!(state.status, UserStatus::Normal);
    }

    #[test]
    fn dismissal_counts_only_while_armed() {
        let mut state = make_state();
        let at = Utc::now();

        state.apply_event(EventType::PopupDismissed, None, at);
        assert_eq!(state.silence_count, 0);

        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), at);
        state.apply_event(EventType::PopupDismissed, None, at + Duration::minutes(1));
        state.apply_event(EventType::PopupDismissed, None, at + Duration::minutes(2));
        assert_eq!(state.silence_count, 2);
    }

    #[test]
    fn app_open_touches_only_its_field() {
        let mut state = make_state();
        let before = state.clone();
        let at = Utc::now();
        state.apply_event(EventType::AppOpened, None, at);

        assert_eq!(state.last_app_opened_at, Some(at));
        assert_eq!(state.status, before.status);
        assert_eq!(state.silence_count, before.silence_count);
        assert_eq!(state.emergency_last_ask_at, before.emergency_last_ask_at);
    }

    #[test]
    fn severity_tracks_status_order() {
        assert!(UserStatus::Emergency.severity() > UserStatus::Tired.severity());
        assert!(UserStatus::Tired.severity() > UserStatus::Normal.severity());
    }

    #[test]
    fn new_episode_gets_fresh_id() {
        let mut state = make_state();
        let t0 = Utc::now();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), t0);
        let first = state.episode_id.clone();

        state.apply_event(EventType::CheckIn, Some(SelfReport::Normal), t0 + Duration::hours(1));
        state.apply_event(
            EventType::CheckIn,
            Some(SelfReport::Emergency),
            t0 + Duration::hours(2),
        );
        let second = state.episode_id.clone();

        assert!(second.is_some());
        assert_ne!(first, second);
    }
}

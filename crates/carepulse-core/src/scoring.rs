//! Alert probability scoring.
//!
//! Five normalized signals are combined through a fixed logistic model
//! into the alert probability score ("APS", in [0, 1]), then discretized
//! into four urgency tiers:
//!
//! | APS          | Tier | Meaning   |
//! |--------------|------|-----------|
//! | < 0.25       | 0    | calm      |
//! | 0.25 - 0.50  | 1    | watch     |
//! | 0.50 - 0.75  | 2    | concern   |
//! | >= 0.75      | 3    | critical  |
//!
//! The reason list carries the raw inputs for explainability; it never
//! feeds back into the score.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::Baseline;
use crate::state::EngineState;

/// Recent app activity suppresses the rarity signal for this long.
pub const APP_ACTIVE_WINDOW_HOURS: i64 = 4;

/// Z-scores are mapped affinely from [-3, +3] onto [0, 1].
const Z_SPAN: f64 = 3.0;

/// Fixed weight vector for the logistic model.
///
/// The bias keeps a quiet user near zero; rarity and severity carry the
/// most weight, recent app activity pulls the score down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub bias: f64,
    pub severity: f64,
    pub armed: f64,
    pub app_active: f64,
    pub silence: f64,
    pub rarity: f64,
}

impl SignalWeights {
    /// The calibrated production weights.
    pub fn standard() -> Self {
        Self {
            bias: -2.4,
            severity: 2.6,
            armed: 1.4,
            app_active: -1.2,
            silence: 1.6,
            rarity: 3.0,
        }
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self::standard()
    }
}

/// Normalized signal values feeding the score, all in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSignals {
    /// Severity of the latest self-report; 0 with no check-in on record.
    pub severity: f64,
    /// 1 while an emergency episode is armed.
    pub armed: f64,
    /// 1 while the app was foregrounded within the activity window.
    pub app_active: f64,
    /// Silence since the last emergency prompt relative to the
    /// escalation delay.
    pub silence: f64,
    /// How unusual the current silence is against the learned profile.
    /// Forced to 0 while app activity is recent.
    pub rarity: f64,
    /// Raw z-score behind the rarity signal.
    pub raw_z: f64,
    /// Whether app activity suppressed the rarity signal.
    pub in_cooldown: bool,
}

/// The computed alert score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertScore {
    /// Alert probability score in [0, 1].
    pub aps: f64,
    /// Urgency tier (0-3).
    pub tier: u8,
    /// Reason codes in stable order, for audit and UI.
    pub reasons: Vec<String>,
    /// The signals behind the score.
    pub signals: AlertSignals,
    pub scored_at: DateTime<Utc>,
}

/// Compute the alert score for a user at `now`.
pub fn compute_score(now: DateTime<Utc>, state: &EngineState, baseline: &Baseline) -> AlertScore {
    let signals = collect_signals(now, state, baseline);
    let weights = SignalWeights::standard();

    let x = weights.bias
        + weights.severity * signals.severity
        + weights.armed * signals.armed
        + weights.app_active * signals.app_active
        + weights.silence * signals.silence
        + weights.rarity * signals.rarity;
    let aps = logistic(x);

    let reasons = vec![
        format!("z={:.2}", signals.raw_z),
        format!("severity={:.2}", signals.severity),
        format!("armed={:.0}", signals.armed),
        format!("app_active={:.0}", signals.app_active),
        format!("silence={:.2}", signals.silence),
        format!("rarity={:.2}", signals.rarity),
        format!("cooldown={}", signals.in_cooldown),
    ];

    AlertScore {
        aps,
        tier: tier_for(aps),
        reasons,
        signals,
        scored_at: now,
    }
}

/// Discretize an APS value into its urgency tier.
pub fn tier_for(aps: f64) -> u8 {
    if aps < 0.25 {
        0
    } else if aps < 0.5 {
        1
    } else if aps < 0.75 {
        2
    } else {
        3
    }
}

fn collect_signals(now: DateTime<Utc>, state: &EngineState, baseline: &Baseline) -> AlertSignals {
    let severity = match state.last_check_in_at {
        Some(_) => state.status.severity(),
        None => 0.0,
    };

    let armed = if state.emergency_armed { 1.0 } else { 0.0 };

    let app_active = match state.last_app_opened_at {
        Some(opened) => {
            if now.signed_duration_since(opened) < Duration::hours(APP_ACTIVE_WINDOW_HOURS) {
                1.0
            } else {
                0.0
            }
        }
        None => 0.0,
    };
    let in_cooldown = app_active > 0.0;

    let (silence, rarity, raw_z) = match state.emergency_last_ask_at {
        Some(ask) => {
            let minutes = (now.signed_duration_since(ask).num_seconds() as f64 / 60.0).max(0.0);
            let delay = baseline.escalation_delay_minutes.max(1) as f64;
            let silence = (minutes / delay).clamp(0.0, 1.0);

            let z = (minutes - baseline.silence_mean_minutes) / baseline.floored_std();
            let rarity = if in_cooldown {
                0.0
            } else {
                ((z + Z_SPAN) / (2.0 * Z_SPAN)).clamp(0.0, 1.0)
            };
            (silence, rarity, z)
        }
        None => (0.0, 0.0, 0.0),
    };

    AlertSignals {
        severity,
        armed,
        app_active,
        silence,
        rarity,
        raw_z,
        in_cooldown,
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, SelfReport};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, mi, 0).unwrap()
    }

    fn make_baseline() -> Baseline {
        Baseline::defaults("user-1", utc(0, 0))
    }

    fn make_state() -> EngineState {
        EngineState::new("user-1", utc(0, 0))
    }

    #[test]
    fn fresh_emergency_check_in_is_critical() {
        let baseline = make_baseline();
        let mut state = make_state();
        let t0 = utc(9, 0);
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), t0);

        let score = compute_score(t0, &state, &baseline);
        assert_eq!(score.tier, 3, "aps was {}", score.aps);
        assert_eq!(score.signals.severity, 1.0);
        assert_eq!(score.signals.armed, 1.0);
        assert_eq!(score.signals.silence, 0.0);
    }

    #[test]
    fn steady_normal_check_in_is_calm() {
        let baseline = make_baseline();
        let mut state = make_state();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Normal), utc(9, 0));

        let score = compute_score(utc(9, 0), &state, &baseline);
        assert_eq!(score.tier, 0, "aps was {}", score.aps);
    }

    #[test]
    fn tired_check_in_raises_watch_tier() {
        let baseline = make_baseline();
        let mut state = make_state();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Tired), utc(9, 0));

        let score = compute_score(utc(9, 0), &state, &baseline);
        assert_eq!(score.tier, 1, "aps was {}", score.aps);
    }

    #[test]
    fn no_check_in_carries_no_severity() {
        let baseline = make_baseline();
        let state = make_state();
        let score = compute_score(utc(9, 0), &state, &baseline);
        assert_eq!(score.signals.severity, 0.0);
        assert_eq!(score.tier, 0);
    }

    #[test]
    fn saturated_emergency_approaches_one() {
        let baseline = make_baseline();
        let mut state = make_state();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), utc(9, 0));

        // Hours of silence: both silence and rarity saturate.
        let score = compute_score(utc(12, 0), &state, &baseline);
        assert_eq!(score.signals.silence, 1.0);
        assert_eq!(score.signals.rarity, 1.0);
        assert!(score.aps > 0.99);
        assert_eq!(score.tier, 3);
    }

    #[test]
    fn app_activity_suppresses_rarity() {
        let baseline = make_baseline();
        let mut state = make_state();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Emergency), utc(9, 0));
        state.apply_event(EventType::AppOpened, None, utc(10, 0));

        let score = compute_score(utc(10, 30), &state, &baseline);
        assert!(score.signals.in_cooldown);
        assert_eq!(score.signals.rarity, 0.0);
        assert!(score.signals.raw_z > 0.0, "raw z still recorded");

        // Outside the activity window the signal returns.
        let later = compute_score(utc(14, 30), &state, &baseline);
        assert!(!later.signals.in_cooldown);
        assert!(later.signals.rarity > 0.0);
    }

    #[test]
    fn no_prompt_reference_zeroes_silence_signals() {
        let baseline = make_baseline();
        let mut state = make_state();
        state.apply_event(EventType::CheckIn, Some(SelfReport::Normal), utc(9, 0));

        let score = compute_score(utc(12, 0), &state, &baseline);
        assert_eq!(score.signals.silence, 0.0);
        assert_eq!(score.signals.rarity, 0.0);
        assert_eq!(score.signals.raw_z, 0.0);
    }

    #[test]
    fn reasons_keep_stable_order() {
        let baseline = make_baseline();
        let state = make_state();
        let score = compute_score(utc(9, 0), &state, &baseline);

        let keys: Vec<&str> = score
            .reasons
            .iter()
            .map(|r| r.split('=').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec!["z", "severity", "armed", "app_active", "silence", "rarity", "cooldown"]
        );
    }

    #[test]
    fn tier_bands() {
        assert_eq!(tier_for(0.0), 0);
        assert_eq!(tier_for(0.24), 0);
        assert_eq!(tier_for(0.25), 1);
        assert_eq!(tier_for(0.49), 1);
        assert_eq!(tier_for(0.5), 2);
        assert_eq!(tier_for(0.74), 2);
        assert_eq!(tier_for(0.75), 3);
        assert_eq!(tier_for(1.0), 3);
    }

    proptest! {
        #[test]
        fn aps_stays_in_unit_interval(
            minutes_since_ask in 0i64..6000,
            mean in 1.0f64..200.0,
            std in 0.0f64..100.0,
            armed in proptest::bool::ANY,
            app_minutes_ago in proptest::option::of(0i64..600),
        ) {
            let mut baseline = make_baseline();
            baseline.silence_mean_minutes = mean;
            baseline.silence_std_minutes = std;

            let now = utc(12, 0);
            let mut state = make_state();
            state.last_check_in_at = Some(now - Duration::minutes(minutes_since_ask));
            state.emergency_last_ask_at = Some(now - Duration::minutes(minutes_since_ask));
            state.emergency_armed = armed;
            if armed {
                state.status = crate::state::UserStatus::Emergency;
                state.episode_id = Some("ep".to_string());
            }
            state.last_app_opened_at = app_minutes_ago.map(|m| now - Duration::minutes(m));

            let score = compute_score(now, &state, &baseline);
            prop_assert!((0.0..=1.0).contains(&score.aps));
            prop_assert!(score.tier <= 3);
            prop_assert_eq!(score.tier, tier_for(score.aps));
            prop_assert!((0.0..=1.0).contains(&score.signals.silence));
            prop_assert!((0.0..=1.0).contains(&score.signals.rarity));
        }

        #[test]
        fn tier_is_monotone_in_aps(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(tier_for(lo) <= tier_for(hi));
        }
    }
}

//! Per-user scheduling and escalation baseline.
//!
//! A baseline combines the fixed prompting configuration for a user
//! (ask windows, re-ask intervals, escalation thresholds) with an
//! adaptively learned profile of their silence durations: the minutes
//! between an emergency prompt and the next check-in. The learned
//! standard deviation is floored so a run of identical samples can never
//! collapse the z-score denominator.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Learned standard deviation never drops below this floor (minutes).
pub const SIGMA_FLOOR_MINUTES: f64 = 5.0;

/// Trailing window of check-ins considered for re-estimation (days).
pub const ESTIMATE_WINDOW_DAYS: i64 = 14;

/// Minimum samples before the learned profile is updated.
pub const ESTIMATE_MIN_SAMPLES: usize = 3;

/// Per-user baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// User this baseline belongs to.
    pub user_id: String,

    /// IANA time zone for ask-window arithmetic.
    pub timezone: String,

    /// Morning ask window, local hours [start, end).
    pub morning_start_hour: u32,
    pub morning_end_hour: u32,

    /// Evening ask window, local hours [start, end).
    pub evening_start_hour: u32,
    pub evening_end_hour: u32,

    /// Re-ask interval while the user is TIRED (minutes).
    pub tired_recheck_minutes: i64,

    /// Re-ask interval while the user is in EMERGENCY (minutes).
    pub emergency_recheck_minutes: i64,

    /// Unanswered prompts required before an escalation may fire.
    pub silence_threshold: u32,

    /// Minimum age of the last emergency prompt before an escalation
    /// may fire (minutes).
    pub escalation_delay_minutes: i64,

    /// Learned mean of silence minutes.
    pub silence_mean_minutes: f64,

    /// Learned standard deviation of silence minutes (floored).
    pub silence_std_minutes: f64,

    pub updated_at: DateTime<Utc>,
}

impl Baseline {
    /// Cold-start baseline for a user with no history.
    pub fn defaults(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            timezone: "UTC".to_string(),
            morning_start_hour: 8,
            morning_end_hour: 11,
            evening_start_hour: 18,
            evening_end_hour: 21,
            tired_recheck_minutes: 120,
            emergency_recheck_minutes: 20,
            silence_threshold: 2,
            escalation_delay_minutes: 30,
            silence_mean_minutes: 45.0,
            silence_std_minutes: 20.0,
            updated_at: now,
        }
    }

    /// Parse the configured time zone.
    ///
    /// # Errors
    /// Returns an error if the stored name is not a known IANA zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    /// Standard deviation with the floor applied, for use as a z-score
    /// denominator even when the stored value predates the floor.
    pub fn floored_std(&self) -> f64 {
        self.silence_std_minutes.max(SIGMA_FLOOR_MINUTES)
    }

    /// Raise a stored standard deviation below the floor back up to it.
    /// Returns true if the value changed.
    pub fn heal_sigma(&mut self) -> bool {
        if self.silence_std_minutes < SIGMA_FLOOR_MINUTES {
            self.silence_std_minutes = SIGMA_FLOOR_MINUTES;
            true
        } else {
            false
        }
    }

    /// Re-estimate the learned silence profile from trailing samples.
    ///
    /// Skipped entirely below [`ESTIMATE_MIN_SAMPLES`]; the resulting
    /// standard deviation is floored. Returns true if the profile was
    /// updated.
    pub fn reestimate(&mut self, samples: &[f64], now: DateTime<Utc>) -> bool {
        if samples.len() < ESTIMATE_MIN_SAMPLES {
            return false;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        self.silence_mean_minutes = mean;
        self.silence_std_minutes = variance.sqrt().max(SIGMA_FLOOR_MINUTES);
        self.updated_at = now;
        true
    }

    /// Apply explicit field overrides.
    ///
    /// # Errors
    /// Returns an error if any override value is out of range, leaving
    /// the baseline untouched.
    pub fn apply(&mut self, patch: &BaselinePatch, now: DateTime<Utc>) -> Result<(), ConfigError> {
        let mut updated = self.clone();

        if let Some(ref tz) = patch.timezone {
            tz.parse::<Tz>()
                .map_err(|_| ConfigError::UnknownTimezone(tz.clone()))?;
            updated.timezone = tz.clone();
        }
        if let Some(hour) = patch.morning_start_hour {
            updated.morning_start_hour = check_hour("morning_start_hour", hour)?;
        }
        if let Some(hour) = patch.morning_end_hour {
            updated.morning_end_hour = check_hour("morning_end_hour", hour)?;
        }
        if let Some(hour) = patch.evening_start_hour {
            updated.evening_start_hour = check_hour("evening_start_hour", hour)?;
        }
        if let Some(hour) = patch.evening_end_hour {
            updated.evening_end_hour = check_hour("evening_end_hour", hour)?;
        }
        if let Some(minutes) = patch.tired_recheck_minutes {
            updated.tired_recheck_minutes = check_minutes("tired_recheck_minutes", minutes)?;
        }
        if let Some(minutes) = patch.emergency_recheck_minutes {
            updated.emergency_recheck_minutes =
                check_minutes("emergency_recheck_minutes", minutes)?;
        }
        if let Some(threshold) = patch.silence_threshold {
            if threshold == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "silence_threshold".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            updated.silence_threshold = threshold;
        }
        if let Some(minutes) = patch.escalation_delay_minutes {
            updated.escalation_delay_minutes =
                check_minutes("escalation_delay_minutes", minutes)?;
        }

        if updated.morning_start_hour >= updated.morning_end_hour {
            return Err(ConfigError::InvalidValue {
                key: "morning window".to_string(),
                message: "start hour must be before end hour".to_string(),
            });
        }
        if updated.evening_start_hour >= updated.evening_end_hour {
            return Err(ConfigError::InvalidValue {
                key: "evening window".to_string(),
                message: "start hour must be before end hour".to_string(),
            });
        }
        if updated.morning_end_hour > updated.evening_start_hour {
            return Err(ConfigError::InvalidValue {
                key: "windows".to_string(),
                message: "morning window must end before the evening window starts".to_string(),
            });
        }

        updated.updated_at = now;
        *self = updated;
        Ok(())
    }
}

/// Explicit optional-field overrides for a baseline.
///
/// Every field is independent; absent fields leave the stored value
/// alone. The learned profile is not patchable, only re-estimated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselinePatch {
    pub timezone: Option<String>,
    pub morning_start_hour: Option<u32>,
    pub morning_end_hour: Option<u32>,
    pub evening_start_hour: Option<u32>,
    pub evening_end_hour: Option<u32>,
    pub tired_recheck_minutes: Option<i64>,
    pub emergency_recheck_minutes: Option<i64>,
    pub silence_threshold: Option<u32>,
    pub escalation_delay_minutes: Option<i64>,
}

fn check_hour(key: &str, hour: u32) -> Result<u32, ConfigError> {
    if hour > 23 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("hour {hour} out of range 0-23"),
        });
    }
    Ok(hour)
}

fn check_minutes(key: &str, minutes: i64) -> Result<i64, ConfigError> {
    if minutes <= 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be a positive number of minutes".to_string(),
        });
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_baseline() -> Baseline {
        Baseline::defaults("user-1", Utc::now())
    }

    #[test]
    fn defaults_are_sane() {
        let baseline = make_baseline();
        assert_eq!(baseline.timezone, "UTC");
        assert_eq!(baseline.morning_start_hour, 8);
        assert_eq!(baseline.evening_end_hour, 21);
        assert_eq!(baseline.silence_threshold, 2);
        assert!(baseline.silence_std_minutes >= SIGMA_FLOOR_MINUTES);
        assert!(baseline.tz().is_ok());
    }

    #[test]
    fn reestimate_skips_small_samples() {
        let mut baseline = make_baseline();
        let before = baseline.clone();
        assert!(!baseline.reestimate(&[30.0, 40.0], Utc::now()));
        assert_eq!(baseline.silence_mean_minutes, before.silence_mean_minutes);
        assert_eq!(baseline.silence_std_minutes, before.silence_std_minutes);
    }

    #[test]
    fn reestimate_updates_profile() {
        let mut baseline = make_baseline();
        assert!(baseline.reestimate(&[30.0, 40.0, 50.0, 60.0], Utc::now()));
        assert_eq!(baseline.silence_mean_minutes, 45.0);
        assert!(baseline.silence_std_minutes > SIGMA_FLOOR_MINUTES);
    }

    #[test]
    fn reestimate_floors_sigma() {
        let mut baseline = make_baseline();
        // Identical samples would yield zero deviation without the floor.
        assert!(baseline.reestimate(&[42.0, 42.0, 42.0, 42.0], Utc::now()));
        assert_eq!(baseline.silence_mean_minutes, 42.0);
        assert_eq!(baseline.silence_std_minutes, SIGMA_FLOOR_MINUTES);
    }

    #[test]
    fn heal_sigma_raises_sub_floor_values() {
        let mut baseline = make_baseline();
        baseline.silence_std_minutes = 0.5;
        assert!(baseline.heal_sigma());
        assert_eq!(baseline.silence_std_minutes, SIGMA_FLOOR_MINUTES);
        assert!(!baseline.heal_sigma());
    }

    #[test]
    fn apply_patch_updates_fields() {
        let mut baseline = make_baseline();
        let patch = BaselinePatch {
            timezone: Some("Europe/Berlin".to_string()),
            morning_start_hour: Some(7),
            tired_recheck_minutes: Some(90),
            ..Default::default()
        };
        baseline.apply(&patch, Utc::now()).unwrap();
        assert_eq!(baseline.timezone, "Europe/Berlin");
        assert_eq!(baseline.morning_start_hour, 7);
        assert_eq!(baseline.tired_recheck_minutes, 90);
        // Unpatched fields stay.
        assert_eq!(baseline.evening_start_hour, 18);
    }

    #[test]
    fn apply_rejects_bad_values() {
        let mut baseline = make_baseline();
        let before = baseline.clone();

        let patch = BaselinePatch {
            timezone: Some("Not/AZone".to_string()),
            ..Default::default()
        };
        assert!(baseline.apply(&patch, Utc::now()).is_err());

        let patch = BaselinePatch {
            morning_start_hour: Some(25),
            ..Default::default()
        };
        assert!(baseline.apply(&patch, Utc::now()).is_err());

        let patch = BaselinePatch {
            silence_threshold: Some(0),
            ..Default::default()
        };
        assert!(baseline.apply(&patch, Utc::now()).is_err());

        // Inverted window.
        let patch = BaselinePatch {
            morning_start_hour: Some(10),
            morning_end_hour: Some(9),
            ..Default::default()
        };
        assert!(baseline.apply(&patch, Utc::now()).is_err());

        // Failed patches leave the baseline untouched.
        assert_eq!(baseline, before);
    }
}

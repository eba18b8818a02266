//! Prompt schedule calculator.
//!
//! Pure wall-clock planning: given the current state and the user's
//! baseline, decide when the client should ask next and until when
//! re-prompts are suppressed. Nothing here sets timers; the client polls
//! the plan. Window arithmetic happens in the user's time zone, results
//! are returned in UTC.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::baseline::Baseline;
use crate::error::ConfigError;
use crate::state::{EngineState, UserStatus};

/// The computed prompting plan for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePlan {
    /// When the client should prompt next. May be in the past, which
    /// means "ask immediately".
    pub next_ask_at: DateTime<Utc>,

    /// Until when re-prompts are suppressed. None means no cooldown.
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Compute the prompting plan for a user at `now`.
///
/// # Errors
/// Returns an error if the baseline's time zone is not a known IANA
/// zone.
pub fn compute_schedule(
    now: DateTime<Utc>,
    state: &EngineState,
    baseline: &Baseline,
) -> Result<SchedulePlan, ConfigError> {
    let tz = baseline.tz()?;
    let plan = match state.status {
        UserStatus::Normal => normal_plan(now, state, baseline, tz),
        UserStatus::Tired => {
            let anchor = state.last_check_in_at.unwrap_or(now);
            let next = anchor + Duration::minutes(baseline.tired_recheck_minutes);
            SchedulePlan {
                next_ask_at: next,
                cooldown_until: Some(next),
            }
        }
        UserStatus::Emergency => {
            let anchor = state
                .emergency_last_ask_at
                .or(state.last_check_in_at)
                .unwrap_or(now);
            SchedulePlan {
                next_ask_at: anchor + Duration::minutes(baseline.emergency_recheck_minutes),
                cooldown_until: None,
            }
        }
    };
    Ok(plan)
}

/// NORMAL status: two daily ask windows in the user's local time.
fn normal_plan(now: DateTime<Utc>, state: &EngineState, baseline: &Baseline, tz: Tz) -> SchedulePlan {
    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive();
    let hour = local_now.hour();

    let in_morning = hour >= baseline.morning_start_hour && hour < baseline.morning_end_hour;
    let in_evening = hour >= baseline.evening_start_hour && hour < baseline.evening_end_hour;

    if in_morning || in_evening {
        let (window_start, window_end) = if in_morning {
            (baseline.morning_start_hour, baseline.morning_end_hour)
        } else {
            (baseline.evening_start_hour, baseline.evening_end_hour)
        };

        if checked_in_within(state, tz, today, window_start, window_end) {
            // Already answered in this window: move on to the other one
            // and hold prompts until this window closes.
            let next = if in_morning {
                local_instant(tz, today, baseline.evening_start_hour)
            } else {
                let tomorrow = today + Duration::days(1);
                local_instant(tz, tomorrow, baseline.morning_start_hour)
            };
            SchedulePlan {
                next_ask_at: next,
                cooldown_until: Some(local_instant(tz, today, window_end)),
            }
        } else {
            // Window is open and unanswered: ask immediately.
            SchedulePlan {
                next_ask_at: local_instant(tz, today, window_start),
                cooldown_until: None,
            }
        }
    } else {
        // Between windows: wait for the next one to open.
        let next = if hour < baseline.morning_start_hour {
            local_instant(tz, today, baseline.morning_start_hour)
        } else if hour < baseline.evening_start_hour {
            local_instant(tz, today, baseline.evening_start_hour)
        } else {
            let tomorrow = today + Duration::days(1);
            local_instant(tz, tomorrow, baseline.morning_start_hour)
        };
        SchedulePlan {
            next_ask_at: next,
            cooldown_until: None,
        }
    }
}

/// Whether the last check-in already fell inside the given local window
/// on the given day.
fn checked_in_within(
    state: &EngineState,
    tz: Tz,
    date: NaiveDate,
    start_hour: u32,
    end_hour: u32,
) -> bool {
    match state.last_check_in_at {
        Some(at) => {
            let local = at.with_timezone(&tz);
            local.date_naive() == date
                && local.hour() >= start_hour
                && local.hour() < end_hour
        }
        None => false,
    }
}

/// Resolve a local (date, hour) to UTC. Ambiguous local times take the
/// earlier mapping; times skipped by a DST jump fall back to reading the
/// naive value as UTC.
fn local_instant(tz: Tz, date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

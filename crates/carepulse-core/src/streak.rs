//! Mission progress tracking.
//!
//! Successful check-ins feed the companion mission system: each one
//! bumps the "daily check-in" mission and extends a consecutive-day
//! streak. The engine reports progress after its transaction commits and
//! drops tracker errors, so mission bookkeeping can never block or
//! poison event ingestion.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::Database;

/// Mission credited once per accepted check-in.
pub const DAILY_CHECK_IN_MISSION: &str = "daily check-in";

/// Receives mission progress reports from the engine.
pub trait MissionTracker: Send {
    /// Record progress for a user on a mission.
    fn record_progress(
        &mut self,
        user_id: &str,
        mission: &str,
        increment: u32,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

/// Tracker that ignores all progress reports.
pub struct NoopMissionTracker;

impl MissionTracker for NoopMissionTracker {
    fn record_progress(&mut self, _: &str, _: &str, _: u32, _: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

/// Per-(user, mission) progress counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionProgress {
    pub user_id: String,
    pub mission: String,
    /// Total increments ever recorded.
    pub total: u32,
    /// Consecutive calendar days (UTC) with progress.
    pub streak_days: u32,
    /// Last day progress was recorded.
    pub last_progress_on: Option<NaiveDate>,
}

impl MissionProgress {
    fn new(user_id: &str, mission: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            mission: mission.to_string(),
            total: 0,
            streak_days: 0,
            last_progress_on: None,
        }
    }

    /// Fold one progress report into the counters. Streak days are UTC
    /// calendar days: a same-day report keeps the streak, the next day
    /// extends it, any gap resets it to 1.
    pub fn advance(&mut self, increment: u32, day: NaiveDate) {
        self.total += increment;
        self.streak_days = match self.last_progress_on {
            Some(last) if last == day => self.streak_days.max(1),
            Some(last) if last.succ_opt() == Some(day) => self.streak_days + 1,
            _ => 1,
        };
        self.last_progress_on = Some(day);
    }
}

/// Tracker persisting to the shared `mission_progress` table.
pub struct SqliteMissionTracker {
    db: Database,
}

impl SqliteMissionTracker {
    /// Tracker over an already opened database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the tracker against the default database location.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self> {
        Ok(Self::new(Database::open()?))
    }

    /// Current progress for a user on a mission, if any.
    pub fn progress(&self, user_id: &str, mission: &str) -> Result<Option<MissionProgress>> {
        Ok(self.db.get_mission(user_id, mission)?)
    }
}

impl MissionTracker for SqliteMissionTracker {
    fn record_progress(
        &mut self,
        user_id: &str,
        mission: &str,
        increment: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut progress = self
            .db
            .get_mission(user_id, mission)?
            .unwrap_or_else(|| MissionProgress::new(user_id, mission));
        progress.advance(increment, now.date_naive());
        self.db.upsert_mission(&progress)?;
        log::debug!(
            "mission '{}' for {}: total={} streak={} ({}-{:02}-{:02})",
            mission,
            user_id,
            progress.total,
            progress.streak_days,
            now.year(),
            now.month(),
            now.day()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn advance_builds_streaks() {
        let mut progress = MissionProgress::new("user-1", DAILY_CHECK_IN_MISSION);

        progress.advance(1, day(1));
        assert_eq!(progress.total, 1);
        assert_eq!(progress.streak_days, 1);

        // Same day: total grows, streak holds.
        progress.advance(1, day(1));
        assert_eq!(progress.total, 2);
        assert_eq!(progress.streak_days, 1);

        // Next day extends.
        progress.advance(1, day(2));
        assert_eq!(progress.streak_days, 2);
        progress.advance(1, day(3));
        assert_eq!(progress.streak_days, 3);

        // A gap resets.
        progress.advance(1, day(7));
        assert_eq!(progress.streak_days, 1);
        assert_eq!(progress.total, 5);
    }

    #[test]
    fn sqlite_tracker_persists_progress() {
        let mut tracker = SqliteMissionTracker::new(Database::open_memory().unwrap());
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

        tracker
            .record_progress("user-1", DAILY_CHECK_IN_MISSION, 1, t0)
            .unwrap();
        tracker
            .record_progress("user-1", DAILY_CHECK_IN_MISSION, 1, t0 + chrono::Duration::days(1))
            .unwrap();

        let progress = tracker
            .progress("user-1", DAILY_CHECK_IN_MISSION)
            .unwrap()
            .unwrap();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.streak_days, 2);

        assert!(tracker.progress("user-2", DAILY_CHECK_IN_MISSION).unwrap().is_none());
    }
}

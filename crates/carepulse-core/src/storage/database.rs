//! SQLite-based storage for engine state, events, and escalations.
//!
//! Provides persistent storage for:
//! - Per-user baselines and current engine state
//! - The append-only event log backing idempotency and audit
//! - Escalations, caregiver connections, and mission progress

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::baseline::{Baseline, SIGMA_FLOOR_MINUTES};
use crate::connection::{CaregiverConnection, ConnectionStatus};
use crate::error::{CoreError, DatabaseError};
use crate::escalation::{Escalation, EscalationStatus};
use crate::event::{EventRecord, EventSource, EventType, SelfReport};
use crate::state::{EngineState, UserStatus};
use crate::streak::MissionProgress;

use super::{data_dir, migrations};

// === Helper Functions ===

/// Parse user status from database string
fn parse_user_status(status_str: &str) -> UserStatus {
    match status_str {
        "TIRED" => UserStatus::Tired,
        "EMERGENCY" => UserStatus::Emergency,
        _ => UserStatus::Normal,
    }
}

/// Format user status for database storage
fn format_user_status(status: UserStatus) -> &'static str {
    match status {
        UserStatus::Normal => "NORMAL",
        UserStatus::Tired => "TIRED",
        UserStatus::Emergency => "EMERGENCY",
    }
}

/// Parse event type from database string
fn parse_event_type(type_str: &str) -> EventType {
    match type_str {
        "CHECK_IN" => EventType::CheckIn,
        "POPUP_SHOWN" => EventType::PopupShown,
        "POPUP_DISMISSED" => EventType::PopupDismissed,
        _ => EventType::AppOpened,
    }
}

/// Format event type for database storage
fn format_event_type(event_type: EventType) -> &'static str {
    match event_type {
        EventType::CheckIn => "CHECK_IN",
        EventType::PopupShown => "POPUP_SHOWN",
        EventType::PopupDismissed => "POPUP_DISMISSED",
        EventType::AppOpened => "APP_OPENED",
    }
}

/// Parse event source from database string
fn parse_event_source(source_str: &str) -> EventSource {
    match source_str {
        "scheduler" => EventSource::Scheduler,
        "manual" => EventSource::Manual,
        "push" => EventSource::Push,
        _ => EventSource::System,
    }
}

/// Format event source for database storage
fn format_event_source(source: EventSource) -> &'static str {
    match source {
        EventSource::Scheduler => "scheduler",
        EventSource::Manual => "manual",
        EventSource::Push => "push",
        EventSource::System => "system",
    }
}

/// Parse self report from database string
fn parse_self_report(report_str: Option<&str>) -> Option<SelfReport> {
    match report_str {
        Some("NORMAL") => Some(SelfReport::Normal),
        Some("TIRED") => Some(SelfReport::Tired),
        Some("EMERGENCY") => Some(SelfReport::Emergency),
        _ => None,
    }
}

/// Format self report for database storage
fn format_self_report(report: Option<SelfReport>) -> Option<&'static str> {
    report.map(|r| match r {
        SelfReport::Normal => "NORMAL",
        SelfReport::Tired => "TIRED",
        SelfReport::Emergency => "EMERGENCY",
    })
}

/// Parse escalation status from database string
fn parse_escalation_status(status_str: &str) -> EscalationStatus {
    match status_str {
        "sent" => EscalationStatus::Sent,
        "acknowledged" => EscalationStatus::Acknowledged,
        _ => EscalationStatus::Pending,
    }
}

/// Format escalation status for database storage
fn format_escalation_status(status: EscalationStatus) -> &'static str {
    match status {
        EscalationStatus::Pending => "pending",
        EscalationStatus::Sent => "sent",
        EscalationStatus::Acknowledged => "acknowledged",
    }
}

/// Parse connection status from database string
fn parse_connection_status(status_str: &str) -> ConnectionStatus {
    match status_str {
        "accepted" => ConnectionStatus::Accepted,
        "revoked" => ConnectionStatus::Revoked,
        _ => ConnectionStatus::Pending,
    }
}

/// Format connection status for database storage
fn format_connection_status(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Pending => "pending",
        ConnectionStatus::Accepted => "accepted",
        ConnectionStatus::Revoked => "revoked",
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional datetime column
fn parse_datetime_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value.map(|s| parse_datetime_fallback(&s))
}

/// Serialize reason codes for database storage
fn reasons_to_json(reasons: &[String]) -> String {
    serde_json::to_string(reasons).unwrap_or_else(|_| "[]".to_string())
}

/// Parse reason codes from database storage
fn reasons_from_json(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Build a Baseline from a database row
fn row_to_baseline(row: &rusqlite::Row) -> Result<Baseline, rusqlite::Error> {
    let updated_at_str: String = row.get(12)?;
    Ok(Baseline {
        user_id: row.get(0)?,
        timezone: row.get(1)?,
        morning_start_hour: row.get(2)?,
        morning_end_hour: row.get(3)?,
        evening_start_hour: row.get(4)?,
        evening_end_hour: row.get(5)?,
        tired_recheck_minutes: row.get(6)?,
        emergency_recheck_minutes: row.get(7)?,
        silence_threshold: row.get(8)?,
        escalation_delay_minutes: row.get(9)?,
        silence_mean_minutes: row.get(10)?,
        silence_std_minutes: row.get(11)?,
        updated_at: parse_datetime_fallback(&updated_at_str),
    })
}

/// Build an EngineState from a database row
fn row_to_state(row: &rusqlite::Row) -> Result<EngineState, rusqlite::Error> {
    let status_str: String = row.get(1)?;
    let reasons_str: String = row.get(12)?;
    let updated_at_str: String = row.get(14)?;
    Ok(EngineState {
        user_id: row.get(0)?,
        status: parse_user_status(&status_str),
        last_check_in_at: parse_datetime_opt(row.get(2)?),
        next_ask_at: parse_datetime_opt(row.get(3)?),
        cooldown_until: parse_datetime_opt(row.get(4)?),
        silence_count: row.get(5)?,
        emergency_armed: row.get(6)?,
        emergency_last_ask_at: parse_datetime_opt(row.get(7)?),
        last_app_opened_at: parse_datetime_opt(row.get(8)?),
        episode_id: row.get(9)?,
        aps: row.get(10)?,
        tier: row.get(11)?,
        reasons: reasons_from_json(&reasons_str),
        last_event_ts: parse_datetime_opt(row.get(13)?),
        updated_at: parse_datetime_fallback(&updated_at_str),
    })
}

/// Build an EventRecord from a database row
fn row_to_event(row: &rusqlite::Row) -> Result<EventRecord, rusqlite::Error> {
    let type_str: String = row.get(3)?;
    let occurred_at_str: String = row.get(4)?;
    let source_str: String = row.get(7)?;
    let report_str: Option<String> = row.get(8)?;
    let payload_str: Option<String> = row.get(10)?;
    let recorded_at_str: String = row.get(12)?;
    Ok(EventRecord {
        id: row.get(0)?,
        event_id: row.get(1)?,
        user_id: row.get(2)?,
        event_type: parse_event_type(&type_str),
        occurred_at: parse_datetime_fallback(&occurred_at_str),
        client_tz: row.get(5)?,
        ui_session_id: row.get(6)?,
        source: parse_event_source(&source_str),
        self_report: parse_self_report(report_str.as_deref()),
        silence_minutes: row.get(9)?,
        payload: payload_str.and_then(|s| serde_json::from_str(&s).ok()),
        accepted: row.get(11)?,
        recorded_at: parse_datetime_fallback(&recorded_at_str),
    })
}

/// Build an Escalation from a database row
fn row_to_escalation(row: &rusqlite::Row) -> Result<Escalation, rusqlite::Error> {
    let status_str: String = row.get(5)?;
    let reasons_str: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    Ok(Escalation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        episode_id: row.get(2)?,
        connection_id: row.get(3)?,
        caregiver_id: row.get(4)?,
        status: parse_escalation_status(&status_str),
        reasons: reasons_from_json(&reasons_str),
        created_at: parse_datetime_fallback(&created_at_str),
        sent_at: parse_datetime_opt(row.get(8)?),
        acknowledged_at: parse_datetime_opt(row.get(9)?),
        acknowledged_by: row.get(10)?,
    })
}

/// Build a CaregiverConnection from a database row
fn row_to_connection(row: &rusqlite::Row) -> Result<CaregiverConnection, rusqlite::Error> {
    let status_str: String = row.get(3)?;
    let created_at_str: String = row.get(6)?;
    Ok(CaregiverConnection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        caregiver_id: row.get(2)?,
        status: parse_connection_status(&status_str),
        can_receive_alerts: row.get(4)?,
        can_acknowledge: row.get(5)?,
        created_at: parse_datetime_fallback(&created_at_str),
    })
}

/// Build a MissionProgress from a database row
fn row_to_mission(row: &rusqlite::Row) -> Result<MissionProgress, rusqlite::Error> {
    let last_day_str: Option<String> = row.get(4)?;
    Ok(MissionProgress {
        user_id: row.get(0)?,
        mission: row.get(1)?,
        total: row.get(2)?,
        streak_days: row.get(3)?,
        last_progress_on: last_day_str
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
    })
}

/// SQLite database for engine storage.
///
/// One connection, WAL journaling, and a 5 second busy timeout so a
/// second handle on the same file (the mission tracker) never fails
/// outright on lock contention.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/carepulse/carepulse.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("carepulse.db");
        Self::open_at(path)
    }

    /// Open the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path.as_ref()).map_err(|e| DatabaseError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(DatabaseError::from)?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Start an immediate transaction, taking the write lock up front.
    ///
    /// The transaction is the engine's only mutual exclusion: everything
    /// an event changes commits through one of these or not at all.
    ///
    /// # Errors
    /// Returns an error if the lock cannot be acquired within the busy
    /// timeout.
    pub fn begin_immediate(&self) -> Result<Transaction<'_>, rusqlite::Error> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
    }

    // === Baselines ===

    /// Fetch a user's baseline, if one exists.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_baseline(&self, user_id: &str) -> Result<Option<Baseline>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT user_id, timezone, morning_start_hour, morning_end_hour,
                        evening_start_hour, evening_end_hour, tired_recheck_min,
                        emergency_recheck_min, silence_threshold, escalation_delay_min,
                        silence_mean_min, silence_std_min, updated_at
                 FROM baselines WHERE user_id = ?1",
                params![user_id],
                row_to_baseline,
            )
            .optional()
    }

    /// Insert or replace a user's baseline.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn upsert_baseline(&self, baseline: &Baseline) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO baselines (
                user_id, timezone, morning_start_hour, morning_end_hour,
                evening_start_hour, evening_end_hour, tired_recheck_min,
                emergency_recheck_min, silence_threshold, escalation_delay_min,
                silence_mean_min, silence_std_min, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                baseline.user_id,
                baseline.timezone,
                baseline.morning_start_hour,
                baseline.morning_end_hour,
                baseline.evening_start_hour,
                baseline.evening_end_hour,
                baseline.tired_recheck_minutes,
                baseline.emergency_recheck_minutes,
                baseline.silence_threshold,
                baseline.escalation_delay_minutes,
                baseline.silence_mean_minutes,
                baseline.silence_std_minutes,
                baseline.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a user's baseline, creating defaults on first touch and
    /// healing a stored deviation below the floor.
    ///
    /// # Errors
    /// Returns an error if the read or write fails.
    pub fn ensure_baseline(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Baseline, rusqlite::Error> {
        match self.get_baseline(user_id)? {
            Some(mut baseline) => {
                if baseline.heal_sigma() {
                    log::warn!(
                        "silence deviation for {user_id} was below {SIGMA_FLOOR_MINUTES} min, raised to the floor"
                    );
                    baseline.updated_at = now;
                    self.upsert_baseline(&baseline)?;
                }
                Ok(baseline)
            }
            None => {
                let baseline = Baseline::defaults(user_id, now);
                self.upsert_baseline(&baseline)?;
                Ok(baseline)
            }
        }
    }

    // === Engine State ===

    /// Fetch a user's current engine state, if one exists.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_state(&self, user_id: &str) -> Result<Option<EngineState>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT user_id, status, last_check_in_at, next_ask_at, cooldown_until,
                        silence_count, emergency_armed, emergency_last_ask_at,
                        last_app_opened_at, episode_id, aps, tier, reasons,
                        last_event_ts, updated_at
                 FROM engine_state WHERE user_id = ?1",
                params![user_id],
                row_to_state,
            )
            .optional()
    }

    /// Insert or replace a user's engine state.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn upsert_state(&self, state: &EngineState) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO engine_state (
                user_id, status, last_check_in_at, next_ask_at, cooldown_until,
                silence_count, emergency_armed, emergency_last_ask_at,
                last_app_opened_at, episode_id, aps, tier, reasons,
                last_event_ts, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                state.user_id,
                format_user_status(state.status),
                state.last_check_in_at.map(|t| t.to_rfc3339()),
                state.next_ask_at.map(|t| t.to_rfc3339()),
                state.cooldown_until.map(|t| t.to_rfc3339()),
                state.silence_count,
                state.emergency_armed,
                state.emergency_last_ask_at.map(|t| t.to_rfc3339()),
                state.last_app_opened_at.map(|t| t.to_rfc3339()),
                state.episode_id,
                state.aps,
                state.tier,
                reasons_to_json(&state.reasons),
                state.last_event_ts.map(|t| t.to_rfc3339()),
                state.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // === Events ===

    /// Look up an event by its idempotency key.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn find_event(&self, event_id: &str) -> Result<Option<EventRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, event_id, user_id, event_type, occurred_at, client_tz,
                        ui_session_id, source, self_report, silence_min, payload,
                        accepted, recorded_at
                 FROM events WHERE event_id = ?1",
                params![event_id],
                row_to_event,
            )
            .optional()
    }

    /// Append an event to the log.
    ///
    /// The unique index on `event_id` makes a replay fail here, so the
    /// caller must check [`Database::find_event`] first.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_event(&self, record: &EventRecord) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO events (
                event_id, user_id, event_type, occurred_at, client_tz,
                ui_session_id, source, self_report, silence_min, payload,
                accepted, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.event_id,
                record.user_id,
                format_event_type(record.event_type),
                record.occurred_at.to_rfc3339(),
                record.client_tz,
                record.ui_session_id,
                format_event_source(record.source),
                format_self_report(record.self_report),
                record.silence_minutes,
                record.payload.as_ref().map(|p| p.to_string()),
                record.accepted,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Silence samples for baseline estimation: minutes between an
    /// emergency prompt and the check-in that answered it, for check-ins
    /// at or after `since`. Late-arriving rows count too.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn silence_samples(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<f64>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT silence_min FROM events
             WHERE user_id = ?1 AND event_type = 'CHECK_IN'
               AND silence_min IS NOT NULL AND occurred_at >= ?2
             ORDER BY occurred_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id, since.to_rfc3339()], |row| row.get(0))?;
        rows.collect()
    }

    /// Recent events for a user, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_events(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<EventRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_id, user_id, event_type, occurred_at, client_tz,
                    ui_session_id, source, self_report, silence_min, payload,
                    accepted, recorded_at
             FROM events WHERE user_id = ?1
             ORDER BY occurred_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], row_to_event)?;
        rows.collect()
    }

    // === Escalations ===

    /// Look up the escalation for an emergency episode, if any.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn find_escalation_by_episode(
        &self,
        episode_id: &str,
    ) -> Result<Option<Escalation>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, episode_id, connection_id, caregiver_id, status,
                        reasons, created_at, sent_at, acknowledged_at, acknowledged_by
                 FROM escalations WHERE episode_id = ?1",
                params![episode_id],
                row_to_escalation,
            )
            .optional()
    }

    /// Look up an escalation by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_escalation(&self, id: &str) -> Result<Option<Escalation>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, episode_id, connection_id, caregiver_id, status,
                        reasons, created_at, sent_at, acknowledged_at, acknowledged_by
                 FROM escalations WHERE id = ?1",
                params![id],
                row_to_escalation,
            )
            .optional()
    }

    /// Insert a new escalation.
    ///
    /// The unique index on `episode_id` enforces at most one escalation
    /// per emergency episode.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_escalation(&self, escalation: &Escalation) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO escalations (
                id, user_id, episode_id, connection_id, caregiver_id, status,
                reasons, created_at, sent_at, acknowledged_at, acknowledged_by
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                escalation.id,
                escalation.user_id,
                escalation.episode_id,
                escalation.connection_id,
                escalation.caregiver_id,
                format_escalation_status(escalation.status),
                reasons_to_json(&escalation.reasons),
                escalation.created_at.to_rfc3339(),
                escalation.sent_at.map(|t| t.to_rfc3339()),
                escalation.acknowledged_at.map(|t| t.to_rfc3339()),
                escalation.acknowledged_by,
            ],
        )?;
        Ok(())
    }

    /// Mark an escalation acknowledged. Returns false if no such
    /// escalation exists.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn mark_escalation_acknowledged(
        &self,
        id: &str,
        caregiver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE escalations
             SET status = 'acknowledged', acknowledged_at = ?2, acknowledged_by = ?3
             WHERE id = ?1",
            params![id, now.to_rfc3339(), caregiver_id],
        )?;
        Ok(changed > 0)
    }

    /// Escalations for a user, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_escalations(&self, user_id: &str) -> Result<Vec<Escalation>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, episode_id, connection_id, caregiver_id, status,
                    reasons, created_at, sent_at, acknowledged_at, acknowledged_by
             FROM escalations WHERE user_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_escalation)?;
        rows.collect()
    }

    // === Caregiver Connections ===

    /// Insert a new caregiver connection.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_connection(&self, connection: &CaregiverConnection) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO connections (
                id, user_id, caregiver_id, status, can_receive_alerts,
                can_acknowledge, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                connection.id,
                connection.user_id,
                connection.caregiver_id,
                format_connection_status(connection.status),
                connection.can_receive_alerts,
                connection.can_acknowledge,
                connection.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a connection by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_connection(&self, id: &str) -> Result<Option<CaregiverConnection>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, caregiver_id, status, can_receive_alerts,
                        can_acknowledge, created_at
                 FROM connections WHERE id = ?1",
                params![id],
                row_to_connection,
            )
            .optional()
    }

    /// Connections for a user, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_connections(
        &self,
        user_id: &str,
    ) -> Result<Vec<CaregiverConnection>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, caregiver_id, status, can_receive_alerts,
                    can_acknowledge, created_at
             FROM connections WHERE user_id = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_connection)?;
        rows.collect()
    }

    /// Change a connection's lifecycle status. Returns false if no such
    /// connection exists.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn set_connection_status(
        &self,
        id: &str,
        status: ConnectionStatus,
    ) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE connections SET status = ?2 WHERE id = ?1",
            params![id, format_connection_status(status)],
        )?;
        Ok(changed > 0)
    }

    // === Mission Progress ===

    /// Fetch a user's progress on a mission, if any.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_mission(
        &self,
        user_id: &str,
        mission: &str,
    ) -> Result<Option<MissionProgress>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT user_id, mission, total, streak_days, last_progress_on
                 FROM mission_progress WHERE user_id = ?1 AND mission = ?2",
                params![user_id, mission],
                row_to_mission,
            )
            .optional()
    }

    /// Insert or replace a user's progress on a mission.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn upsert_mission(&self, progress: &MissionProgress) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO mission_progress (
                user_id, mission, total, streak_days, last_progress_on
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                progress.user_id,
                progress.mission,
                progress.total,
                progress.streak_days,
                progress
                    .last_progress_on
                    .map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(())
    }

    /// All mission progress rows for a user.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_missions(&self, user_id: &str) -> Result<Vec<MissionProgress>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, mission, total, streak_days, last_progress_on
             FROM mission_progress WHERE user_id = ?1
             ORDER BY mission ASC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_mission)?;
        rows.collect()
    }
}

//! Database schema migrations for carepulse.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current
/// schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT version FROM schema_version",
        [],
        |row| row.get::<_, i32>(0),
    )
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            log::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

/// Migration v1: engine core tables.
///
/// Baselines, current engine state, the append-only event log, and
/// escalations. Timestamps are RFC3339 TEXT; the unique `event_id`
/// backs idempotency and the unique `episode_id` backs once-per-episode
/// escalation.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS baselines (
            user_id             TEXT PRIMARY KEY,
            timezone            TEXT NOT NULL,
            morning_start_hour  INTEGER NOT NULL,
            morning_end_hour    INTEGER NOT NULL,
            evening_start_hour  INTEGER NOT NULL,
            evening_end_hour    INTEGER NOT NULL,
            tired_recheck_min   INTEGER NOT NULL,
            emergency_recheck_min INTEGER NOT NULL,
            silence_threshold   INTEGER NOT NULL,
            escalation_delay_min INTEGER NOT NULL,
            silence_mean_min    REAL NOT NULL,
            silence_std_min     REAL NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS engine_state (
            user_id             TEXT PRIMARY KEY,
            status              TEXT NOT NULL CHECK (status IN ('NORMAL','TIRED','EMERGENCY')),
            last_check_in_at    TEXT,
            next_ask_at         TEXT,
            cooldown_until      TEXT,
            silence_count       INTEGER NOT NULL DEFAULT 0,
            emergency_armed     INTEGER NOT NULL DEFAULT 0,
            emergency_last_ask_at TEXT,
            last_app_opened_at  TEXT,
            episode_id          TEXT,
            aps                 REAL NOT NULL DEFAULT 0,
            tier                INTEGER NOT NULL DEFAULT 0,
            reasons             TEXT NOT NULL DEFAULT '[]',
            last_event_ts       TEXT,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id      TEXT NOT NULL UNIQUE,
            user_id       TEXT NOT NULL,
            event_type    TEXT NOT NULL,
            occurred_at   TEXT NOT NULL,
            client_tz     TEXT,
            ui_session_id TEXT,
            source        TEXT NOT NULL,
            self_report   TEXT,
            silence_min   REAL,
            payload       TEXT,
            accepted      INTEGER NOT NULL DEFAULT 1,
            recorded_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS escalations (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            episode_id      TEXT NOT NULL UNIQUE,
            connection_id   TEXT,
            caregiver_id    TEXT,
            status          TEXT NOT NULL CHECK (status IN ('pending','sent','acknowledged')),
            reasons         TEXT NOT NULL DEFAULT '[]',
            created_at      TEXT NOT NULL,
            sent_at         TEXT,
            acknowledged_at TEXT,
            acknowledged_by TEXT
        );

        -- Indexes for the hot query paths
        CREATE INDEX IF NOT EXISTS idx_events_user_occurred ON events(user_id, occurred_at);
        CREATE INDEX IF NOT EXISTS idx_events_user_type ON events(user_id, event_type, occurred_at);
        CREATE INDEX IF NOT EXISTS idx_escalations_user ON escalations(user_id, created_at);",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;

    tx.commit()?;
    Ok(())
}

/// Migration v2: collaborator tables.
///
/// Caregiver connections (escalation routing and acknowledgement
/// permissions) and mission progress counters.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS connections (
            id                 TEXT PRIMARY KEY,
            user_id            TEXT NOT NULL,
            caregiver_id       TEXT NOT NULL,
            status             TEXT NOT NULL CHECK (status IN ('pending','accepted','revoked')),
            can_receive_alerts INTEGER NOT NULL DEFAULT 1,
            can_acknowledge    INTEGER NOT NULL DEFAULT 1,
            created_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS mission_progress (
            user_id          TEXT NOT NULL,
            mission          TEXT NOT NULL,
            total            INTEGER NOT NULL DEFAULT 0,
            streak_days      INTEGER NOT NULL DEFAULT 0,
            last_progress_on TEXT,
            PRIMARY KEY (user_id, mission)
        );

        CREATE INDEX IF NOT EXISTS idx_connections_user ON connections(user_id, created_at);",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [2])?;

    tx.commit()?;
    Ok(())
}

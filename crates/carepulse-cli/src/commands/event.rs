//! Event submission commands for CLI.

use carepulse_core::storage::Database;
use carepulse_core::{Engine, EventSource, EventType, InboundEvent, SelfReport};
use chrono::Utc;
use clap::Subcommand;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum EventAction {
    /// Submit a check-in self report
    CheckIn {
        /// User ID
        user_id: String,
        /// Reported wellbeing: normal, tired, or emergency
        report: String,
        /// Idempotency key (default: random)
        #[arg(long)]
        event_id: Option<String>,
        /// Client timestamp in epoch milliseconds
        #[arg(long)]
        client_ts: Option<i64>,
        /// Client IANA time zone
        #[arg(long)]
        client_tz: Option<String>,
        /// UI session identifier
        #[arg(long)]
        ui_session_id: Option<String>,
        /// Event source: scheduler, manual, push, or system
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Record that a prompt was shown to the user
    PopupShown {
        /// User ID
        user_id: String,
        /// Idempotency key (default: random)
        #[arg(long)]
        event_id: Option<String>,
        /// Client timestamp in epoch milliseconds
        #[arg(long)]
        client_ts: Option<i64>,
        /// Event source: scheduler, manual, push, or system
        #[arg(long, default_value = "scheduler")]
        source: String,
    },
    /// Record that the user dismissed a prompt unanswered
    PopupDismissed {
        /// User ID
        user_id: String,
        /// Idempotency key (default: random)
        #[arg(long)]
        event_id: Option<String>,
        /// Client timestamp in epoch milliseconds
        #[arg(long)]
        client_ts: Option<i64>,
        /// Event source: scheduler, manual, push, or system
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Record that the app came to the foreground
    AppOpened {
        /// User ID
        user_id: String,
        /// Idempotency key (default: random)
        #[arg(long)]
        event_id: Option<String>,
        /// Client timestamp in epoch milliseconds
        #[arg(long)]
        client_ts: Option<i64>,
        /// Event source: scheduler, manual, push, or system
        #[arg(long, default_value = "system")]
        source: String,
    },
    /// List recent events for a user, newest first
    List {
        /// User ID
        user_id: String,
        /// Maximum number of events to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

pub fn run(action: EventAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        EventAction::CheckIn {
            user_id,
            report,
            event_id,
            client_ts,
            client_tz,
            ui_session_id,
            source,
        } => {
            let report = parse_report(&report)?;
            ingest(InboundEvent {
                event_id: event_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                user_id,
                event_type: EventType::CheckIn,
                client_ts,
                client_tz,
                ui_session_id,
                source: parse_source(&source),
                self_report: Some(report),
                payload: None,
            })
        }
        EventAction::PopupShown {
            user_id,
            event_id,
            client_ts,
            source,
        } => ingest(bare_event(user_id, EventType::PopupShown, event_id, client_ts, &source)),
        EventAction::PopupDismissed {
            user_id,
            event_id,
            client_ts,
            source,
        } => ingest(bare_event(user_id, EventType::PopupDismissed, event_id, client_ts, &source)),
        EventAction::AppOpened {
            user_id,
            event_id,
            client_ts,
            source,
        } => ingest(bare_event(user_id, EventType::AppOpened, event_id, client_ts, &source)),
        EventAction::List { user_id, limit } => {
            let db = Database::open()?;
            let events = db.list_events(&user_id, limit)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(())
        }
    }
}

fn ingest(event: InboundEvent) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = Engine::open()?;
    let outcome = engine.ingest(&event, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn bare_event(
    user_id: String,
    event_type: EventType,
    event_id: Option<String>,
    client_ts: Option<i64>,
    source: &str,
) -> InboundEvent {
    InboundEvent {
        event_id: event_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        user_id,
        event_type,
        client_ts,
        client_tz: None,
        ui_session_id: None,
        source: parse_source(source),
        self_report: None,
        payload: None,
    }
}

fn parse_report(report: &str) -> Result<SelfReport, Box<dyn std::error::Error>> {
    match report {
        "normal" => Ok(SelfReport::Normal),
        "tired" => Ok(SelfReport::Tired),
        "emergency" => Ok(SelfReport::Emergency),
        other => Err(format!("unknown report '{other}' (expected normal, tired, or emergency)").into()),
    }
}

fn parse_source(source: &str) -> EventSource {
    match source {
        "scheduler" => EventSource::Scheduler,
        "push" => EventSource::Push,
        "system" => EventSource::System,
        _ => EventSource::Manual,
    }
}

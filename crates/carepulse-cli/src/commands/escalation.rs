//! Escalation listing and acknowledgement commands for CLI.

use carepulse_core::storage::Database;
use carepulse_core::Engine;
use chrono::Utc;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum EscalationAction {
    /// List escalations for a user, newest first
    List {
        /// User ID
        user_id: String,
    },
    /// Show one escalation
    Get {
        /// Escalation ID
        id: String,
    },
    /// Acknowledge an escalation on behalf of a caregiver
    Ack {
        /// Escalation ID
        id: String,
        /// Acknowledging caregiver ID
        caregiver_id: String,
    },
}

pub fn run(action: EscalationAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        EscalationAction::List { user_id } => {
            let db = Database::open()?;
            let escalations = db.list_escalations(&user_id)?;
            println!("{}", serde_json::to_string_pretty(&escalations)?);
            Ok(())
        }
        EscalationAction::Get { id } => {
            let db = Database::open()?;
            match db.get_escalation(&id)? {
                Some(escalation) => println!("{}", serde_json::to_string_pretty(&escalation)?),
                None => println!("No escalation: {id}"),
            }
            Ok(())
        }
        EscalationAction::Ack { id, caregiver_id } => {
            let mut engine = Engine::open()?;
            let escalation = engine.ack_escalation(&id, &caregiver_id, Utc::now())?;
            println!("Escalation acknowledged: {id}");
            println!("{}", serde_json::to_string_pretty(&escalation)?);
            Ok(())
        }
    }
}

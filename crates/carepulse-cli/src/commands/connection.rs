//! Caregiver connection management commands for CLI.

use carepulse_core::storage::Database;
use carepulse_core::{CaregiverConnection, ConnectionStatus};
use chrono::Utc;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConnectionAction {
    /// Create a pending connection between a user and a caregiver
    Add {
        /// Monitored user ID
        user_id: String,
        /// Caregiver ID
        caregiver_id: String,
        /// Do not route escalation alerts to this connection
        #[arg(long)]
        no_alerts: bool,
        /// Do not allow this caregiver to acknowledge escalations
        #[arg(long)]
        no_ack: bool,
    },
    /// Mark a connection accepted
    Accept {
        /// Connection ID
        id: String,
    },
    /// Revoke a connection
    Revoke {
        /// Connection ID
        id: String,
    },
    /// List a user's connections, oldest first
    List {
        /// User ID
        user_id: String,
    },
}

pub fn run(action: ConnectionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        ConnectionAction::Add {
            user_id,
            caregiver_id,
            no_alerts,
            no_ack,
        } => {
            let mut connection = CaregiverConnection::new(&user_id, &caregiver_id, Utc::now());
            connection.can_receive_alerts = !no_alerts;
            connection.can_acknowledge = !no_ack;
            db.insert_connection(&connection)?;
            println!("Connection created: {}", connection.id);
            println!("{}", serde_json::to_string_pretty(&connection)?);
        }
        ConnectionAction::Accept { id } => {
            if !db.set_connection_status(&id, ConnectionStatus::Accepted)? {
                return Err(format!("no connection: {id}").into());
            }
            println!("Connection accepted: {id}");
        }
        ConnectionAction::Revoke { id } => {
            if !db.set_connection_status(&id, ConnectionStatus::Revoked)? {
                return Err(format!("no connection: {id}").into());
            }
            println!("Connection revoked: {id}");
        }
        ConnectionAction::List { user_id } => {
            let connections = db.list_connections(&user_id)?;
            println!("{}", serde_json::to_string_pretty(&connections)?);
        }
    }

    Ok(())
}

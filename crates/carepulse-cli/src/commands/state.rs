//! Engine state inspection commands for CLI.

use carepulse_core::storage::Database;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum StateAction {
    /// Show a user's current engine state
    Show {
        /// User ID
        user_id: String,
    },
}

pub fn run(action: StateAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StateAction::Show { user_id } => {
            match db.get_state(&user_id)? {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => println!("No state for user: {user_id}"),
            }
            Ok(())
        }
    }
}

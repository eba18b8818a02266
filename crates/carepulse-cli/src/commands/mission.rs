//! Mission progress commands for CLI.

use carepulse_core::storage::Database;
use carepulse_core::streak::DAILY_CHECK_IN_MISSION;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum MissionAction {
    /// Show a user's progress on one mission
    Show {
        /// User ID
        user_id: String,
        /// Mission name
        #[arg(long, default_value = DAILY_CHECK_IN_MISSION)]
        mission: String,
    },
    /// List all mission progress for a user
    List {
        /// User ID
        user_id: String,
    },
}

pub fn run(action: MissionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        MissionAction::Show { user_id, mission } => {
            match db.get_mission(&user_id, &mission)? {
                Some(progress) => println!("{}", serde_json::to_string_pretty(&progress)?),
                None => println!("No progress for user {user_id} on mission '{mission}'"),
            }
            Ok(())
        }
        MissionAction::List { user_id } => {
            let missions = db.list_missions(&user_id)?;
            println!("{}", serde_json::to_string_pretty(&missions)?);
            Ok(())
        }
    }
}

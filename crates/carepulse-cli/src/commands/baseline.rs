//! Baseline configuration commands for CLI.

use carepulse_core::storage::Database;
use carepulse_core::{BaselinePatch, Engine};
use chrono::Utc;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum BaselineAction {
    /// Show a user's baseline (defaults are created on first contact)
    Show {
        /// User ID
        user_id: String,
    },
    /// Override baseline fields for a user
    Set {
        /// User ID
        user_id: String,
        /// IANA time zone for ask windows
        #[arg(long)]
        timezone: Option<String>,
        /// Morning window start hour (0-23, local)
        #[arg(long)]
        morning_start: Option<u32>,
        /// Morning window end hour (0-23, local)
        #[arg(long)]
        morning_end: Option<u32>,
        /// Evening window start hour (0-23, local)
        #[arg(long)]
        evening_start: Option<u32>,
        /// Evening window end hour (0-23, local)
        #[arg(long)]
        evening_end: Option<u32>,
        /// Re-ask interval while TIRED, in minutes
        #[arg(long)]
        tired_recheck: Option<i64>,
        /// Re-ask interval during an emergency, in minutes
        #[arg(long)]
        emergency_recheck: Option<i64>,
        /// Unanswered prompts required before escalation
        #[arg(long)]
        silence_threshold: Option<u32>,
        /// Minimum prompt age before escalation, in minutes
        #[arg(long)]
        escalation_delay: Option<i64>,
    },
}

pub fn run(action: BaselineAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        BaselineAction::Show { user_id } => {
            let db = Database::open()?;
            match db.get_baseline(&user_id)? {
                Some(baseline) => println!("{}", serde_json::to_string_pretty(&baseline)?),
                None => println!("No baseline for user: {user_id}"),
            }
            Ok(())
        }
        BaselineAction::Set {
            user_id,
            timezone,
            morning_start,
            morning_end,
            evening_start,
            evening_end,
            tired_recheck,
            emergency_recheck,
            silence_threshold,
            escalation_delay,
        } => {
            let patch = BaselinePatch {
                timezone,
                morning_start_hour: morning_start,
                morning_end_hour: morning_end,
                evening_start_hour: evening_start,
                evening_end_hour: evening_end,
                tired_recheck_minutes: tired_recheck,
                emergency_recheck_minutes: emergency_recheck,
                silence_threshold,
                escalation_delay_minutes: escalation_delay,
            };
            let mut engine = Engine::open()?;
            let baseline = engine.set_baseline(&user_id, &patch, Utc::now())?;
            println!("Baseline updated: {user_id}");
            println!("{}", serde_json::to_string_pretty(&baseline)?);
            Ok(())
        }
    }
}

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "carepulse-cli", version, about = "CarePulse CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Event submission and history
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Engine state inspection
    State {
        #[command(subcommand)]
        action: commands::state::StateAction,
    },
    /// Baseline configuration
    Baseline {
        #[command(subcommand)]
        action: commands::baseline::BaselineAction,
    },
    /// Escalation listing and acknowledgement
    Escalation {
        #[command(subcommand)]
        action: commands::escalation::EscalationAction,
    },
    /// Caregiver connection management
    Connection {
        #[command(subcommand)]
        action: commands::connection::ConnectionAction,
    },
    /// Mission progress
    Mission {
        #[command(subcommand)]
        action: commands::mission::MissionAction,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Event { action } => commands::event::run(action),
        Commands::State { action } => commands::state::run(action),
        Commands::Baseline { action } => commands::baseline::run(action),
        Commands::Escalation { action } => commands::escalation::run(action),
        Commands::Connection { action } => commands::connection::run(action),
        Commands::Mission { action } => commands::mission::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

//! # CarePulse Core Library
//!
//! This library provides the core business logic for the CarePulse
//! check-in service: an adaptive escalation engine for elderly-care
//! wellbeing monitoring. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary, with any
//! client app being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Engine**: transactional event ingestion that drives the per-user
//!   state machine, baseline learning, scheduling, scoring, and
//!   escalation in one commit
//! - **Storage**: SQLite-based persistence for baselines, state, the
//!   append-only event log, escalations, connections, and missions
//! - **Collaborator seams**: trait-based mission tracker and caregiver
//!   notifier with default implementations
//!
//! ## Key Components
//!
//! - [`Engine`]: event ingestion orchestrator
//! - [`EngineState`]: per-user state machine snapshot
//! - [`Baseline`]: prompting configuration plus learned silence profile
//! - [`Database`]: persistence layer
//! - [`MissionTracker`] / [`CaregiverNotifier`]: collaborator seams

pub mod baseline;
pub mod connection;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod event;
pub mod notify;
pub mod schedule;
pub mod scoring;
pub mod state;
pub mod storage;
pub mod streak;

pub use baseline::{Baseline, BaselinePatch};
pub use connection::{CaregiverConnection, ConnectionStatus};
pub use engine::{ActionFlags, Engine, IngestOutcome};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use escalation::{Escalation, EscalationStatus};
pub use event::{EventRecord, EventSource, EventType, InboundEvent, SelfReport};
pub use notify::{CaregiverNotifier, LogNotifier};
pub use schedule::SchedulePlan;
pub use scoring::{AlertScore, SignalWeights};
pub use state::{EngineState, UserStatus};
pub use storage::Database;
pub use streak::{MissionProgress, MissionTracker, NoopMissionTracker, SqliteMissionTracker};

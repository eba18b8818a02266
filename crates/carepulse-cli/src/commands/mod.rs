pub mod baseline;
pub mod connection;
pub mod escalation;
pub mod event;
pub mod mission;
pub mod state;

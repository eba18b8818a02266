//! Caregiver notification seam.
//!
//! Delivery transports (push, SMS, email) live outside this crate. The
//! engine calls the notifier after an escalation row is committed, so a
//! delivery failure can never undo the escalation.

use crate::error::Result;

/// Delivers escalation notices to caregivers.
pub trait CaregiverNotifier: Send {
    /// Deliver one notice to the caregiver behind a connection.
    fn notify(&mut self, connection_id: &str, caregiver_id: &str, message: &str) -> Result<()>;
}

/// Notifier that only writes to the log. Default wiring until a real
/// transport is plugged in.
pub struct LogNotifier;

impl CaregiverNotifier for LogNotifier {
    fn notify(&mut self, connection_id: &str, caregiver_id: &str, message: &str) -> Result<()> {
        log::info!("notify caregiver {caregiver_id} via {connection_id}: {message}");
        Ok(())
    }
}

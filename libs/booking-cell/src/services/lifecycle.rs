// libs/booking-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentStatus, BookingError};

/// The appointment state machine.
///
/// There is no pending state: a booking that wins its slot claim is
/// immediately confirmed. Completed, no-show and cancelled are terminal.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_transition(
        &self,
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(&next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(BookingError::InvalidTransition(current));
        }

        Ok(())
    }

    /// All valid next statuses for a given current status. Re-affirming
    /// `confirmed` is a permitted no-op.
    pub fn valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::NoShow,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::NoShow => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

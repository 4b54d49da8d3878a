// libs/booking-cell/src/models.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

/// A bookable interval on one doctor's calendar.
///
/// `is_available` means "not yet booked" and nothing else: a slot hidden by
/// an availability block keeps `is_available = true` in storage. The flag is
/// flipped only through `SlotInventoryService::claim`/`release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_type_id: Option<Uuid>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub is_available: bool,
}

/// A doctor-declared exclusion window, full days by convention.
///
/// Blocks are advisory: they hide slots from availability queries without
/// touching the stored rows. Append-only; overlaps are permitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Completed,
    NoShow,
    Cancelled,
}

impl AppointmentStatus {
    /// Terminal statuses accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::NoShow
                | AppointmentStatus::Cancelled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A booking linking one patient, one doctor and exactly one slot.
///
/// At most one non-cancelled appointment may reference a slot at any time;
/// that invariant is enforced by the slot claim, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    pub appointment_type_id: Option<Uuid>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSlotRequest {
    pub slot_id: Uuid,
    pub appointment_type_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBlockRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

/// Appointment row joined with its slot times and display names, the shape
/// list/today/calendar endpoints return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    pub id: Uuid,
    pub status: AppointmentStatus,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub patient_name: Option<String>,
    pub doctor_name: Option<String>,
    pub appointment_type_name: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: NaiveDateTime,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Slot not available")]
    SlotUnavailable,

    #[error("Not authorized for this operation")]
    Forbidden,

    #[error("Record not found")]
    NotFound,

    #[error("Invalid status transition from {0}")]
    InvalidTransition(AppointmentStatus),

    #[error("Database error: {0}")]
    Database(String),
}

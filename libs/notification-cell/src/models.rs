// libs/notification-cell/src/models.rs
use serde::{Deserialize, Serialize};

/// Payload for the booking-confirmation email sent to the patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEmail {
    pub to: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub appointment_type: String,
    pub date: String,
    pub time: String,
    pub duration_minutes: i32,
}

/// Payload for the cancellation notice sent to the patient when the doctor
/// cancels with a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationEmail {
    pub to: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub appointment_date: String,
    pub appointment_time: String,
    pub reason: String,
}

// libs/booking-cell/src/services/booking.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use directory_cell::models::DirectoryError;
use directory_cell::services::directory::DirectoryService;
use notification_cell::{BookingEmail, CancellationEmail, MailerClient, NotificationDispatcher};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Principal, Role};

use crate::models::{
    Appointment, AppointmentStatus, AppointmentView, AvailabilityBlock, BookSlotRequest,
    BookingError, Slot, UpdateAppointmentRequest,
};
use crate::services::blocks::{filter_blocked, AvailabilityBlockService};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::SlotInventoryService;

const RELEASE_ATTEMPTS: u32 = 3;

/// The appointment lifecycle manager.
///
/// Sole writer of appointment status and, through the slot inventory, of the
/// slot availability flag. Everything else reads.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    slots: SlotInventoryService,
    blocks: AvailabilityBlockService,
    lifecycle: AppointmentLifecycleService,
    directory: DirectoryService,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let dispatcher = Arc::new(MailerClient::new(config));
        Self::with_dispatcher(supabase, dispatcher)
    }

    pub fn with_dispatcher(
        supabase: Arc<SupabaseClient>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            slots: SlotInventoryService::new(Arc::clone(&supabase)),
            blocks: AvailabilityBlockService::new(Arc::clone(&supabase)),
            lifecycle: AppointmentLifecycleService::new(),
            directory: DirectoryService::new(Arc::clone(&supabase)),
            supabase,
            dispatcher,
        }
    }

    // ==============================================================================
    // AVAILABILITY QUERIES
    // ==============================================================================

    /// Bookable slots for one doctor on one day, with availability blocks
    /// applied. The stored rows are untouched: a blocked slot stays
    /// `is_available = true` in storage.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, BookingError> {
        let slots = self.slots.list_available(doctor_id, date, auth_token).await?;
        let blocks = self.blocks.list_blocks(doctor_id, auth_token).await?;
        Ok(filter_blocked(&blocks, slots))
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    /// Book one slot for the calling patient.
    ///
    /// The slot claim is the race arbiter: of N concurrent bookings on one
    /// slot exactly one claim commits, the rest get `SlotUnavailable` and no
    /// appointment row. The appointment insert happens only after a won
    /// claim; if the insert itself fails the claim is compensated by a
    /// release so the slot is not lost.
    pub async fn book_slot(
        &self,
        principal: &Principal,
        request: BookSlotRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        if principal.role != Role::Patient {
            return Err(BookingError::Forbidden);
        }

        info!("Booking slot {} for patient {}", request.slot_id, principal.actor_id);

        let slot = self.slots.claim(request.slot_id, auth_token).await?;

        let appointment = match self
            .insert_appointment(principal.actor_id, &slot, &request, auth_token)
            .await
        {
            Ok(appointment) => appointment,
            Err(e) => {
                warn!("Appointment insert failed after claiming slot {}, releasing", slot.id);
                self.release_slot_with_retry(slot.id, auth_token).await;
                return Err(e);
            }
        };

        // Best-effort confirmation mail. A failed send is logged and never
        // rolls back the committed booking.
        if let Err(e) = self
            .send_booking_confirmation(&appointment, &slot, auth_token)
            .await
        {
            warn!(
                "Booking confirmation email failed for appointment {}: {}",
                appointment.id, e
            );
        }

        info!("Appointment {} booked on slot {}", appointment.id, slot.id);
        Ok(appointment)
    }

    // ==============================================================================
    // STATUS TRANSITIONS
    // ==============================================================================

    /// Apply a status update: cancellation by an owner or admin, or an
    /// outcome (`confirmed` re-affirm, `completed`, `no_show`) set by the
    /// owning doctor.
    pub async fn update_appointment(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let is_owning_patient =
            principal.role == Role::Patient && principal.actor_id == appointment.patient_id;
        let is_owning_doctor =
            principal.role == Role::Doctor && principal.actor_id == appointment.doctor_id;

        match request.status {
            AppointmentStatus::Cancelled => {
                if !is_owning_patient && !is_owning_doctor && !principal.is_admin() {
                    return Err(BookingError::Forbidden);
                }
                self.lifecycle
                    .validate_transition(appointment.status, AppointmentStatus::Cancelled)?;
                self.cancel_appointment(principal, appointment, request.cancellation_reason, auth_token)
                    .await
            }
            outcome => {
                // Outcomes belong to the owning doctor alone.
                if !is_owning_doctor {
                    return Err(BookingError::Forbidden);
                }
                self.lifecycle.validate_transition(appointment.status, outcome)?;
                let updated = self
                    .apply_status(appointment.id, outcome, auth_token)
                    .await?;
                info!("Appointment {} marked {}", updated.id, outcome);
                Ok(updated)
            }
        }
    }

    /// Cancel: write the terminal status first, then put the slot back on
    /// the market. If the release keeps failing the slot stays unavailable -
    /// lost inventory is the safe failure, a double-booked slot is not.
    async fn cancel_appointment(
        &self,
        principal: &Principal,
        appointment: Appointment,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let now = Local::now().naive_local();
        let update = json!({
            "status": AppointmentStatus::Cancelled.to_string(),
            "cancellation_reason": reason,
            "cancelled_at": now,
        });

        let cancelled = self
            .patch_appointment(appointment.id, update, auth_token)
            .await?;

        self.release_slot_with_retry(cancelled.slot_id, auth_token).await;

        // Doctor-initiated cancellations with a reason notify the patient.
        // Patient-initiated and reason-less cancellations stay silent.
        if principal.role == Role::Doctor {
            if let Some(reason) = cancelled
                .cancellation_reason
                .as_deref()
                .filter(|r| !r.trim().is_empty())
            {
                if let Err(e) = self
                    .send_cancellation_notice(&cancelled, reason, auth_token)
                    .await
                {
                    warn!(
                        "Cancellation email failed for appointment {}: {}",
                        cancelled.id, e
                    );
                }
            }
        }

        info!("Appointment {} cancelled", cancelled.id);
        Ok(cancelled)
    }

    // ==============================================================================
    // READ PATHS
    // ==============================================================================

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(BookingError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| BookingError::Database(format!("Failed to parse appointment: {}", e)))
    }

    /// The caller's appointments: patients see their bookings, doctors see
    /// theirs, newest slot first.
    pub async fn list_for_principal(
        &self,
        principal: &Principal,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, BookingError> {
        let path = match principal.role {
            Role::Patient => format!("/rest/v1/appointments?patient_id=eq.{}", principal.actor_id),
            Role::Doctor => format!("/rest/v1/appointments?doctor_id=eq.{}", principal.actor_id),
            Role::Admin => return Ok(Vec::new()),
        };

        let appointments = self.fetch_appointments(&path, auth_token).await?;
        let mut views = self.enrich(appointments, auth_token).await?;
        views.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(views)
    }

    /// The calling doctor's confirmed appointments for today, earliest first.
    pub async fn today_for_doctor(
        &self,
        principal: &Principal,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, BookingError> {
        if principal.role != Role::Doctor {
            return Err(BookingError::Forbidden);
        }

        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.{}",
            principal.actor_id,
            AppointmentStatus::Confirmed,
        );
        let appointments = self.fetch_appointments(&path, auth_token).await?;

        let today = Local::now().date_naive();
        let mut views = self.enrich(appointments, auth_token).await?;
        views.retain(|v| v.start_time.date() == today);
        views.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(views)
    }

    /// Calendar range view for the calling doctor: any status, cancellation
    /// reasons included.
    pub async fn calendar_for_doctor(
        &self,
        principal: &Principal,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, BookingError> {
        if principal.role != Role::Doctor {
            return Err(BookingError::Forbidden);
        }

        let from = from.unwrap_or_else(|| Local::now().date_naive());
        let to = to.unwrap_or_else(|| from + chrono::Duration::days(30));
        if from > to {
            return Err(BookingError::Validation(
                "from must not be after to".to_string(),
            ));
        }

        let path = format!("/rest/v1/appointments?doctor_id=eq.{}", principal.actor_id);
        let appointments = self.fetch_appointments(&path, auth_token).await?;

        let mut views = self.enrich(appointments, auth_token).await?;
        views.retain(|v| {
            let date = v.start_time.date();
            from <= date && date <= to
        });
        views.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(views)
    }

    // ==============================================================================
    // AVAILABILITY BLOCKS
    // ==============================================================================

    pub async fn add_block(
        &self,
        principal: &Principal,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<AvailabilityBlock, BookingError> {
        if principal.role != Role::Doctor {
            return Err(BookingError::Forbidden);
        }
        self.blocks
            .add_block(principal.actor_id, start_date, end_date, reason, auth_token)
            .await
    }

    pub async fn list_blocks(
        &self,
        principal: &Principal,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityBlock>, BookingError> {
        if principal.role != Role::Doctor {
            return Err(BookingError::Forbidden);
        }
        self.blocks.list_blocks(principal.actor_id, auth_token).await
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    async fn insert_appointment(
        &self,
        patient_id: Uuid,
        slot: &Slot,
        request: &BookSlotRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment_data = json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "doctor_id": slot.doctor_id,
            "slot_id": slot.id,
            "appointment_type_id": request.appointment_type_id,
            "status": AppointmentStatus::Confirmed.to_string(),
            "notes": request.notes,
            "created_at": Local::now().naive_local(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::Database("Failed to create appointment".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| BookingError::Database(format!("Failed to parse created appointment: {}", e)))
    }

    async fn apply_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        self.patch_appointment(appointment_id, json!({ "status": status.to_string() }), auth_token)
            .await
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update: Value,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update), Some(headers))
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::Database("Failed to update appointment".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| BookingError::Database(format!("Failed to parse updated appointment: {}", e)))
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    BookingError::Database(format!("Failed to parse appointment: {}", e))
                })
            })
            .collect()
    }

    /// Join appointments with their slot times and directory display names.
    async fn enrich(
        &self,
        appointments: Vec<Appointment>,
        auth_token: &str,
    ) -> Result<Vec<AppointmentView>, BookingError> {
        if appointments.is_empty() {
            return Ok(Vec::new());
        }

        let slot_ids: Vec<Uuid> = appointments.iter().map(|a| a.slot_id).collect();
        let slot_map: HashMap<Uuid, Slot> = self
            .slots
            .get_many(&slot_ids, auth_token)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let doctor_ids: Vec<Uuid> = dedup(appointments.iter().map(|a| a.doctor_id));
        let patient_ids: Vec<Uuid> = dedup(appointments.iter().map(|a| a.patient_id));
        let type_ids: Vec<Uuid> = dedup(appointments.iter().filter_map(|a| a.appointment_type_id));

        let doctors = self
            .directory
            .get_doctors(&doctor_ids, auth_token)
            .await
            .map_err(directory_error)?;
        let patients = self
            .directory
            .get_patients(&patient_ids, auth_token)
            .await
            .map_err(directory_error)?;
        let types = self
            .directory
            .get_appointment_types(&type_ids, auth_token)
            .await
            .map_err(directory_error)?;

        appointments
            .into_iter()
            .map(|appointment| {
                let slot = slot_map.get(&appointment.slot_id).ok_or_else(|| {
                    error!(
                        "Appointment {} references missing slot {}",
                        appointment.id, appointment.slot_id
                    );
                    BookingError::Database(format!(
                        "Appointment {} references missing slot {}",
                        appointment.id, appointment.slot_id
                    ))
                })?;

                Ok(AppointmentView {
                    id: appointment.id,
                    status: appointment.status,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    patient_name: patients
                        .get(&appointment.patient_id)
                        .map(|p| p.full_name()),
                    doctor_name: doctors
                        .get(&appointment.doctor_id)
                        .map(|d| d.display_name()),
                    appointment_type_name: appointment
                        .appointment_type_id
                        .and_then(|id| types.get(&id))
                        .map(|t| t.name.clone()),
                    notes: appointment.notes,
                    cancellation_reason: appointment.cancellation_reason,
                    created_at: appointment.created_at,
                })
            })
            .collect()
    }

    /// Bounded release retry. On exhaustion the slot stays unavailable and
    /// we log loudly; the surrounding transition has already committed.
    async fn release_slot_with_retry(&self, slot_id: Uuid, auth_token: &str) {
        for attempt in 1..=RELEASE_ATTEMPTS {
            match self.slots.release(slot_id, auth_token).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        "Release of slot {} failed (attempt {}/{}): {}",
                        slot_id, attempt, RELEASE_ATTEMPTS, e
                    );
                    if attempt < RELEASE_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    }
                }
            }
        }
        error!(
            "Slot {} is stuck unavailable after {} release attempts",
            slot_id, RELEASE_ATTEMPTS
        );
    }

    async fn send_booking_confirmation(
        &self,
        appointment: &Appointment,
        slot: &Slot,
        auth_token: &str,
    ) -> anyhow::Result<()> {
        let patient = self
            .directory
            .get_patient_contact(appointment.patient_id, auth_token)
            .await?;
        let doctor = self
            .directory
            .get_doctor(appointment.doctor_id, auth_token)
            .await?;

        let (type_name, duration_minutes) = match appointment.appointment_type_id {
            Some(type_id) => {
                let info = self
                    .directory
                    .get_appointment_type(type_id, auth_token)
                    .await?;
                (info.name, info.duration_minutes)
            }
            None => (
                "Appointment".to_string(),
                (slot.end_time - slot.start_time).num_minutes() as i32,
            ),
        };

        debug!("Sending booking confirmation to {}", patient.email);
        self.dispatcher
            .notify_booked(&BookingEmail {
                to: patient.email.clone(),
                patient_name: patient.full_name(),
                doctor_name: doctor.display_name(),
                appointment_type: type_name,
                date: slot.start_time.format("%Y-%m-%d").to_string(),
                time: slot.start_time.format("%H:%M").to_string(),
                duration_minutes,
            })
            .await
    }

    async fn send_cancellation_notice(
        &self,
        appointment: &Appointment,
        reason: &str,
        auth_token: &str,
    ) -> anyhow::Result<()> {
        let patient = self
            .directory
            .get_patient_contact(appointment.patient_id, auth_token)
            .await?;
        let doctor = self
            .directory
            .get_doctor(appointment.doctor_id, auth_token)
            .await?;
        let slot = self.slots.get(appointment.slot_id, auth_token).await?;

        debug!("Sending cancellation notice to {}", patient.email);
        self.dispatcher
            .notify_cancelled(&CancellationEmail {
                to: patient.email.clone(),
                patient_name: patient.full_name(),
                doctor_name: doctor.display_name(),
                appointment_date: slot.start_time.format("%Y-%m-%d").to_string(),
                appointment_time: slot.start_time.format("%H:%M").to_string(),
                reason: reason.to_string(),
            })
            .await
    }
}

fn dedup(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

fn directory_error(e: DirectoryError) -> BookingError {
    match e {
        DirectoryError::NotFound => BookingError::NotFound,
        DirectoryError::Invalid(msg) => BookingError::Validation(msg),
        DirectoryError::Database(msg) => BookingError::Database(msg),
    }
}

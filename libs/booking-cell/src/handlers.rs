// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use directory_cell::models::DirectoryError;
use directory_cell::services::identity::IdentityService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Principal, User};
use shared_models::error::AppError;

use crate::models::{AddBlockRequest, BookSlotRequest, BookingError, UpdateAppointmentRequest};
use crate::services::booking::BookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ==============================================================================
// HANDLERS
// ==============================================================================

/// Available slots for a doctor on a day, availability blocks applied.
#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let slots = booking_service
        .available_slots(query.doctor_id, query.date, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!(slots)))
}

/// Book a slot for the calling patient.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let principal = resolve_principal(&state, &user, token).await?;
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .book_slot(&principal, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

/// The caller's appointments: patients see their bookings, doctors theirs.
#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let principal = resolve_principal(&state, &user, token).await?;
    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .list_for_principal(&principal, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!(appointments)))
}

/// Cancel an appointment or set its outcome.
#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let principal = resolve_principal(&state, &user, token).await?;
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .update_appointment(&principal, appointment_id, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

/// Today's confirmed appointments for the calling doctor.
#[axum::debug_handler]
pub async fn get_today_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let principal = resolve_principal(&state, &user, token).await?;
    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .today_for_doctor(&principal, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!(appointments)))
}

/// Calendar range view for the calling doctor.
#[axum::debug_handler]
pub async fn get_doctor_calendar(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let principal = resolve_principal(&state, &user, token).await?;
    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .calendar_for_doctor(&principal, query.from, query.to, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!(appointments)))
}

/// Block out full days on the calling doctor's calendar.
#[axum::debug_handler]
pub async fn add_availability_block(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AddBlockRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let principal = resolve_principal(&state, &user, token).await?;
    let booking_service = BookingService::new(&state);

    let block = booking_service
        .add_block(
            &principal,
            request.start_date,
            request.end_date,
            request.reason,
            token,
        )
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "block": block,
        "message": "Block added"
    })))
}

#[axum::debug_handler]
pub async fn list_availability_blocks(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let principal = resolve_principal(&state, &user, token).await?;
    let booking_service = BookingService::new(&state);

    let blocks = booking_service
        .list_blocks(&principal, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!(blocks)))
}

// ==============================================================================
// HELPERS
// ==============================================================================

/// One identity resolution per request; the resulting principal is passed
/// down into every engine call.
async fn resolve_principal(
    config: &Arc<AppConfig>,
    user: &User,
    token: &str,
) -> Result<Principal, AppError> {
    let identity = IdentityService::new(Arc::new(SupabaseClient::new(config)));
    identity
        .resolve_principal(user, token)
        .await
        .map_err(|e| match e {
            DirectoryError::NotFound => AppError::NotFound("Profile not found".to_string()),
            DirectoryError::Invalid(msg) => AppError::Auth(msg),
            DirectoryError::Database(msg) => AppError::Internal(msg),
        })
}

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::Validation(msg) => AppError::BadRequest(msg),
        BookingError::SlotUnavailable => {
            AppError::Conflict("Slot no longer available".to_string())
        }
        BookingError::Forbidden => {
            AppError::Forbidden("Not authorized for this operation".to_string())
        }
        BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        BookingError::InvalidTransition(status) => {
            AppError::BadRequest(format!("Cannot transition from current status: {}", status))
        }
        BookingError::Database(msg) => AppError::Internal(msg),
    }
}

// libs/booking-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn booking_routes(state: Arc<AppConfig>) -> Router {
    // All booking operations require authentication
    let protected_routes = Router::new()
        .route("/slots", get(handlers::get_available_slots))
        .route("/", post(handlers::book_appointment))
        .route("/appointments", get(handlers::list_appointments))
        .route("/appointments/{appointment_id}", patch(handlers::update_appointment))
        .route("/doctor/today", get(handlers::get_today_appointments))
        .route("/doctor/calendar", get(handlers::get_doctor_calendar))
        .route(
            "/doctor/blocks",
            post(handlers::add_availability_block).get(handlers::list_availability_blocks),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

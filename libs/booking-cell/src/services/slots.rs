// libs/booking-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{BookingError, Slot};

/// Owns the slot rows and their availability flag.
///
/// `claim` and `release` are the only writers of `is_available`, and `claim`
/// is a single conditional update: the availability check and the flip commit
/// together at the storage layer, so concurrent claims on one slot resolve to
/// exactly one winner. Never read-then-write the flag in application code.
pub struct SlotInventoryService {
    supabase: Arc<SupabaseClient>,
}

impl SlotInventoryService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Open slots for one doctor on one calendar day, ordered by start time.
    /// Block filtering is the caller's concern.
    pub async fn list_available(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, BookingError> {
        let day_start = format!("{}T00:00:00", date);
        let day_end = format!("{}T23:59:59.999", date);

        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&is_available=eq.true&start_time=gte.{}&start_time=lte.{}&order=start_time.asc",
            doctor_id,
            urlencoding::encode(&day_start),
            urlencoding::encode(&day_end),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        parse_slot_rows(result)
    }

    pub async fn get(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, BookingError> {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(BookingError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| BookingError::Database(format!("Failed to parse slot: {}", e)))
    }

    pub async fn get_many(
        &self,
        slot_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<Vec<Slot>, BookingError> {
        if slot_ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = slot_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/rest/v1/slots?id=in.({})", id_list);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        parse_slot_rows(result)
    }

    /// Atomically flip one slot from available to taken.
    ///
    /// The `is_available=eq.true` filter makes this a compare-and-swap: the
    /// update only touches the row while the precondition still holds, and
    /// PostgREST returns the touched rows. An empty representation means
    /// another claim got there first (or the slot never existed) and the
    /// caller loses with a definitive conflict.
    pub async fn claim(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, BookingError> {
        debug!("Claiming slot {}", slot_id);

        let path = format!("/rest/v1/slots?id=eq.{}&is_available=eq.true", slot_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "is_available": false })),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        let row = match result.into_iter().next() {
            Some(row) => row,
            None => {
                info!("Slot {} could not be claimed: already taken or missing", slot_id);
                return Err(BookingError::SlotUnavailable);
            }
        };

        serde_json::from_value(row)
            .map_err(|e| BookingError::Database(format!("Failed to parse claimed slot: {}", e)))
    }

    /// Put one slot back on the market. Idempotent: releasing an
    /// already-available slot rewrites `true` and is not an error, so retried
    /// cancellations are safe. A missing row is an invariant breach and fails
    /// loudly.
    pub async fn release(&self, slot_id: Uuid, auth_token: &str) -> Result<(), BookingError> {
        debug!("Releasing slot {}", slot_id);

        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "is_available": true })),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::Database(format!(
                "Release targeted slot {} but no such row exists",
                slot_id
            )));
        }

        Ok(())
    }
}

fn parse_slot_rows(rows: Vec<Value>) -> Result<Vec<Slot>, BookingError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| BookingError::Database(format!("Failed to parse slot: {}", e)))
        })
        .collect()
}

// libs/booking-cell/src/services/blocks.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityBlock, BookingError, Slot};

/// Full-day exclusion windows declared by doctors.
///
/// Blocks veto slot visibility at query time and never touch the stored
/// slot rows; `Slot.is_available` keeps meaning "not yet booked". The store
/// is append-only and overlapping blocks are permitted.
pub struct AvailabilityBlockService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityBlockService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn list_blocks(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityBlock>, BookingError> {
        let path = format!(
            "/rest/v1/availability_blocks?doctor_id=eq.{}&order=start_time.desc",
            doctor_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| BookingError::Database(format!("Failed to parse block: {}", e)))
            })
            .collect()
    }

    /// Append a block covering the given dates in full.
    pub async fn add_block(
        &self,
        doctor_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<AvailabilityBlock, BookingError> {
        if start_date > end_date {
            return Err(BookingError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }

        let (start_time, end_time) = normalize_block_range(start_date, end_date);
        let block_id = Uuid::new_v4();
        debug!("Adding block {} for doctor {}: {} - {}", block_id, doctor_id, start_time, end_time);

        let block_data = json!({
            "id": block_id,
            "doctor_id": doctor_id,
            "start_time": start_time,
            "end_time": end_time,
            "reason": reason,
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/availability_blocks",
                Some(auth_token),
                Some(block_data),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::Database("Failed to create block".to_string()))?;

        let block: AvailabilityBlock = serde_json::from_value(row)
            .map_err(|e| BookingError::Database(format!("Failed to parse created block: {}", e)))?;

        info!("Availability block {} added for doctor {}", block.id, doctor_id);
        Ok(block)
    }
}

/// Expand a date range to full-day bounds: 00:00:00.000 through 23:59:59.999.
pub fn normalize_block_range(start_date: NaiveDate, end_date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = start_date.and_hms_opt(0, 0, 0).unwrap();
    let end = end_date.and_hms_milli_opt(23, 59, 59, 999).unwrap();
    (start, end)
}

/// True if the timestamp falls within any block, bounds inclusive.
pub fn is_blocked(blocks: &[AvailabilityBlock], at: NaiveDateTime) -> bool {
    blocks
        .iter()
        .any(|block| block.start_time <= at && at <= block.end_time)
}

/// Drop slots whose start time is blocked, preserving input order.
pub fn filter_blocked(blocks: &[AvailabilityBlock], slots: Vec<Slot>) -> Vec<Slot> {
    if blocks.is_empty() {
        return slots;
    }
    slots
        .into_iter()
        .filter(|slot| !is_blocked(blocks, slot.start_time))
        .collect()
}

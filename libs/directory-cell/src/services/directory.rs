// libs/directory-cell/src/services/directory.rs
use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentTypeInfo, DirectoryError, DoctorProfile, PatientContact};

/// Read-only reference data: doctors, patients, appointment types.
///
/// Used for response enrichment and notification payloads, never for
/// authorization decisions.
pub struct DirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl DirectoryService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<DoctorProfile, DirectoryError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.fetch_one(&path, auth_token).await
    }

    pub async fn doctor_exists(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, DirectoryError> {
        match self.get_doctor(doctor_id, auth_token).await {
            Ok(_) => Ok(true),
            Err(DirectoryError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_patient_contact(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<PatientContact, DirectoryError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        self.fetch_one(&path, auth_token).await
    }

    pub async fn get_appointment_type(
        &self,
        type_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentTypeInfo, DirectoryError> {
        let path = format!("/rest/v1/appointment_types?id=eq.{}", type_id);
        self.fetch_one(&path, auth_token).await
    }

    pub async fn get_doctors(
        &self,
        ids: &[Uuid],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, DoctorProfile>, DirectoryError> {
        let rows: Vec<DoctorProfile> = self.fetch_in("doctors", ids, auth_token).await?;
        Ok(rows.into_iter().map(|d| (d.id, d)).collect())
    }

    pub async fn get_patients(
        &self,
        ids: &[Uuid],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, PatientContact>, DirectoryError> {
        let rows: Vec<PatientContact> = self.fetch_in("patients", ids, auth_token).await?;
        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }

    pub async fn get_appointment_types(
        &self,
        ids: &[Uuid],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, AppointmentTypeInfo>, DirectoryError> {
        let rows: Vec<AppointmentTypeInfo> =
            self.fetch_in("appointment_types", ids, auth_token).await?;
        Ok(rows.into_iter().map(|t| (t.id, t)).collect())
    }

    async fn fetch_one<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<T, DirectoryError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| DirectoryError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DirectoryError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| DirectoryError::Database(format!("Failed to parse row: {}", e)))
    }

    async fn fetch_in<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        ids: &[Uuid],
        auth_token: &str,
    ) -> Result<Vec<T>, DirectoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/rest/v1/{}?id=in.({})", table, id_list);
        debug!("Batch directory lookup: {}", path);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DirectoryError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| DirectoryError::Database(format!("Failed to parse row: {}", e)))
            })
            .collect()
    }
}

// libs/directory-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Doctor reference data. Read-only: the directory never writes these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
}

impl DoctorProfile {
    /// Display name as shown to patients, e.g. "Dr. Jane Doe".
    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) => format!("{} {} {}", title, self.first_name, self.last_name)
                .trim()
                .to_string(),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientContact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl PatientContact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentTypeInfo {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Invalid identity: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(String),
}

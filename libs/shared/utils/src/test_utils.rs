use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub mail_api_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            mail_api_url: "http://localhost:54322".to_string(),
        }
    }
}

impl TestConfig {
    /// A config whose storage and mail endpoints both point at a mock server.
    pub fn with_mock_server(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            mail_api_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            mail_api_url: self.mail_api_url.clone(),
            mail_api_token: "test-mail-token".to_string(),
            mail_from: "noreply@medbook.example".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned storage rows for wiremock-backed tests.
pub struct MockStoreResponses;

impl MockStoreResponses {
    pub fn slot_row(slot_id: &str, doctor_id: &str, start: &str, end: &str, available: bool) -> serde_json::Value {
        json!({
            "id": slot_id,
            "doctor_id": doctor_id,
            "appointment_type_id": null,
            "start_time": start,
            "end_time": end,
            "is_available": available
        })
    }

    pub fn block_row(block_id: &str, doctor_id: &str, start: &str, end: &str, reason: Option<&str>) -> serde_json::Value {
        json!({
            "id": block_id,
            "doctor_id": doctor_id,
            "start_time": start,
            "end_time": end,
            "reason": reason
        })
    }

    pub fn appointment_row(
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        slot_id: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "slot_id": slot_id,
            "appointment_type_id": null,
            "status": status,
            "notes": null,
            "cancellation_reason": null,
            "cancelled_at": null,
            "created_at": "2024-01-01T00:00:00"
        })
    }

    pub fn patient_row(patient_id: &str, user_id: &str, first_name: &str, last_name: &str, email: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "user_id": user_id,
            "first_name": first_name,
            "last_name": last_name,
            "email": email
        })
    }

    pub fn doctor_row(doctor_id: &str, user_id: &str, first_name: &str, last_name: &str, title: Option<&str>) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "user_id": user_id,
            "first_name": first_name,
            "last_name": last_name,
            "title": title
        })
    }

    pub fn appointment_type_row(type_id: &str, name: &str, duration_minutes: i32) -> serde_json::Value {
        json!({
            "id": type_id,
            "name": name,
            "duration_minutes": duration_minutes
        })
    }
}

// libs/directory-cell/src/services/identity.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Principal, Role, User};

use crate::models::DirectoryError;

/// Resolves the authenticated user into the profile row they act through.
///
/// One lookup per request: handlers call this once and pass the resulting
/// `Principal` down. Engine code never re-queries patient/doctor rows for
/// authorization.
pub struct IdentityService {
    supabase: Arc<SupabaseClient>,
}

impl IdentityService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn resolve_principal(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Principal, DirectoryError> {
        let role = user
            .role
            .as_deref()
            .and_then(Role::parse)
            .ok_or_else(|| DirectoryError::Invalid(format!("Unknown role: {:?}", user.role)))?;

        let actor_id = match role {
            // Admins act under their user id directly; there is no profile row.
            Role::Admin => Uuid::parse_str(&user.id)
                .map_err(|_| DirectoryError::Invalid("Malformed user id".to_string()))?,
            Role::Patient => self.profile_id("patients", &user.id, auth_token).await?,
            Role::Doctor => self.profile_id("doctors", &user.id, auth_token).await?,
        };

        debug!("Resolved user {} as {} {}", user.id, role, actor_id);

        Ok(Principal {
            actor_id,
            user_id: user.id.clone(),
            role,
        })
    }

    async fn profile_id(
        &self,
        table: &str,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Uuid, DirectoryError> {
        let path = format!("/rest/v1/{}?user_id=eq.{}&select=id", table, user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DirectoryError::Database(e.to_string()))?;

        let row = result.first().ok_or(DirectoryError::NotFound)?;
        row["id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| DirectoryError::Database("Malformed profile row".to_string()))
    }
}

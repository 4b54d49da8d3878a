use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use directory_cell::models::DirectoryError;
use directory_cell::services::directory::DirectoryService;
use directory_cell::services::identity::IdentityService;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::Role;
use shared_utils::test_utils::{MockStoreResponses, TestConfig, TestUser};

fn supabase(mock_server: &MockServer) -> Arc<SupabaseClient> {
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
    Arc::new(SupabaseClient::new(&config))
}

#[tokio::test]
async fn patient_resolves_to_their_profile_row() {
    let mock_server = MockServer::start().await;
    let user = TestUser::patient("pat@example.com");
    let profile_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": profile_id }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let identity = IdentityService::new(supabase(&mock_server));
    let principal = identity
        .resolve_principal(&user.to_user(), "test-token")
        .await
        .unwrap();

    assert_eq!(principal.role, Role::Patient);
    assert_eq!(principal.actor_id, profile_id);
    assert_eq!(principal.user_id, user.id);
}

#[tokio::test]
async fn doctor_resolves_through_the_doctors_table() {
    let mock_server = MockServer::start().await;
    let user = TestUser::doctor("doc@example.com");
    let profile_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": profile_id }])))
        .mount(&mock_server)
        .await;

    let identity = IdentityService::new(supabase(&mock_server));
    let principal = identity
        .resolve_principal(&user.to_user(), "test-token")
        .await
        .unwrap();

    assert_eq!(principal.role, Role::Doctor);
    assert_eq!(principal.actor_id, profile_id);
}

#[tokio::test]
async fn admin_needs_no_profile_lookup() {
    let mock_server = MockServer::start().await;
    let user = TestUser::admin("admin@example.com");

    let identity = IdentityService::new(supabase(&mock_server));
    let principal = identity
        .resolve_principal(&user.to_user(), "test-token")
        .await
        .unwrap();

    assert_eq!(principal.role, Role::Admin);
    assert_eq!(principal.actor_id.to_string(), user.id);
}

#[tokio::test]
async fn missing_profile_is_not_found() {
    let mock_server = MockServer::start().await;
    let user = TestUser::patient("ghost@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let identity = IdentityService::new(supabase(&mock_server));
    let result = identity
        .resolve_principal(&user.to_user(), "test-token")
        .await;

    assert!(matches!(result, Err(DirectoryError::NotFound)));
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let mock_server = MockServer::start().await;
    let user = TestUser::new("who@example.com", "receptionist");

    let identity = IdentityService::new(supabase(&mock_server));
    let result = identity
        .resolve_principal(&user.to_user(), "test-token")
        .await;

    assert!(matches!(result, Err(DirectoryError::Invalid(_))));
}

#[tokio::test]
async fn doctor_display_name_includes_title() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::doctor_row(
                &doctor_id.to_string(),
                &Uuid::new_v4().to_string(),
                "Jane",
                "Doe",
                Some("Dr."),
            )
        ])))
        .mount(&mock_server)
        .await;

    let directory = DirectoryService::new(supabase(&mock_server));
    let doctor = directory.get_doctor(doctor_id, "test-token").await.unwrap();

    assert_eq!(doctor.display_name(), "Dr. Jane Doe");
}

#[tokio::test]
async fn doctor_existence_check_distinguishes_missing_rows() {
    let mock_server = MockServer::start().await;
    let known = Uuid::new_v4();
    let unknown = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", known)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::doctor_row(
                &known.to_string(),
                &Uuid::new_v4().to_string(),
                "Jane",
                "Doe",
                None,
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", unknown)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let directory = DirectoryService::new(supabase(&mock_server));
    assert!(directory.doctor_exists(known, "test-token").await.unwrap());
    assert!(!directory.doctor_exists(unknown, "test-token").await.unwrap());
}

#[tokio::test]
async fn appointment_type_lookup_carries_duration() {
    let mock_server = MockServer::start().await;
    let type_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .and(query_param("id", format!("eq.{}", type_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::appointment_type_row(&type_id.to_string(), "General Consultation", 30)
        ])))
        .mount(&mock_server)
        .await;

    let directory = DirectoryService::new(supabase(&mock_server));
    let info = directory
        .get_appointment_type(type_id, "test-token")
        .await
        .unwrap();

    assert_eq!(info.name, "General Consultation");
    assert_eq!(info.duration_minutes, 30);
}

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::router::booking_routes;
use shared_utils::test_utils::{JwtTestUtils, MockStoreResponses, TestConfig, TestUser};

struct TestApp {
    app: Router,
    jwt_secret: String,
}

fn create_test_app(mock_server: &MockServer) -> TestApp {
    let test_config = TestConfig::with_mock_server(&mock_server.uri());
    let jwt_secret = test_config.jwt_secret.clone();
    TestApp {
        app: booking_routes(test_config.to_arc()),
        jwt_secret,
    }
}

fn bearer(test_app: &TestApp, user: &TestUser) -> String {
    format!(
        "Bearer {}",
        JwtTestUtils::create_test_token(user, &test_app.jwt_secret, Some(1))
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Map a test user to their profile row for principal resolution.
async fn mount_profile_mock(mock_server: &MockServer, table: &str, user_id: &str, profile_id: Uuid) {
    Mock::given(method("GET"))
        .and(path(format!("/rest/v1/{}", table)))
        .and(query_param("user_id", format!("eq.{}", user_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": profile_id }])),
        )
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/appointments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_expired_token(&user, &test_app.jwt_secret);

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/appointments")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_tokens_are_rejected() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let token = JwtTestUtils::create_malformed_token();

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/appointments")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn slots_query_requires_doctor_and_date() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::patient("pat@example.com");
    let auth = bearer(&test_app, &user);

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/slots?doctor_id=not-a-uuid")
                .header("Authorization", auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_through_the_api_claims_and_confirms() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::patient("alice@example.com");
    let auth = bearer(&test_app, &user);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    mount_profile_mock(&mock_server, "patients", &user.id, patient_id).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(query_param("is_available", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::slot_row(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                "2024-06-01T09:00:00",
                "2024-06-01T09:30:00",
                false,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "patient_id": patient_id,
            "slot_id": slot_id,
            "status": "confirmed"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockStoreResponses::appointment_row(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                "confirmed",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::patient_row(
                &patient_id.to_string(),
                &user.id,
                "Alice",
                "Smith",
                "alice@example.com",
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
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
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", auth)
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "slot_id": slot_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["appointment"]["status"], json!("confirmed"));
}

#[tokio::test]
async fn booking_a_taken_slot_returns_conflict() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::patient("alice@example.com");
    let auth = bearer(&test_app, &user);

    let patient_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    mount_profile_mock(&mock_server, "patients", &user.id, patient_id).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", auth)
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "slot_id": slot_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn doctors_cannot_book_slots() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::doctor("doc@example.com");
    let auth = bearer(&test_app, &user);

    mount_profile_mock(&mock_server, "doctors", &user.id, Uuid::new_v4()).await;

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", auth)
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "slot_id": Uuid::new_v4() }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn block_endpoint_normalizes_to_full_days() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::doctor("doc@example.com");
    let auth = bearer(&test_app, &user);

    let doctor_id = Uuid::new_v4();
    mount_profile_mock(&mock_server, "doctors", &user.id, doctor_id).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_blocks"))
        .and(body_partial_json(json!({
            "doctor_id": doctor_id,
            "start_time": "2024-06-01T00:00:00",
            "end_time": "2024-06-02T23:59:59.999"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockStoreResponses::block_row(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2024-06-01T00:00:00",
                "2024-06-02T23:59:59.999",
                Some("Conference"),
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/doctor/blocks")
                .header("Authorization", auth)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "start_date": "2024-06-01",
                        "end_date": "2024-06-02",
                        "reason": "Conference"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["block"]["start_time"], json!("2024-06-01T00:00:00"));
}

#[tokio::test]
async fn patients_cannot_add_blocks() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::patient("pat@example.com");
    let auth = bearer(&test_app, &user);

    mount_profile_mock(&mock_server, "patients", &user.id, Uuid::new_v4()).await;

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/doctor/blocks")
                .header("Authorization", auth)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({ "start_date": "2024-06-01", "end_date": "2024-06-02" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cancelling_through_the_api_frees_the_slot() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::patient("alice@example.com");
    let auth = bearer(&test_app, &user);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mount_profile_mock(&mock_server, "patients", &user.id, patient_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::appointment_row(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                &slot_id.to_string(),
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let mut cancelled_row = MockStoreResponses::appointment_row(
        &appointment_id.to_string(),
        &patient_id.to_string(),
        &doctor_id.to_string(),
        &slot_id.to_string(),
        "cancelled",
    );
    cancelled_row["cancelled_at"] = json!("2024-05-31T12:00:00");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled_row])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(body_partial_json(json!({ "is_available": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::slot_row(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                "2024-06-01T09:00:00",
                "2024-06-01T09:30:00",
                true,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/appointments/{}", appointment_id))
                .header("Authorization", auth)
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "status": "cancelled" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["appointment"]["status"], json!("cancelled"));
}

#[tokio::test]
async fn blocked_dates_disappear_from_the_slots_endpoint() {
    let mock_server = MockServer::start().await;
    let test_app = create_test_app(&mock_server);
    let user = TestUser::patient("pat@example.com");
    let auth = bearer(&test_app, &user);

    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::slot_row(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2024-06-01T09:00:00",
                "2024-06-01T09:30:00",
                true,
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::block_row(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2024-06-01T00:00:00",
                "2024-06-01T23:59:59.999",
                None,
            )
        ])))
        .mount(&mock_server)
        .await;

    let response = test_app
        .app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/slots?doctor_id={}&date=2024-06-01", doctor_id))
                .header("Authorization", auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!([]));
}

// libs/appointment-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{any, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::models::*;
use shared_config::AppConfig;
use shared_models::{auth::User, error::AppError};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn config_for(server: &MockServer) -> Arc<AppConfig> {
    TestConfig::with_mock_server(&server.uri()).to_arc()
}

fn user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

async fn mount_slot(server: &MockServer, slot_id: Uuid, doctor_id: Uuid, is_booked: bool) {
    let start = Utc::now() + Duration::days(2);
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(slot_id, doctor_id, start, start + Duration::minutes(30), is_booked)
        ])))
        .mount(server)
        .await;
}

async fn mount_slot_flag_write(server: &MockServer, slot_id: Uuid, doctor_id: Uuid, expected: &str, booked: bool) {
    let start = Utc::now() + Duration::days(2);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(query_param("is_booked", expected))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(slot_id, doctor_id, start, start + Duration::minutes(30), booked)
        ])))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_no_slot_holder(server: &MockServer, slot_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("slot_id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn patient_books_an_open_slot() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    mount_slot(&mock_server, slot_id, doctor_id, false).await;
    mount_no_slot_holder(&mock_server, slot_id).await;
    mount_slot_flag_write(&mock_server, slot_id, doctor_id, "eq.false", true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), patient.id, doctor_id, slot_id, "scheduled")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, Json(body)) = book_appointment(
        State(config_for(&mock_server)),
        user_extension(&patient),
        Json(BookAppointmentRequest { slot_id, service_type: "General consultation".to_string(), patient_id: None }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["slot_id"], json!(slot_id));
    assert_eq!(body["patient_id"], json!(patient.id));
}

#[tokio::test]
async fn doctors_cannot_book_slots_for_themselves() {
    let mock_server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");

    // Nothing may reach the database.
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = book_appointment(
        State(config_for(&mock_server)),
        user_extension(&doctor),
        Json(BookAppointmentRequest { slot_id: Uuid::new_v4(), service_type: "Checkup".to_string(), patient_id: None }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn administrator_books_on_behalf_of_a_patient() {
    let mock_server = MockServer::start().await;
    let admin = TestUser::admin("admin@example.com");
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    mount_slot(&mock_server, slot_id, doctor_id, false).await;
    mount_no_slot_holder(&mock_server, slot_id).await;
    mount_slot_flag_write(&mock_server, slot_id, doctor_id, "eq.false", true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "patient_id": patient_id })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), patient_id, doctor_id, slot_id, "scheduled")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (status, Json(body)) = book_appointment(
        State(config_for(&mock_server)),
        user_extension(&admin),
        Json(BookAppointmentRequest { slot_id, service_type: "Checkup".to_string(), patient_id: Some(patient_id) }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["patient_id"], json!(patient_id));
}

#[tokio::test]
async fn losing_the_conditional_write_is_a_conflict() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let slot_id = Uuid::new_v4();

    mount_slot(&mock_server, slot_id, Uuid::new_v4(), false).await;
    mount_no_slot_holder(&mock_server, slot_id).await;

    // Another booking flipped the flag between the read and the write.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("is_booked", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = book_appointment(
        State(config_for(&mock_server)),
        user_extension(&patient),
        Json(BookAppointmentRequest { slot_id, service_type: "Checkup".to_string(), patient_id: None }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn failed_appointment_insert_releases_the_slot() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    mount_slot(&mock_server, slot_id, doctor_id, false).await;
    mount_no_slot_holder(&mock_server, slot_id).await;
    mount_slot_flag_write(&mock_server, slot_id, doctor_id, "eq.false", true).await;
    // Compensation only clears the flag this booking set.
    mount_slot_flag_write(&mock_server, slot_id, doctor_id, "eq.true", false).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("insert failed", "XX000"),
        ))
        .mount(&mock_server)
        .await;

    let result = book_appointment(
        State(config_for(&mock_server)),
        user_extension(&patient),
        Json(BookAppointmentRequest { slot_id, service_type: "Checkup".to_string(), patient_id: None }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Database(_))));
}

#[tokio::test]
async fn patient_cancel_frees_the_slot() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(appointment_id, patient.id, doctor_id, slot_id, "confirmed")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_row(slot_id, doctor_id, Utc::now(), Utc::now() + Duration::minutes(30), false)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(appointment_id, patient.id, doctor_id, slot_id, "cancelled")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let Json(body) = cancel_appointment(
        State(config_for(&mock_server)),
        Path(appointment_id),
        user_extension(&patient),
    )
    .await
    .unwrap();

    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn patient_cannot_confirm_their_own_appointment() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(appointment_id, patient.id, Uuid::new_v4(), Uuid::new_v4(), "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = update_appointment(
        State(config_for(&mock_server)),
        Path(appointment_id),
        user_extension(&patient),
        Json(UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Confirmed),
            ..Default::default()
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden(msg)) if msg.contains("status")));
}

#[tokio::test]
async fn missing_appointment_is_not_found() {
    let mock_server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = get_appointment(
        State(config_for(&mock_server)),
        Path(Uuid::new_v4()),
        user_extension(&doctor),
    )
    .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn listing_rejects_unknown_filters() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");

    let result = list_appointments(
        State(config_for(&mock_server)),
        user_extension(&patient),
        Query(AppointmentListQuery { filter: Some("tomorrow".to_string()), status: None }),
    )
    .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn doctor_listing_attaches_slots() {
    let mock_server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), Uuid::new_v4(), doctor.id, slot_id, "scheduled")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_slot(&mock_server, slot_id, doctor.id, true).await;

    let Json(body) = list_appointments(
        State(config_for(&mock_server)),
        user_extension(&doctor),
        Query(AppointmentListQuery { filter: Some("upcoming".to_string()), status: None }),
    )
    .await
    .unwrap();

    assert_eq!(body["total"], 1);
    assert_eq!(body["appointments"][0]["slot"]["id"], json!(slot_id));
    assert_eq!(body["appointments"][0]["status"], "scheduled");
}

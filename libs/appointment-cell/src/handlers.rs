// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Caller, User};
use shared_models::error::AppError;

use crate::models::{
    AppointmentFilter, AppointmentListQuery, BookAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = Caller::from_user(&user)?;
    let patient_id = request.patient_for(&caller)?;
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .book_slot(request.slot_id, patient_id, &request.service_type)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let filter = AppointmentFilter::parse(query.filter.as_deref(), query.status.as_deref())?;
    let booking_service = AppointmentBookingService::new(&state);

    let appointments = booking_service.list_appointments_for(&caller, &filter).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.get_appointment(appointment_id, &caller).await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.update_appointment(appointment_id, &caller, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.cancel_appointment(appointment_id, &caller).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let booking_service = AppointmentBookingService::new(&state);

    booking_service.delete_appointment(appointment_id, &caller).await?;

    Ok(Json(json!({ "success": true })))
}

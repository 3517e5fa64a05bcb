use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Caller, User, UserRole};
use shared_models::error::AppError;

use crate::models::{CreateSlotRequest, DoctorSearchQuery, SlotListQuery, UpdateSlotRequest};
use crate::services::availability::AvailabilityService;
use crate::services::doctor::{search_terms, DoctorService};

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn search_doctors_public(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);

    let doctors = doctor_service.search_doctors(&search_terms(&query.q), query.limit).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state).get_doctor(doctor_id).await?;
    let full_name = doctor.full_name();

    Ok(Json(json!({
        "doctor": doctor,
        "full_name": full_name
    })))
}

#[axum::debug_handler]
pub async fn list_doctor_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotListQuery>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let slots = if query.open_only.unwrap_or(false) {
        availability_service.find_open_slots(doctor_id, query.days_ahead, query.limit).await?
    } else {
        availability_service.list_slots_for_doctor(doctor_id).await?
    };

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "slots": slots
    })))
}

// ==============================================================================
// SLOT MANAGEMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = Caller::from_user(&user)?;

    // Doctors publish their own slots; administrators must say for whom.
    let doctor_id = match caller.role {
        UserRole::Doctor => caller.id,
        UserRole::Admin => request.doctor_id.ok_or_else(|| {
            AppError::ValidationError("doctor_id is required when an administrator creates a slot".to_string())
        })?,
        UserRole::Patient => {
            return Err(AppError::Forbidden("Only doctors can publish availability".to_string()));
        }
    };

    let availability_service = AvailabilityService::new(&state);
    let slot = availability_service.create_slot(doctor_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(slot))))
}

#[axum::debug_handler]
pub async fn update_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let availability_service = AvailabilityService::new(&state);

    let slot = availability_service.update_slot(slot_id, &caller, request).await?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    let availability_service = AvailabilityService::new(&state);

    availability_service.delete_slot(slot_id, &caller).await?;

    Ok(Json(json!({ "success": true })))
}

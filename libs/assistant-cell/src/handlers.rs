use std::sync::Arc;

use axum::{
    extract::{State, Extension},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use shared_config::AppConfig;
use shared_models::auth::{Caller, User, UserRole};
use shared_models::error::AppError;

use crate::models::{AssistantError, ChatRequest};
use crate::services::orchestrator::BookingOrchestrator;

#[axum::debug_handler]
pub async fn chat(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;
    if caller.role != UserRole::Patient {
        return Err(AssistantError::PatientsOnly.into());
    }

    let message = request.message.trim();
    if message.is_empty() {
        return Err(AssistantError::EmptyMessage.into());
    }

    if !state.is_assistant_configured() {
        return Err(AssistantError::NotConfigured.into());
    }

    info!("Assistant turn for patient {} ({} prior turns)", caller.id, request.history.len());

    let orchestrator = BookingOrchestrator::new(&state);
    let reply = orchestrator
        .handle_turn(&caller, &user.display_name(), message, request.history)
        .await;

    Ok(Json(json!(reply)))
}

// libs/assistant-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use appointment_cell::models::{Appointment, AppointmentDetails, AppointmentError};
use doctor_cell::models::{AvailabilityError, AvailabilitySlot, DoctorWithSlots};
use shared_models::error::AppError;

// ==============================================================================
// CONVERSATION TURNS (Gemini `contents` wire shape)
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// One content segment of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnPart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    #[serde(default)]
    pub parts: Vec<TurnPart>,
}

impl ConversationTurn {
    pub fn user_text(text: &str) -> Self {
        Self {
            role: TurnRole::User,
            parts: vec![TurnPart::Text { text: text.to_string() }],
        }
    }

    pub fn model_text(text: &str) -> Self {
        Self {
            role: TurnRole::Model,
            parts: vec![TurnPart::Text { text: text.to_string() }],
        }
    }

    /// Tool results go back to the model on the user side of the conversation.
    pub fn function_responses(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: TurnRole::User,
            parts: responses
                .into_iter()
                .map(|function_response| TurnPart::FunctionResponse { function_response })
                .collect(),
        }
    }

    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                TurnPart::FunctionCall { function_call } => Some(function_call.clone()),
                _ => None,
            })
            .collect()
    }

    /// All text segments joined in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                TurnPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// The same turn without its tool requests, or `None` if nothing is left.
    pub fn without_function_calls(&self) -> Option<Self> {
        let parts: Vec<TurnPart> = self
            .parts
            .iter()
            .filter(|part| !matches!(part, TurnPart::FunctionCall { .. }))
            .cloned()
            .collect();
        (!parts.is_empty()).then(|| Self { role: self.role, parts })
    }
}

// ==============================================================================
// REQUEST / REPLY
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

/// Structured payloads gathered from tool calls during one turn.
/// Each key keeps the last payload written to it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctors: Option<Vec<DoctorWithSlots>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<AvailabilitySlot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointments: Option<Vec<AppointmentDetails>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_appointment: Option<Appointment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_appointment: Option<Appointment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    #[serde(flatten)]
    pub results: ToolResults,
    pub history: Vec<ConversationTurn>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

/// Failure of a single tool call. Reported back to the model, never to the HTTP caller.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("The assistant is only available to patients")]
    PatientsOnly,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Conversation model is not configured")]
    NotConfigured,
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::PatientsOnly => AppError::Forbidden(err.to_string()),
            AssistantError::EmptyMessage => AppError::ValidationError(err.to_string()),
            AssistantError::NotConfigured => AppError::ExternalService(err.to_string()),
        }
    }
}

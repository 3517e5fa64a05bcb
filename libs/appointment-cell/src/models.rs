// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::AvailabilitySlot;
use shared_models::auth::{Caller, UserRole};
use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    pub service_type: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(patient_id: Uuid, doctor_id: Uuid, slot_id: Uuid, service_type: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            slot_id,
            service_type: service_type.to_string(),
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Patient, doctor or an administrator.
    pub fn is_visible_to(&self, caller: &Caller) -> bool {
        caller.is_admin() || caller.id == self.patient_id || caller.id == self.doctor_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Statuses that keep the referenced slot's booked flag set.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Statuses a patient or doctor may still act on.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            other => Err(AppointmentError::ValidationError(format!("Unknown appointment status: {}", other))),
        }
    }
}

/// An appointment together with the slot it references, if the slot still exists.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub slot: Option<AvailabilitySlot>,
}

impl AppointmentDetails {
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        self.slot.as_ref().map(|slot| slot.start_time)
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub slot_id: Uuid,
    pub service_type: String,
    /// Only honoured for administrators booking on a patient's behalf.
    #[serde(default)]
    pub patient_id: Option<Uuid>,
}

impl BookAppointmentRequest {
    /// The patient the new appointment belongs to.
    pub fn patient_for(&self, caller: &Caller) -> Result<Uuid, AppointmentError> {
        match caller.role {
            UserRole::Patient => match self.patient_id {
                Some(id) if id != caller.id => Err(AppointmentError::Unauthorized("patient_id".to_string())),
                _ => Ok(caller.id),
            },
            UserRole::Admin => self.patient_id.ok_or_else(|| {
                AppointmentError::ValidationError("patient_id is required when booking for a patient".to_string())
            }),
            UserRole::Doctor => Err(AppointmentError::Unauthorized("booking".to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub slot_id: Option<Uuid>,
    pub service_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub filter: Option<String>,
    pub status: Option<String>,
}

// ==============================================================================
// LISTING FILTERS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentFilter {
    Upcoming,
    Past,
    All,
    Status(Vec<AppointmentStatus>),
}

impl AppointmentFilter {
    /// An explicit status list wins over the named filter. Statuses may be comma separated.
    pub fn parse(filter: Option<&str>, status: Option<&str>) -> Result<Self, AppointmentError> {
        if let Some(status) = status.map(str::trim).filter(|s| !s.is_empty()) {
            let statuses = status
                .split(',')
                .map(str::parse)
                .collect::<Result<Vec<AppointmentStatus>, _>>()?;
            return Ok(AppointmentFilter::Status(statuses));
        }

        match filter.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("all") => Ok(AppointmentFilter::All),
            Some("upcoming") => Ok(AppointmentFilter::Upcoming),
            Some("past") => Ok(AppointmentFilter::Past),
            Some(other) => Err(AppointmentError::ValidationError(format!(
                "Unknown filter '{}'; expected upcoming, past or all",
                other
            ))),
        }
    }

    pub fn matches(&self, details: &AppointmentDetails, now: DateTime<Utc>) -> bool {
        let status = details.appointment.status;
        match self {
            AppointmentFilter::All => true,
            AppointmentFilter::Status(statuses) => statuses.contains(&status),
            AppointmentFilter::Upcoming => {
                status.is_active() && details.starts_at().is_some_and(|start| start > now)
            }
            AppointmentFilter::Past => {
                status == AppointmentStatus::Completed
                    || details.starts_at().is_some_and(|start| start <= now)
            }
        }
    }
}

// ==============================================================================
// ERROR MODELS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot not available: {0}")]
    SlotNotAvailable(String),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not authorized to change {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::SlotNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::SlotNotAvailable(_) | AppointmentError::InvalidStatusTransition { .. } => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::Unauthorized(_) => AppError::Forbidden(err.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

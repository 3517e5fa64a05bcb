// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::auth::Caller;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, UpdateAppointmentRequest};

/// How a caller relates to one appointment. Drives the authorization matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Administrator,
    Doctor,
    Patient,
}

impl Participant {
    pub fn of(appointment: &Appointment, caller: &Caller) -> Option<Self> {
        if caller.is_admin() {
            Some(Participant::Administrator)
        } else if caller.id == appointment.doctor_id {
            Some(Participant::Doctor)
        } else if caller.id == appointment.patient_id {
            Some(Participant::Patient)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed outside administrative updates
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        // Confirming an already confirmed appointment is a no-op.
        if current_status == new_status && current_status == AppointmentStatus::Confirmed {
            return Ok(());
        }

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
            AppointmentStatus::Confirmed => vec![AppointmentStatus::Cancelled],
            // Terminal unless an administrator intervenes
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => vec![],
        }
    }

    /// Checks every field present in the patch against what this participant may change.
    pub fn authorize_update(
        &self,
        participant: Participant,
        appointment: &Appointment,
        patch: &UpdateAppointmentRequest,
    ) -> Result<(), AppointmentError> {
        if participant == Participant::Administrator {
            return Ok(());
        }

        if let Some(new_status) = patch.status {
            let allowed = match participant {
                Participant::Doctor => matches!(new_status, AppointmentStatus::Confirmed | AppointmentStatus::Cancelled),
                _ => new_status == AppointmentStatus::Cancelled,
            };
            if !allowed {
                warn!("{:?} may not set status {} on appointment {}", participant, new_status, appointment.id);
                return Err(AppointmentError::Unauthorized("status".to_string()));
            }
            self.validate_status_transition(appointment.status, new_status)?;
        }

        if patch.slot_id.is_some() {
            return Err(AppointmentError::Unauthorized("slot_id".to_string()));
        }

        if patch.service_type.is_some() {
            return Err(AppointmentError::Unauthorized("service_type".to_string()));
        }

        Ok(())
    }
}

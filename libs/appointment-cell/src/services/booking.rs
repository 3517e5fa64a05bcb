// libs/appointment-cell/src/services/booking.rs
use std::cmp::Reverse;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use doctor_cell::models::AvailabilitySlot;
use doctor_cell::store::{SlotStore, SupabaseSlotStore};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{Caller, UserRole};

use crate::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentFilter, AppointmentStatus,
    UpdateAppointmentRequest,
};
use crate::services::lifecycle::{AppointmentLifecycleService, Participant};
use crate::store::{AppointmentStore, SupabaseAppointmentStore};

/// A booked-flag write already applied to a slot, kept so it can be undone.
#[derive(Debug, Clone, Copy)]
struct SlotChange {
    slot_id: Uuid,
    booked: bool,
}

/// The booking state machine. Keeps every slot's booked flag in step with the
/// appointment holding it.
#[derive(Clone)]
pub struct AppointmentBookingService {
    appointments: Arc<dyn AppointmentStore>,
    slots: Arc<dyn SlotStore>,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_stores(
            Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
            Arc::new(SupabaseSlotStore::new(supabase)),
        )
    }

    pub fn with_stores(appointments: Arc<dyn AppointmentStore>, slots: Arc<dyn SlotStore>) -> Self {
        Self {
            appointments,
            slots,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// Book an open slot for a patient.
    ///
    /// The slot is claimed with a conditional write before the appointment is
    /// stored, so two concurrent bookings of one slot cannot both succeed. If the
    /// appointment cannot be stored the claim is released again.
    pub async fn book_slot(
        &self,
        slot_id: Uuid,
        patient_id: Uuid,
        service_type: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking slot {} for patient {}", slot_id, patient_id);

        let service_type = service_type.trim();
        if service_type.is_empty() {
            return Err(AppointmentError::ValidationError("service_type is required".to_string()));
        }

        let slot = self.load_slot(slot_id).await?;
        if slot.start_time <= Utc::now() {
            return Err(AppointmentError::SlotNotAvailable("Slot start time has passed".to_string()));
        }
        self.ensure_unheld(&slot).await?;

        self.acquire_slot(slot_id).await?;

        let appointment = Appointment::new(patient_id, slot.doctor_id, slot_id, service_type);
        match self.appointments.insert(&appointment).await {
            Ok(created) => {
                info!("Appointment {} booked on slot {}", created.id, slot_id);
                Ok(created)
            }
            Err(e) => {
                error!("Failed to store appointment {} for slot {}: {}", appointment.id, slot_id, e);
                self.revert(&[SlotChange { slot_id, booked: true }], appointment.id).await;
                Err(db_error(e))
            }
        }
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        caller: &Caller,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load_appointment(appointment_id).await?;
        if !appointment.is_visible_to(caller) {
            return Err(AppointmentError::Unauthorized("appointment".to_string()));
        }
        Ok(appointment)
    }

    /// Apply a status, slot or service type change on behalf of a participant.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        caller: &Caller,
        patch: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {} as {}", appointment_id, caller.role);

        let current = self.load_appointment(appointment_id).await?;
        let participant = Participant::of(&current, caller)
            .ok_or_else(|| AppointmentError::Unauthorized("appointment".to_string()))?;

        self.lifecycle.authorize_update(participant, &current, &patch)?;

        let mut next = current.clone();

        if let Some(service_type) = patch.service_type.as_deref() {
            let service_type = service_type.trim();
            if service_type.is_empty() {
                return Err(AppointmentError::ValidationError("service_type cannot be empty".to_string()));
            }
            next.service_type = service_type.to_string();
        }

        if let Some(status) = patch.status {
            next.status = status;
        }

        if let Some(slot_id) = patch.slot_id.filter(|id| *id != current.slot_id) {
            let slot = self.load_slot(slot_id).await?;
            self.ensure_unheld(&slot).await?;
            next.slot_id = slot.id;
            next.doctor_id = slot.doctor_id;
        }

        if participant == Participant::Administrator {
            info!(
                "Administrator {} updating appointment {} ({} -> {})",
                caller.id, appointment_id, current.status, next.status
            );
        }

        self.apply(&current, next).await
    }

    /// Patient-initiated cancellation; frees the slot.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        caller: &Caller,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {}", appointment_id);

        let current = self.load_appointment(appointment_id).await?;
        if caller.id != current.patient_id {
            return Err(AppointmentError::Unauthorized("appointment".to_string()));
        }
        self.lifecycle.validate_status_transition(current.status, AppointmentStatus::Cancelled)?;

        let mut next = current.clone();
        next.status = AppointmentStatus::Cancelled;

        let cancelled = self.apply(&current, next).await?;
        info!("Appointment {} cancelled by patient {}", appointment_id, caller.id);
        Ok(cancelled)
    }

    /// Remove an appointment, freeing its slot unless it was already cancelled.
    pub async fn delete_appointment(&self, appointment_id: Uuid, caller: &Caller) -> Result<(), AppointmentError> {
        debug!("Deleting appointment {}", appointment_id);

        let current = self.load_appointment(appointment_id).await?;
        if !current.is_visible_to(caller) {
            return Err(AppointmentError::Unauthorized("appointment".to_string()));
        }

        let mut applied = Vec::new();
        if current.status.holds_slot() {
            self.release_slot(current.slot_id).await?;
            applied.push(SlotChange { slot_id: current.slot_id, booked: false });
        }

        if let Err(e) = self.appointments.delete(appointment_id).await {
            error!("Failed to delete appointment {}: {}", appointment_id, e);
            self.revert(&applied, appointment_id).await;
            return Err(db_error(e));
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// Appointments visible to the caller with their slots attached.
    pub async fn list_appointments_for(
        &self,
        caller: &Caller,
        filter: &AppointmentFilter,
    ) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        debug!("Listing appointments for {} {} ({:?})", caller.role, caller.id, filter);

        let appointments = match caller.role {
            UserRole::Patient => self.appointments.list_for_patient(caller.id).await,
            UserRole::Doctor => self.appointments.list_for_doctor(caller.id).await,
            UserRole::Admin => self.appointments.list_all().await,
        }
        .map_err(db_error)?;

        let slots = join_all(appointments.iter().map(|a| self.slots.find_by_id(a.slot_id))).await;

        let now = Utc::now();
        let mut details: Vec<AppointmentDetails> = appointments
            .into_iter()
            .zip(slots)
            .map(|(appointment, slot)| {
                let slot = slot.unwrap_or_else(|e| {
                    warn!("Could not load slot {} for appointment {}: {}", appointment.slot_id, appointment.id, e);
                    None
                });
                AppointmentDetails { appointment, slot }
            })
            .filter(|d| filter.matches(d, now))
            .collect();

        match filter {
            AppointmentFilter::Upcoming => details.sort_by_key(|d| d.starts_at()),
            _ => details.sort_by_key(|d| Reverse(d.starts_at())),
        }

        Ok(details)
    }

    /// Moves the slot flags from `current` to `next`, then saves `next`. A failure
    /// at any step undoes the flag writes already made, newest first.
    async fn apply(&self, current: &Appointment, next: Appointment) -> Result<Appointment, AppointmentError> {
        let moved = current.slot_id != next.slot_id;
        let held = current.status.holds_slot();
        let holds = next.status.holds_slot();
        let mut applied = Vec::new();

        if holds && (moved || !held) {
            self.acquire_slot(next.slot_id).await?;
            applied.push(SlotChange { slot_id: next.slot_id, booked: true });
        }

        if held && (moved || !holds) {
            if let Err(e) = self.release_slot(current.slot_id).await {
                self.revert(&applied, current.id).await;
                return Err(e);
            }
            applied.push(SlotChange { slot_id: current.slot_id, booked: false });
        }

        let mut next = next;
        next.updated_at = Utc::now();

        match self.appointments.update(&next).await {
            Ok(Some(saved)) => {
                info!("Appointment {} is now {}", saved.id, saved.status);
                Ok(saved)
            }
            Ok(None) => {
                self.revert(&applied, current.id).await;
                Err(AppointmentError::NotFound)
            }
            Err(e) => {
                error!("Failed to save appointment {}: {}", current.id, e);
                self.revert(&applied, current.id).await;
                Err(db_error(e))
            }
        }
    }

    async fn acquire_slot(&self, slot_id: Uuid) -> Result<AvailabilitySlot, AppointmentError> {
        match self.slots.set_booked_if(slot_id, Some(false), true).await.map_err(db_error)? {
            Some(slot) => Ok(slot),
            None => {
                info!("Slot {} was taken before it could be claimed", slot_id);
                Err(AppointmentError::SlotNotAvailable("Slot is no longer available".to_string()))
            }
        }
    }

    /// A slot can be taken only if its flag is clear and no live appointment
    /// still references it.
    async fn ensure_unheld(&self, slot: &AvailabilitySlot) -> Result<(), AppointmentError> {
        if slot.is_booked {
            return Err(AppointmentError::SlotNotAvailable("Slot is already booked".to_string()));
        }
        if let Some(holder) = self.appointments.find_active_by_slot(slot.id).await.map_err(db_error)? {
            warn!("Slot {} is unbooked but held by appointment {}", slot.id, holder.id);
            return Err(AppointmentError::SlotNotAvailable("Slot is already booked".to_string()));
        }
        Ok(())
    }

    async fn release_slot(&self, slot_id: Uuid) -> Result<(), AppointmentError> {
        if self.slots.set_booked_if(slot_id, None, false).await.map_err(db_error)?.is_none() {
            warn!("Slot {} no longer exists; nothing to release", slot_id);
        }
        Ok(())
    }

    /// Undo flag writes, newest first. Failures are logged for operators and
    /// never replace the error that triggered the rollback.
    async fn revert(&self, applied: &[SlotChange], appointment_id: Uuid) {
        for change in applied.iter().rev() {
            let restored = !change.booked;
            match self.slots.set_booked_if(change.slot_id, Some(change.booked), restored).await {
                Ok(Some(_)) => {
                    info!("Restored booked={} on slot {} for appointment {}", restored, change.slot_id, appointment_id);
                }
                Ok(None) => error!(
                    target: "booking_consistency",
                    "Slot {} changed underneath appointment {} and could not be restored to booked={}; manual reconciliation required",
                    change.slot_id, appointment_id, restored
                ),
                Err(e) => error!(
                    target: "booking_consistency",
                    "Failed to restore booked={} on slot {} for appointment {}: {}; manual reconciliation required",
                    restored, change.slot_id, appointment_id, e
                ),
            }
        }
    }

    async fn load_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .find_by_id(appointment_id)
            .await
            .map_err(db_error)?
            .ok_or(AppointmentError::NotFound)
    }

    async fn load_slot(&self, slot_id: Uuid) -> Result<AvailabilitySlot, AppointmentError> {
        self.slots
            .find_by_id(slot_id)
            .await
            .map_err(db_error)?
            .ok_or(AppointmentError::SlotNotFound)
    }
}

fn db_error(err: anyhow::Error) -> AppointmentError {
    AppointmentError::DatabaseError(err.to_string())
}

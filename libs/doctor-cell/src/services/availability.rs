use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::Caller;

use crate::models::{
    AvailabilityError, AvailabilitySlot, CreateSlotRequest, DayOfWeek, ProximityQuery,
    UpdateSlotRequest, slot_proximity, DEFAULT_LOOKAHEAD_DAYS, DEFAULT_SLOT_LIMIT, MAX_SLOT_LIMIT,
};
use crate::store::{SlotStore, SupabaseSlotStore};

/// Owns the slot lifecycle: creation, rescheduling and removal by the owning doctor,
/// and the five-minute proximity rule between a doctor's slots.
#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn SlotStore>,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_store(Arc::new(SupabaseSlotStore::new(supabase)))
    }

    pub fn with_store(store: Arc<dyn SlotStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn SlotStore> {
        Arc::clone(&self.store)
    }

    /// Create an unbooked slot for a doctor
    pub async fn create_slot(
        &self,
        doctor_id: Uuid,
        request: CreateSlotRequest,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        debug!("Creating availability slot for doctor: {}", doctor_id);

        let day_of_week: DayOfWeek = request
            .day_of_week
            .as_deref()
            .ok_or_else(|| AvailabilityError::ValidationError("day_of_week is required".to_string()))?
            .parse()?;
        let start_time = request
            .start_time
            .ok_or_else(|| AvailabilityError::ValidationError("start_time is required".to_string()))?;
        let end_time = request
            .end_time
            .ok_or_else(|| AvailabilityError::ValidationError("end_time is required".to_string()))?;

        validate_range(start_time, end_time)?;

        if self.is_overlapping(doctor_id, start_time, end_time, day_of_week, None).await? {
            warn!("Slot for doctor {} at {} conflicts with an existing slot", doctor_id, start_time);
            return Err(conflict());
        }

        let slot = AvailabilitySlot::new(doctor_id, start_time, end_time, day_of_week);
        let created = self.store.insert(&slot).await.map_err(db_error)?;

        info!("Availability slot {} created for doctor {}", created.id, doctor_id);
        Ok(created)
    }

    /// Reschedule a slot or, for administrators, set its booked flag directly
    pub async fn update_slot(
        &self,
        slot_id: Uuid,
        caller: &Caller,
        request: UpdateSlotRequest,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        debug!("Updating availability slot: {}", slot_id);

        let current = self.get_slot(slot_id).await?;
        ensure_owner(&current, caller)?;

        if request.is_booked.is_some() && !caller.is_admin() {
            return Err(AvailabilityError::Unauthorized("is_booked".to_string()));
        }

        let mut updated = current.clone();

        if request.touches_schedule() {
            let day_of_week = match request.day_of_week.as_deref() {
                Some(day) => day.parse()?,
                None => current.day_of_week,
            };
            let start_time = request.start_time.unwrap_or(current.start_time);
            let end_time = request.end_time.unwrap_or(current.end_time);

            validate_range(start_time, end_time)?;

            if self.is_overlapping(current.doctor_id, start_time, end_time, day_of_week, Some(slot_id)).await? {
                warn!("Rescheduling slot {} would conflict with an existing slot", slot_id);
                return Err(conflict());
            }

            updated = self.store
                .update_schedule(slot_id, start_time, end_time, day_of_week)
                .await
                .map_err(db_error)?
                .ok_or(AvailabilityError::SlotNotFound)?;
        }

        if let Some(is_booked) = request.is_booked {
            warn!("Administrator {} setting booked flag of slot {} to {}", caller.id, slot_id, is_booked);
            updated = self.store
                .set_booked_if(slot_id, None, is_booked)
                .await
                .map_err(db_error)?
                .ok_or(AvailabilityError::SlotNotFound)?;
        }

        info!("Availability slot {} updated", slot_id);
        Ok(updated)
    }

    /// Delete a slot. Booked slots are refused so a live appointment never loses its slot.
    pub async fn delete_slot(&self, slot_id: Uuid, caller: &Caller) -> Result<(), AvailabilityError> {
        debug!("Deleting availability slot: {}", slot_id);

        let current = self.get_slot(slot_id).await?;
        ensure_owner(&current, caller)?;

        if current.is_booked {
            return Err(AvailabilityError::Conflict(
                "Slot is booked; cancel the appointment before deleting the slot".to_string(),
            ));
        }

        self.store.delete(slot_id).await.map_err(db_error)?;
        info!("Availability slot {} deleted", slot_id);
        Ok(())
    }

    pub async fn get_slot(&self, slot_id: Uuid) -> Result<AvailabilitySlot, AvailabilityError> {
        self.store
            .find_by_id(slot_id)
            .await
            .map_err(db_error)?
            .ok_or(AvailabilityError::SlotNotFound)
    }

    pub async fn list_slots_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        debug!("Listing slots for doctor: {}", doctor_id);
        self.store.list_for_doctor(doctor_id).await.map_err(db_error)
    }

    /// Upcoming unbooked slots within the look-ahead window
    pub async fn find_open_slots(
        &self,
        doctor_id: Uuid,
        days_ahead: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let days = days_ahead.unwrap_or(DEFAULT_LOOKAHEAD_DAYS).clamp(1, 365);
        let limit = limit.unwrap_or(DEFAULT_SLOT_LIMIT).clamp(1, MAX_SLOT_LIMIT);
        let now = Utc::now();

        debug!("Finding open slots for doctor {} over the next {} days", doctor_id, days);
        self.store
            .list_open(doctor_id, now, now + Duration::days(days), limit)
            .await
            .map_err(db_error)
    }

    /// True iff a slot of the same doctor and day has its start or end within
    /// five minutes (inclusive) of the candidate's corresponding boundary.
    pub async fn is_overlapping(
        &self,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        day_of_week: DayOfWeek,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, AvailabilityError> {
        let query = ProximityQuery {
            doctor_id,
            day_of_week,
            start_time,
            end_time,
            tolerance: slot_proximity(),
            exclude_id,
        };

        let near = self.store.find_near(&query).await.map_err(db_error)?;
        Ok(near.iter().any(|slot| query.matches(slot)))
    }
}

fn validate_range(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<(), AvailabilityError> {
    if start_time >= end_time {
        return Err(AvailabilityError::ValidationError("Start time must be before end time".to_string()));
    }
    Ok(())
}

fn ensure_owner(slot: &AvailabilitySlot, caller: &Caller) -> Result<(), AvailabilityError> {
    if caller.is_admin() || caller.id == slot.doctor_id {
        return Ok(());
    }
    warn!("Caller {} is not the owner of slot {}", caller.id, slot.id);
    Err(AvailabilityError::Unauthorized(format!("slot {}", slot.id)))
}

fn conflict() -> AvailabilityError {
    AvailabilityError::Conflict(format!(
        "Slot starts or ends within {} minutes of an existing slot",
        crate::models::SLOT_PROXIMITY_MINUTES
    ))
}

fn db_error(err: anyhow::Error) -> AvailabilityError {
    AvailabilityError::DatabaseError(err.to_string())
}

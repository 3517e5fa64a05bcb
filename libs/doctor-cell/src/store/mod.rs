use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AvailabilitySlot, DayOfWeek, Doctor, ProximityQuery};

mod memory;
mod supabase;

pub use memory::{InMemoryDoctorStore, InMemorySlotStore};
pub use supabase::{SupabaseDoctorStore, SupabaseSlotStore};

/// Persistent collection of availability slots.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn find_by_id(&self, slot_id: Uuid) -> Result<Option<AvailabilitySlot>>;

    /// All slots of a doctor ordered by start time.
    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilitySlot>>;

    /// Slots matching a proximity query (the overlap check).
    async fn find_near(&self, query: &ProximityQuery) -> Result<Vec<AvailabilitySlot>>;

    /// Unbooked slots starting in `(from, until]`, ordered by start time.
    async fn list_open(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AvailabilitySlot>>;

    async fn insert(&self, slot: &AvailabilitySlot) -> Result<AvailabilitySlot>;

    /// Rewrites the time fields only; the booked flag is never touched here.
    async fn update_schedule(
        &self,
        slot_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        day_of_week: DayOfWeek,
    ) -> Result<Option<AvailabilitySlot>>;

    /// Sets the booked flag. With `expected` the write only happens while the
    /// stored flag still equals it; `None` is returned when the condition fails
    /// or the slot is gone.
    async fn set_booked_if(
        &self,
        slot_id: Uuid,
        expected: Option<bool>,
        booked: bool,
    ) -> Result<Option<AvailabilitySlot>>;

    async fn delete(&self, slot_id: Uuid) -> Result<()>;
}

/// Read-only doctor directory used for search.
#[async_trait]
pub trait DoctorStore: Send + Sync {
    async fn find_by_id(&self, doctor_id: Uuid) -> Result<Option<Doctor>>;

    /// Available doctors whose name or specialty contains any of the terms.
    async fn search(&self, terms: &[String], limit: usize) -> Result<Vec<Doctor>>;
}

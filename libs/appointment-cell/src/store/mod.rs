use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Appointment;

mod memory;
mod supabase;

pub use memory::InMemoryAppointmentStore;
pub use supabase::SupabaseAppointmentStore;

/// Persistent collection of appointments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>>;

    /// The appointment currently holding a slot, i.e. any status but cancelled.
    async fn find_active_by_slot(&self, slot_id: Uuid) -> Result<Option<Appointment>>;

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>>;

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>>;

    async fn list_all(&self) -> Result<Vec<Appointment>>;

    async fn insert(&self, appointment: &Appointment) -> Result<Appointment>;

    /// Replaces the mutable fields; `None` when the appointment no longer exists.
    async fn update(&self, appointment: &Appointment) -> Result<Option<Appointment>>;

    async fn delete(&self, appointment_id: Uuid) -> Result<()>;
}

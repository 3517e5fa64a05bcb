use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Appointment;

use super::AppointmentStore;

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filtered(&self, keep: impl Fn(&Appointment) -> bool) -> Vec<Appointment> {
        let appointments = self.appointments.read().await;
        let mut found: Vec<Appointment> = appointments.values().filter(|a| keep(a)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        found
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.appointments.read().await.get(&appointment_id).cloned())
    }

    async fn find_active_by_slot(&self, slot_id: Uuid) -> Result<Option<Appointment>> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .values()
            .find(|a| a.slot_id == slot_id && a.status.holds_slot())
            .cloned())
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>> {
        Ok(self.filtered(|a| a.patient_id == patient_id).await)
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>> {
        Ok(self.filtered(|a| a.doctor_id == doctor_id).await)
    }

    async fn list_all(&self) -> Result<Vec<Appointment>> {
        Ok(self.filtered(|_| true).await)
    }

    async fn insert(&self, appointment: &Appointment) -> Result<Appointment> {
        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&appointment.id) {
            return Err(anyhow!("Duplicate appointment id {}", appointment.id));
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn update(&self, appointment: &Appointment) -> Result<Option<Appointment>> {
        let mut appointments = self.appointments.write().await;
        Ok(appointments.get_mut(&appointment.id).map(|stored| {
            *stored = appointment.clone();
            stored.clone()
        }))
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<()> {
        self.appointments.write().await.remove(&appointment_id);
        Ok(())
    }
}

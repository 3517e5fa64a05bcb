use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{AvailabilitySlot, DayOfWeek, Doctor, ProximityQuery};

use super::{DoctorStore, SlotStore};

/// Process-local slot store. Every write happens under one lock, so the
/// conditional booked-flag write is atomic.
#[derive(Default)]
pub struct InMemorySlotStore {
    slots: RwLock<HashMap<Uuid, AvailabilitySlot>>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots(slots: impl IntoIterator<Item = AvailabilitySlot>) -> Self {
        Self {
            slots: RwLock::new(slots.into_iter().map(|slot| (slot.id, slot)).collect()),
        }
    }
}

fn sorted(mut slots: Vec<AvailabilitySlot>) -> Vec<AvailabilitySlot> {
    slots.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    slots
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn find_by_id(&self, slot_id: Uuid) -> Result<Option<AvailabilitySlot>> {
        Ok(self.slots.read().await.get(&slot_id).cloned())
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilitySlot>> {
        let slots = self.slots.read().await;
        Ok(sorted(slots.values().filter(|s| s.doctor_id == doctor_id).cloned().collect()))
    }

    async fn find_near(&self, query: &ProximityQuery) -> Result<Vec<AvailabilitySlot>> {
        let slots = self.slots.read().await;
        Ok(sorted(slots.values().filter(|s| query.matches(s)).cloned().collect()))
    }

    async fn list_open(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AvailabilitySlot>> {
        let slots = self.slots.read().await;
        let open = slots
            .values()
            .filter(|s| s.doctor_id == doctor_id && s.is_open_at(from) && s.start_time <= until)
            .cloned()
            .collect();
        Ok(sorted(open).into_iter().take(limit).collect())
    }

    async fn insert(&self, slot: &AvailabilitySlot) -> Result<AvailabilitySlot> {
        let mut slots = self.slots.write().await;
        if slots.contains_key(&slot.id) {
            return Err(anyhow!("Duplicate slot id {}", slot.id));
        }
        slots.insert(slot.id, slot.clone());
        Ok(slot.clone())
    }

    async fn update_schedule(
        &self,
        slot_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        day_of_week: DayOfWeek,
    ) -> Result<Option<AvailabilitySlot>> {
        let mut slots = self.slots.write().await;
        Ok(slots.get_mut(&slot_id).map(|slot| {
            slot.start_time = start_time;
            slot.end_time = end_time;
            slot.day_of_week = day_of_week;
            slot.updated_at = Utc::now();
            slot.clone()
        }))
    }

    async fn set_booked_if(
        &self,
        slot_id: Uuid,
        expected: Option<bool>,
        booked: bool,
    ) -> Result<Option<AvailabilitySlot>> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(&slot_id) {
            Some(slot) if expected.map_or(true, |flag| slot.is_booked == flag) => {
                slot.is_booked = booked;
                slot.updated_at = Utc::now();
                Ok(Some(slot.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, slot_id: Uuid) -> Result<()> {
        self.slots.write().await.remove(&slot_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDoctorStore {
    doctors: RwLock<Vec<Doctor>>,
}

impl InMemoryDoctorStore {
    pub fn with_doctors(doctors: impl IntoIterator<Item = Doctor>) -> Self {
        Self {
            doctors: RwLock::new(doctors.into_iter().collect()),
        }
    }
}

#[async_trait]
impl DoctorStore for InMemoryDoctorStore {
    async fn find_by_id(&self, doctor_id: Uuid) -> Result<Option<Doctor>> {
        Ok(self.doctors.read().await.iter().find(|d| d.id == doctor_id).cloned())
    }

    async fn search(&self, terms: &[String], limit: usize) -> Result<Vec<Doctor>> {
        let doctors = self.doctors.read().await;
        let mut found: Vec<Doctor> = doctors
            .iter()
            .filter(|d| d.is_available && terms.iter().any(|t| d.matches_term(t)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.last_name.cmp(&b.last_name));
        found.truncate(limit);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn conditional_flag_write_only_succeeds_once() {
        let start = Utc::now() + Duration::days(1);
        let slot = AvailabilitySlot::new(Uuid::new_v4(), start, start + Duration::minutes(30), DayOfWeek::of(start));
        let store = InMemorySlotStore::with_slots([slot.clone()]);

        let first = store.set_booked_if(slot.id, Some(false), true).await.unwrap();
        assert!(first.unwrap().is_booked);

        let second = store.set_booked_if(slot.id, Some(false), true).await.unwrap();
        assert!(second.is_none());

        let forced = store.set_booked_if(slot.id, None, false).await.unwrap();
        assert!(!forced.unwrap().is_booked);
    }

    #[tokio::test]
    async fn open_listing_skips_booked_and_past_slots() {
        let doctor_id = Uuid::new_v4();
        let now = Utc::now();
        let past = AvailabilitySlot::new(doctor_id, now - Duration::hours(2), now - Duration::hours(1), DayOfWeek::of(now));
        let future = AvailabilitySlot::new(doctor_id, now + Duration::days(2), now + Duration::days(2) + Duration::minutes(30), DayOfWeek::of(now + Duration::days(2)));
        let mut booked = AvailabilitySlot::new(doctor_id, now + Duration::days(1), now + Duration::days(1) + Duration::minutes(30), DayOfWeek::of(now + Duration::days(1)));
        booked.is_booked = true;
        let far = AvailabilitySlot::new(doctor_id, now + Duration::days(60), now + Duration::days(60) + Duration::minutes(30), DayOfWeek::of(now + Duration::days(60)));

        let store = InMemorySlotStore::with_slots([past, future.clone(), booked, far]);
        let open = store.list_open(doctor_id, now, now + Duration::days(28), 10).await.unwrap();

        assert_eq!(open, vec![future]);
    }
}

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::Appointment;

use super::AppointmentStore;

const APPOINTMENTS_TABLE: &str = "/rest/v1/appointments";

fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<Appointment>, _>>()
        .map_err(Into::into)
}

fn first_row(rows: Vec<Value>) -> Result<Option<Appointment>> {
    Ok(parse_rows(rows)?.into_iter().next())
}

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn list(&self, filter: &str) -> Result<Vec<Appointment>> {
        let path = format!("{}?{}order=created_at.desc", APPOINTMENTS_TABLE, filter);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        parse_rows(rows)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_TABLE, appointment_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        first_row(rows)
    }

    async fn find_active_by_slot(&self, slot_id: Uuid) -> Result<Option<Appointment>> {
        let path = format!("{}?slot_id=eq.{}&status=neq.cancelled&limit=1", APPOINTMENTS_TABLE, slot_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        first_row(rows)
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>> {
        self.list(&format!("patient_id=eq.{}&", patient_id)).await
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>> {
        self.list(&format!("doctor_id=eq.{}&", doctor_id)).await
    }

    async fn list_all(&self) -> Result<Vec<Appointment>> {
        self.list("").await
    }

    async fn insert(&self, appointment: &Appointment) -> Result<Appointment> {
        debug!("Inserting appointment {} for slot {}", appointment.id, appointment.slot_id);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            APPOINTMENTS_TABLE,
            None,
            Some(serde_json::to_value(appointment)?),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        first_row(rows)?.ok_or_else(|| anyhow::anyhow!("Failed to create appointment"))
    }

    async fn update(&self, appointment: &Appointment) -> Result<Option<Appointment>> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_TABLE, appointment.id);
        let body = json!({
            "doctor_id": appointment.doctor_id,
            "slot_id": appointment.slot_id,
            "service_type": appointment.service_type,
            "status": appointment.status,
            "updated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;
        first_row(rows)
    }

    async fn delete(&self, appointment_id: Uuid) -> Result<()> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_TABLE, appointment_id);
        self.supabase.execute(Method::DELETE, &path, None).await
    }
}

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{AvailabilitySlot, DayOfWeek, Doctor, ProximityQuery};

use super::{DoctorStore, SlotStore};

const SLOTS_TABLE: &str = "/rest/v1/availability_slots";
const DOCTORS_TABLE: &str = "/rest/v1/doctors";

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(Into::into)
}

fn first_row<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>> {
    Ok(parse_rows(rows)?.into_iter().next())
}

pub struct SupabaseSlotStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSlotStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl SlotStore for SupabaseSlotStore {
    async fn find_by_id(&self, slot_id: Uuid) -> Result<Option<AvailabilitySlot>> {
        let path = format!("{}?id=eq.{}", SLOTS_TABLE, slot_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        first_row(rows)
    }

    async fn list_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<AvailabilitySlot>> {
        let path = format!("{}?doctor_id=eq.{}&order=start_time.asc", SLOTS_TABLE, doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        parse_rows(rows)
    }

    async fn find_near(&self, query: &ProximityQuery) -> Result<Vec<AvailabilitySlot>> {
        let mut path = format!(
            "{}?doctor_id=eq.{}&day_of_week=eq.{}&or=(and(start_time.gte.{},start_time.lte.{}),and(end_time.gte.{},end_time.lte.{}))",
            SLOTS_TABLE,
            query.doctor_id,
            query.day_of_week,
            ts(query.start_time - query.tolerance),
            ts(query.start_time + query.tolerance),
            ts(query.end_time - query.tolerance),
            ts(query.end_time + query.tolerance),
        );
        if let Some(exclude_id) = query.exclude_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }

        debug!("Checking slot proximity for doctor {}", query.doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        parse_rows(rows)
    }

    async fn list_open(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AvailabilitySlot>> {
        let path = format!(
            "{}?doctor_id=eq.{}&is_booked=eq.false&start_time=gt.{}&start_time=lte.{}&order=start_time.asc&limit={}",
            SLOTS_TABLE,
            doctor_id,
            ts(from),
            ts(until),
            limit
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        parse_rows(rows)
    }

    async fn insert(&self, slot: &AvailabilitySlot) -> Result<AvailabilitySlot> {
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            SLOTS_TABLE,
            None,
            Some(serde_json::to_value(slot)?),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        first_row(rows)?.ok_or_else(|| anyhow::anyhow!("Failed to create availability slot"))
    }

    async fn update_schedule(
        &self,
        slot_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        day_of_week: DayOfWeek,
    ) -> Result<Option<AvailabilitySlot>> {
        let path = format!("{}?id=eq.{}", SLOTS_TABLE, slot_id);
        let body = json!({
            "start_time": ts(start_time),
            "end_time": ts(end_time),
            "day_of_week": day_of_week,
            "updated_at": ts(Utc::now()),
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

    async fn set_booked_if(
        &self,
        slot_id: Uuid,
        expected: Option<bool>,
        booked: bool,
    ) -> Result<Option<AvailabilitySlot>> {
        // The filter on the current flag makes PostgREST apply the write atomically
        // and return no rows when another writer got there first.
        let mut path = format!("{}?id=eq.{}", SLOTS_TABLE, slot_id);
        if let Some(flag) = expected {
            path.push_str(&format!("&is_booked=eq.{}", flag));
        }
        let body = json!({
            "is_booked": booked,
            "updated_at": ts(Utc::now()),
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

    async fn delete(&self, slot_id: Uuid) -> Result<()> {
        let path = format!("{}?id=eq.{}", SLOTS_TABLE, slot_id);
        self.supabase.execute(Method::DELETE, &path, None).await
    }
}

pub struct SupabaseDoctorStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDoctorStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

/// Drops characters that carry meaning inside a PostgREST `or=(...)` filter.
fn sanitize_term(term: &str) -> String {
    term.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"' | '\\'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[async_trait]
impl DoctorStore for SupabaseDoctorStore {
    async fn find_by_id(&self, doctor_id: Uuid) -> Result<Option<Doctor>> {
        let path = format!("{}?id=eq.{}", DOCTORS_TABLE, doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        first_row(rows)
    }

    async fn search(&self, terms: &[String], limit: usize) -> Result<Vec<Doctor>> {
        let filters: Vec<String> = terms
            .iter()
            .map(|t| sanitize_term(t))
            .filter(|t| !t.is_empty())
            .flat_map(|t| {
                let pattern = urlencoding::encode(&format!("*{}*", t)).into_owned();
                ["first_name", "last_name", "specialty"]
                    .into_iter()
                    .map(move |column| format!("{}.ilike.{}", column, pattern))
            })
            .collect();

        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let path = format!(
            "{}?is_available=eq.true&or=({})&order=last_name.asc&limit={}",
            DOCTORS_TABLE,
            filters.join(","),
            limit
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        parse_rows(rows)
    }
}

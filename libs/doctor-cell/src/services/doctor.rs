use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{AvailabilityError, Doctor, DoctorWithSlots};
use crate::services::availability::AvailabilityService;
use crate::store::{DoctorStore, SupabaseDoctorStore};

pub const DEFAULT_DOCTOR_LIMIT: usize = 5;
pub const MAX_DOCTOR_LIMIT: usize = 25;
pub const PREVIEW_SLOT_COUNT: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "any", "book", "doctor", "doctors", "dr", "find", "for", "me", "my",
    "near", "need", "some", "specialist", "the", "want", "with", "looking",
];

/// Splits a free-text query into search terms, keeping the whole phrase as one
/// of them and dropping filler words.
pub fn search_terms(query: &str) -> Vec<String> {
    let phrase = query.trim();
    let mut terms = Vec::new();
    if phrase.is_empty() {
        return terms;
    }

    terms.push(phrase.to_string());
    for word in phrase.split(|c: char| !c.is_alphanumeric() && c != '-') {
        let lowered = word.to_lowercase();
        if lowered.len() < 3 || STOP_WORDS.contains(&lowered.as_str()) {
            continue;
        }
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(word)) {
            terms.push(word.to_string());
        }
    }
    terms
}

#[derive(Clone)]
pub struct DoctorService {
    doctors: Arc<dyn DoctorStore>,
    availability: AvailabilityService,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_store(
            Arc::new(SupabaseDoctorStore::new(supabase)),
            AvailabilityService::new(config),
        )
    }

    pub fn with_store(doctors: Arc<dyn DoctorStore>, availability: AvailabilityService) -> Self {
        Self { doctors, availability }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, AvailabilityError> {
        self.doctors
            .find_by_id(doctor_id)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?
            .ok_or(AvailabilityError::DoctorNotFound)
    }

    /// Search available doctors by any of the terms and attach a preview of
    /// their next open slots.
    pub async fn search_doctors(
        &self,
        terms: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<DoctorWithSlots>, AvailabilityError> {
        let limit = limit.unwrap_or(DEFAULT_DOCTOR_LIMIT).clamp(1, MAX_DOCTOR_LIMIT);
        debug!("Searching doctors with terms {:?} (limit {})", terms, limit);

        if terms.is_empty() {
            return Err(AvailabilityError::ValidationError("A search query is required".to_string()));
        }

        let doctors = self.doctors
            .search(terms, limit)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        // Preview lookups are independent reads, so they run concurrently.
        let previews = join_all(doctors.iter().map(|doctor| {
            self.availability.find_open_slots(doctor.id, None, Some(PREVIEW_SLOT_COUNT))
        }))
        .await;

        let results = doctors
            .into_iter()
            .zip(previews)
            .map(|(doctor, preview)| {
                let available_slots = preview.unwrap_or_else(|e| {
                    warn!("Could not load slot preview for doctor {}: {}", doctor.id, e);
                    Vec::new()
                });
                DoctorWithSlots {
                    full_name: doctor.full_name(),
                    doctor,
                    available_slots,
                }
            })
            .collect::<Vec<_>>();

        debug!("Found {} doctors", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_keep_phrase_and_meaningful_words() {
        assert_eq!(search_terms("find a heart doctor"), vec!["find a heart doctor", "heart"]);
        assert_eq!(search_terms("  "), Vec::<String>::new());
        assert_eq!(search_terms("Dermatologist"), vec!["Dermatologist"]);
    }
}

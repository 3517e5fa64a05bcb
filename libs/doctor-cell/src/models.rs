use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

/// Two slots of the same doctor conflict when either boundary lies within this window.
pub const SLOT_PROXIMITY_MINUTES: i64 = 5;

pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 28;
pub const DEFAULT_SLOT_LIMIT: usize = 10;
pub const MAX_SLOT_LIMIT: usize = 50;

// ==============================================================================
// DOCTOR DIRECTORY
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub specialty: String,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Case-insensitive substring match against the doctor's name or specialty.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.full_name().to_lowercase().contains(&term)
            || self.specialty.to_lowercase().contains(&term)
    }
}

/// Search result enriched with a short preview of the doctor's upcoming open slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorWithSlots {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub full_name: String,
    pub available_slots: Vec<AvailabilitySlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorSearchQuery {
    pub q: String,
    pub limit: Option<usize>,
}

// ==============================================================================
// AVAILABILITY SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }

    pub fn of(timestamp: DateTime<Utc>) -> Self {
        match timestamp.weekday() {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = AvailabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let candidate = s.trim();
        DayOfWeek::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(candidate))
            .ok_or_else(|| AvailabilityError::ValidationError(format!(
                "'{}' is not a valid day of week (expected Monday through Sunday)",
                s
            )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub day_of_week: DayOfWeek,
    pub is_booked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn new(doctor_id: Uuid, start_time: DateTime<Utc>, end_time: DateTime<Utc>, day_of_week: DayOfWeek) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            start_time,
            end_time,
            day_of_week,
            is_booked: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Open slots are unbooked and have not started yet.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_booked && self.start_time > now
    }

    /// Windowed proximity test: either boundary within the tolerance of the candidate's.
    pub fn is_near(&self, start: DateTime<Utc>, end: DateTime<Utc>, tolerance: Duration) -> bool {
        within(self.start_time, start, tolerance) || within(self.end_time, end, tolerance)
    }
}

fn within(a: DateTime<Utc>, b: DateTime<Utc>, tolerance: Duration) -> bool {
    (a - b).abs() <= tolerance
}

pub fn slot_proximity() -> Duration {
    Duration::minutes(SLOT_PROXIMITY_MINUTES)
}

/// Candidate boundaries checked against a doctor's existing slots on the same day.
#[derive(Debug, Clone)]
pub struct ProximityQuery {
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tolerance: Duration,
    pub exclude_id: Option<Uuid>,
}

impl ProximityQuery {
    pub fn matches(&self, slot: &AvailabilitySlot) -> bool {
        slot.doctor_id == self.doctor_id
            && slot.day_of_week == self.day_of_week
            && Some(slot.id) != self.exclude_id
            && slot.is_near(self.start_time, self.end_time, self.tolerance)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    /// Only honoured for administrators; doctors always create slots for themselves.
    pub doctor_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub day_of_week: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSlotRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub day_of_week: Option<String>,
    pub is_booked: Option<bool>,
}

impl UpdateSlotRequest {
    pub fn touches_schedule(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.day_of_week.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotListQuery {
    pub open_only: Option<bool>,
    pub days_ahead: Option<i64>,
    pub limit: Option<usize>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("{0}")]
    ValidationError(String),

    #[error("Availability slot not found")]
    SlotNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Not authorized to modify {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
            AvailabilityError::SlotNotFound | AvailabilityError::DoctorNotFound => AppError::NotFound(err.to_string()),
            AvailabilityError::Unauthorized(_) => AppError::Forbidden(err.to_string()),
            AvailabilityError::Conflict(msg) => AppError::Conflict(msg),
            AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_canonical_day_names() {
        assert_eq!("Monday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!(" sunday ".parse::<DayOfWeek>().unwrap(), DayOfWeek::Sunday);
        assert!("Funday".parse::<DayOfWeek>().is_err());
        assert!("Mon".parse::<DayOfWeek>().is_err());
    }

    #[test]
    fn day_of_week_follows_timestamp() {
        assert_eq!(DayOfWeek::of(at("2030-01-07T09:00:00Z")), DayOfWeek::Monday);
        assert_eq!(DayOfWeek::of(at("2030-01-13T09:00:00Z")), DayOfWeek::Sunday);
    }

    #[test]
    fn proximity_is_inclusive_and_per_boundary() {
        let slot = AvailabilitySlot::new(
            Uuid::new_v4(),
            at("2030-01-07T09:00:00Z"),
            at("2030-01-07T09:30:00Z"),
            DayOfWeek::Monday,
        );
        let tolerance = slot_proximity();

        // exactly five minutes away on the start boundary
        assert!(slot.is_near(at("2030-01-07T09:05:00Z"), at("2030-01-07T10:00:00Z"), tolerance));
        // only the end boundary is close
        assert!(slot.is_near(at("2030-01-07T08:00:00Z"), at("2030-01-07T09:27:00Z"), tolerance));
        // back-to-back slot: edges touch but boundaries are 30 minutes apart
        assert!(!slot.is_near(at("2030-01-07T09:30:00Z"), at("2030-01-07T10:00:00Z"), tolerance));
        assert!(!slot.is_near(at("2030-01-07T09:05:01Z"), at("2030-01-07T09:35:01Z"), tolerance));
    }

    #[test]
    fn proximity_query_excludes_self_and_other_days() {
        let slot = AvailabilitySlot::new(
            Uuid::new_v4(),
            at("2030-01-07T09:00:00Z"),
            at("2030-01-07T09:30:00Z"),
            DayOfWeek::Monday,
        );
        let mut query = ProximityQuery {
            doctor_id: slot.doctor_id,
            day_of_week: DayOfWeek::Monday,
            start_time: slot.start_time,
            end_time: slot.end_time,
            tolerance: slot_proximity(),
            exclude_id: None,
        };
        assert!(query.matches(&slot));

        query.exclude_id = Some(slot.id);
        assert!(!query.matches(&slot));

        query.exclude_id = None;
        query.day_of_week = DayOfWeek::Tuesday;
        assert!(!query.matches(&slot));
    }

    #[test]
    fn errors_keep_taxonomy() {
        assert!(matches!(AppError::from(AvailabilityError::Conflict("x".into())), AppError::Conflict(_)));
        assert!(matches!(AppError::from(AvailabilityError::Unauthorized("slot".into())), AppError::Forbidden(_)));
        assert!(matches!(AppError::from(AvailabilityError::SlotNotFound), AppError::NotFound(_)));
    }
}

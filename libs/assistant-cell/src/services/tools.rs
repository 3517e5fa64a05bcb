use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentDetails, AppointmentFilter};
use appointment_cell::services::AppointmentBookingService;
use doctor_cell::models::{AvailabilitySlot, DoctorWithSlots};
use doctor_cell::services::doctor::search_terms;
use doctor_cell::services::{AvailabilityService, DoctorService};
use shared_config::AppConfig;
use shared_models::auth::Caller;

use crate::models::{FunctionCall, ToolError, ToolResults};

pub const DEFAULT_DOCTOR_RESULTS: usize = 5;
pub const MAX_DOCTOR_RESULTS: usize = 10;
pub const DEFAULT_SLOT_RESULTS: usize = 10;
pub const MAX_SLOT_RESULTS: usize = 20;
pub const DEFAULT_DAYS_AHEAD: i64 = 28;
pub const MAX_DAYS_AHEAD: i64 = 90;

const TOOL_NAMES: [&str; 5] = [
    "find_doctors",
    "find_available_slots",
    "book_slot",
    "list_my_appointments",
    "cancel_appointment",
];

/// Everyday words mapped to the specialty that treats them.
const SPECIALTY_KEYWORDS: &[(&str, &str)] = &[
    ("heart", "Cardiologist"),
    ("skin", "Dermatologist"),
    ("child", "Pediatrician"),
    ("kid", "Pediatrician"),
    ("bone", "Orthopedist"),
    ("joint", "Orthopedist"),
    ("brain", "Neurologist"),
    ("nerve", "Neurologist"),
    ("eye", "Ophthalmologist"),
    ("ear", "Otolaryngologist"),
    ("nose", "Otolaryngologist"),
    ("throat", "Otolaryngologist"),
    ("stomach", "Gastroenterologist"),
    ("digest", "Gastroenterologist"),
    ("mental", "Psychiatrist"),
    ("anxiety", "Psychiatrist"),
    ("depress", "Psychiatrist"),
    ("women", "Gynecologist"),
    ("pregnan", "Gynecologist"),
    ("teeth", "Dentist"),
    ("tooth", "Dentist"),
    ("general", "General Practitioner"),
    ("checkup", "General Practitioner"),
];

/// Search terms for a free-text doctor query plus every specialty its keywords imply.
pub fn expand_specialty_query(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    let mut terms = search_terms(query);

    // Keywords are word stems: "depress" covers "depression", "kid" covers "kids".
    for (keyword, specialty) in SPECIALTY_KEYWORDS {
        let mentioned = words.iter().any(|w| w.starts_with(keyword));
        if mentioned && !terms.iter().any(|t| t.eq_ignore_ascii_case(specialty)) {
            terms.push(specialty.to_string());
        }
    }
    terms
}

// ==============================================================================
// TOOL CATALOGUE
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindDoctorsArgs {
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindAvailableSlotsArgs {
    pub doctor_id: Uuid,
    pub days_ahead: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookSlotArgs {
    pub slot_id: Uuid,
    pub service_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListMyAppointmentsArgs {
    pub filter: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelAppointmentArgs {
    pub appointment_id: Uuid,
}

/// The closed set of operations the model may request. None of them take a
/// caller id: the caller is always the authenticated patient.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case", deny_unknown_fields)]
pub enum BookingTool {
    FindDoctors(FindDoctorsArgs),
    FindAvailableSlots(FindAvailableSlotsArgs),
    BookSlot(BookSlotArgs),
    ListMyAppointments(ListMyAppointmentsArgs),
    CancelAppointment(CancelAppointmentArgs),
}

impl BookingTool {
    pub fn from_call(call: &FunctionCall) -> Result<Self, ToolError> {
        if !TOOL_NAMES.contains(&call.name.as_str()) {
            return Err(ToolError::UnknownTool(call.name.clone()));
        }

        let args = if call.args.is_null() { json!({}) } else { call.args.clone() };
        serde_json::from_value(json!({ "name": call.name, "args": args })).map_err(|e| {
            ToolError::InvalidArguments {
                tool: call.name.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Gemini function declarations for every tool.
    pub fn declarations() -> Vec<Value> {
        vec![
            json!({
                "name": "find_doctors",
                "description": "Search available doctors by name, specialty or a plain description of the problem (for example 'heart' or 'skin rash'). Returns each doctor with up to three upcoming open slots.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Free-text search such as a specialty, symptom or doctor name" },
                        "limit": { "type": "integer", "description": "Maximum doctors to return (1-10, default 5)" }
                    },
                    "required": ["query"]
                }
            }),
            json!({
                "name": "find_available_slots",
                "description": "List a doctor's upcoming open appointment slots.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "doctor_id": { "type": "string", "description": "Doctor id returned by find_doctors" },
                        "days_ahead": { "type": "integer", "description": "How many days ahead to look (1-90, default 28)" },
                        "limit": { "type": "integer", "description": "Maximum slots to return (1-20, default 10)" }
                    },
                    "required": ["doctor_id"]
                }
            }),
            json!({
                "name": "book_slot",
                "description": "Book an open slot for the current patient. Only call after the patient has confirmed the slot.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "slot_id": { "type": "string", "description": "Slot id returned by find_doctors or find_available_slots" },
                        "service_type": { "type": "string", "description": "Short reason for the visit, e.g. 'General consultation'" }
                    },
                    "required": ["slot_id", "service_type"]
                }
            }),
            json!({
                "name": "list_my_appointments",
                "description": "List the current patient's appointments.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "filter": { "type": "string", "enum": ["upcoming", "past", "all"], "description": "Which appointments to show (default all)" },
                        "status": { "type": "string", "description": "Comma separated statuses: scheduled, confirmed, cancelled, completed" }
                    }
                }
            }),
            json!({
                "name": "cancel_appointment",
                "description": "Cancel one of the current patient's scheduled or confirmed appointments. Only call after the patient has confirmed.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "appointment_id": { "type": "string", "description": "Appointment id returned by list_my_appointments or book_slot" }
                    },
                    "required": ["appointment_id"]
                }
            }),
        ]
    }
}

// ==============================================================================
// EXECUTION
// ==============================================================================

/// Successful result of one tool call.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Doctors(Vec<DoctorWithSlots>),
    Slots(Vec<AvailabilitySlot>),
    Booked(Appointment),
    Appointments(Vec<AppointmentDetails>),
    Cancelled(Appointment),
}

impl ToolOutcome {
    pub fn payload(&self) -> Value {
        match self {
            ToolOutcome::Doctors(doctors) => json!(doctors),
            ToolOutcome::Slots(slots) => json!(slots),
            ToolOutcome::Booked(appointment) | ToolOutcome::Cancelled(appointment) => json!(appointment),
            ToolOutcome::Appointments(appointments) => json!(appointments),
        }
    }

    /// Stores the payload under its key; an earlier payload of the same kind is replaced.
    pub fn record(self, results: &mut ToolResults) {
        match self {
            ToolOutcome::Doctors(doctors) => results.doctors = Some(doctors),
            ToolOutcome::Slots(slots) => results.slots = Some(slots),
            ToolOutcome::Booked(appointment) => results.created_appointment = Some(appointment),
            ToolOutcome::Appointments(appointments) => results.appointments = Some(appointments),
            ToolOutcome::Cancelled(appointment) => results.updated_appointment = Some(appointment),
        }
    }
}

/// Runs tool calls against the booking services on behalf of one caller.
#[derive(Clone)]
pub struct ToolExecutor {
    doctors: DoctorService,
    availability: AvailabilityService,
    booking: AppointmentBookingService,
}

impl ToolExecutor {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_services(
            DoctorService::new(config),
            AvailabilityService::new(config),
            AppointmentBookingService::new(config),
        )
    }

    pub fn with_services(
        doctors: DoctorService,
        availability: AvailabilityService,
        booking: AppointmentBookingService,
    ) -> Self {
        Self { doctors, availability, booking }
    }

    pub async fn execute(&self, caller: &Caller, call: &FunctionCall) -> Result<ToolOutcome, ToolError> {
        let tool = BookingTool::from_call(call)?;
        debug!("Executing {:?} for {}", tool, caller.id);
        self.run(caller, tool).await
    }

    async fn run(&self, caller: &Caller, tool: BookingTool) -> Result<ToolOutcome, ToolError> {
        match tool {
            BookingTool::FindDoctors(args) => {
                let terms = expand_specialty_query(&args.query);
                let limit = args.limit.unwrap_or(DEFAULT_DOCTOR_RESULTS).clamp(1, MAX_DOCTOR_RESULTS);
                let doctors = self.doctors.search_doctors(&terms, Some(limit)).await?;
                Ok(ToolOutcome::Doctors(doctors))
            }
            BookingTool::FindAvailableSlots(args) => {
                let days = args.days_ahead.unwrap_or(DEFAULT_DAYS_AHEAD).clamp(1, MAX_DAYS_AHEAD);
                let limit = args.limit.unwrap_or(DEFAULT_SLOT_RESULTS).clamp(1, MAX_SLOT_RESULTS);
                let slots = self.availability.find_open_slots(args.doctor_id, Some(days), Some(limit)).await?;
                Ok(ToolOutcome::Slots(slots))
            }
            BookingTool::BookSlot(args) => {
                let appointment = self.booking.book_slot(args.slot_id, caller.id, &args.service_type).await?;
                info!("Assistant booked appointment {} for {}", appointment.id, caller.id);
                Ok(ToolOutcome::Booked(appointment))
            }
            BookingTool::ListMyAppointments(args) => {
                let filter = AppointmentFilter::parse(args.filter.as_deref(), args.status.as_deref())?;
                let appointments = self.booking.list_appointments_for(caller, &filter).await?;
                Ok(ToolOutcome::Appointments(appointments))
            }
            BookingTool::CancelAppointment(args) => {
                let appointment = self.booking.cancel_appointment(args.appointment_id, caller).await?;
                info!("Assistant cancelled appointment {} for {}", appointment.id, caller.id);
                Ok(ToolOutcome::Cancelled(appointment))
            }
        }
    }
}

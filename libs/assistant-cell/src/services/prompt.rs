use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use tracing::{info, warn};

const FALLBACK_TEMPLATE: &str = "You are a friendly clinic booking assistant talking to {{patient_name}}. \
Today is {{today}}. Use the provided tools to find doctors, show open slots, book, list and cancel \
appointments for this patient only. Never invent doctors, slots or appointment ids; only use ids \
returned by the tools. Ask for confirmation before booking or cancelling. If you offer general care \
guidance, wrap it in [ADVICE_START] and [ADVICE_END].";

static TEMPLATE: OnceLock<String> = OnceLock::new();

/// Reads the template file, falling back to the built-in instruction.
pub fn load_template(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => {
            info!("Loaded assistant prompt from {}", path.display());
            contents
        }
        Ok(_) => {
            warn!("Assistant prompt {} is empty; using built-in prompt", path.display());
            FALLBACK_TEMPLATE.to_string()
        }
        Err(e) => {
            warn!("Could not read assistant prompt {}: {}; using built-in prompt", path.display(), e);
            FALLBACK_TEMPLATE.to_string()
        }
    }
}

/// The process-wide template. The first caller's path wins; later calls reuse it.
pub fn template(path: &str) -> &'static str {
    TEMPLATE.get_or_init(|| load_template(path))
}

pub fn render(template: &str, patient_name: &str, today: NaiveDate) -> String {
    template
        .replace("{{patient_name}}", patient_name)
        .replace("{{today}}", &today.format("%A, %B %-d, %Y").to_string())
}

pub fn system_instruction(path: &str, patient_name: &str, today: NaiveDate) -> String {
    render(template(path), patient_name, today)
}

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

pub const ADVICE_START: &str = "[ADVICE_START]";
pub const ADVICE_END: &str = "[ADVICE_END]";

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid whitespace pattern"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank line pattern"));

/// Collapse runs of spaces and tabs, squeeze three or more newlines into one
/// blank line and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Lifts a single `[ADVICE_START]...[ADVICE_END]` span out of the reply.
///
/// Returns the remaining text and the advice. Missing, reversed or half-open
/// markers leave the text as it was apart from whitespace normalisation.
pub fn extract_advice(text: &str) -> (String, Option<String>) {
    let start = text.find(ADVICE_START);
    // A stray end marker ahead of the span does not close it.
    let end = match start {
        Some(start) => text[start..].find(ADVICE_END).map(|offset| start + offset),
        None => text.find(ADVICE_END),
    };

    match (start, end) {
        (Some(start), Some(end)) => {
            let advice = normalize_whitespace(&text[start + ADVICE_START.len()..end]);
            let remaining = format!("{} {}", &text[..start], &text[end + ADVICE_END.len()..]);
            let advice = (!advice.is_empty()).then_some(advice);
            (normalize_whitespace(&remaining), advice)
        }
        (None, None) => (normalize_whitespace(text), None),
        _ => {
            warn!("Ignoring malformed advice markers in model reply (start: {:?}, end: {:?})", start, end);
            (normalize_whitespace(text), None)
        }
    }
}

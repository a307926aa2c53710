//! Response Normalizer
//!
//! Turns whatever text a backend produced into a [`StructuredResponse`].
//! Models are asked for bare JSON but routinely wrap it in Markdown fences,
//! prepend prose, or forget a field. [`normalize`] tolerates the first two and
//! falls back to a fixed educational record for everything else, so callers
//! always get a schema-valid value.
//!
//! Degradation is data, not an error: the caller learns about it through
//! [`Normalized::Fallback`] and the `note`/`rawResponse` fields.

use serde_json::Value;

use crate::response::StructuredResponse;

/// Diagnostic flag attached to every fallback record
pub const FALLBACK_NOTE: &str =
    "AI response was not in expected JSON format - using fallback structure";

/// Required top-level keys, in the order they are checked
const REQUIRED_FIELDS: [&str; 4] = ["conditions", "nextSteps", "urgentCare", "disclaimer"];

/// Characters of raw text included in fallback log lines
const LOG_PREVIEW_CHARS: usize = 200;

/// Why a reply could not be used as-is
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// No `{ ... }` span in the cleaned text
    NoJsonObject,
    /// The span did not parse, or a field had an illegal shape
    Malformed(String),
    /// A required field was absent, null or blank
    MissingField(&'static str),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoJsonObject => write!(f, "no JSON object found"),
            Self::Malformed(e) => write!(f, "malformed JSON: {e}"),
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
        }
    }
}

/// Outcome of normalization
#[derive(Clone, Debug, PartialEq)]
pub enum Normalized {
    /// The reply was valid and is returned verbatim
    Parsed(StructuredResponse),
    /// The reply was unusable; `response` is the fixed fallback record
    Fallback {
        /// Fallback record carrying the raw text
        response: StructuredResponse,
        /// What was wrong with the reply
        reason: FallbackReason,
    },
}

impl Normalized {
    /// The structured record, whichever path produced it
    #[must_use]
    pub fn into_response(self) -> StructuredResponse {
        match self {
            Self::Parsed(response) | Self::Fallback { response, .. } => response,
        }
    }

    /// Borrow the structured record
    #[must_use]
    pub fn response(&self) -> &StructuredResponse {
        match self {
            Self::Parsed(response) | Self::Fallback { response, .. } => response,
        }
    }

    /// Whether the fallback record was used
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Normalize raw backend text into a structured record
///
/// Never fails. See the module docs for the accepted shapes.
#[must_use]
pub fn normalize(raw: &str) -> Normalized {
    match try_parse(raw) {
        Ok(response) => Normalized::Parsed(response),
        Err(reason) => {
            tracing::warn!(
                reason = %reason,
                raw_preview = %preview(raw, LOG_PREVIEW_CHARS),
                "Backend reply not usable, using fallback structure"
            );
            Normalized::Fallback {
                response: fallback_response(raw),
                reason,
            }
        }
    }
}

fn try_parse(raw: &str) -> Result<StructuredResponse, FallbackReason> {
    let cleaned = strip_fences(raw.trim());
    let candidate = json_object_span(&cleaned).ok_or(FallbackReason::NoJsonObject)?;

    let value: Value =
        serde_json::from_str(candidate).map_err(|e| FallbackReason::Malformed(e.to_string()))?;
    let object = value.as_object().ok_or(FallbackReason::NoJsonObject)?;

    for field in REQUIRED_FIELDS {
        if object.get(field).map_or(true, Value::is_null) {
            return Err(FallbackReason::MissingField(field));
        }
    }

    let response: StructuredResponse =
        serde_json::from_value(value).map_err(|e| FallbackReason::Malformed(e.to_string()))?;

    match response.first_blank_field() {
        Some(field) => Err(FallbackReason::MissingField(field)),
        None => Ok(response),
    }
}

/// Remove Markdown code fences
///
/// Every "```" (optionally followed by `json`) is dropped together with the
/// whitespace after it.
#[must_use]
pub fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        rest = rest.strip_prefix("json").unwrap_or(rest);
        rest = rest.trim_start();
    }
    out.push_str(rest);

    out
}

/// Slice from the first `{` to the last `}`, if they are in that order
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// The fixed record used when a reply cannot be parsed
///
/// Deterministic apart from `rawResponse`, which carries `raw` untouched.
#[must_use]
pub fn fallback_response(raw: &str) -> StructuredResponse {
    let mut response = StructuredResponse::new(
        vec![
            "Based on the symptoms described, several conditions could be possible",
            "Professional medical evaluation is recommended for accurate diagnosis",
        ],
        vec![
            "Monitor symptoms closely",
            "Stay hydrated and rest",
            "Consult with a healthcare professional for proper evaluation",
            "Keep track of any changes in symptoms",
        ],
        vec![
            "Seek immediate medical attention if symptoms worsen rapidly",
            "Contact emergency services for severe or life-threatening symptoms",
            "Don't delay seeking help if you feel seriously unwell",
        ],
        "This is for educational purposes only. Always consult qualified healthcare \
         professionals for medical advice, diagnosis, or treatment.",
    );
    response.raw_response = Some(raw.to_string());
    response.note = Some(FALLBACK_NOTE.to_string());
    response
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

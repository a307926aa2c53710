//! Structured Response Schema
//!
//! The four-field shape every analysis is coerced into before it is stored or
//! returned: `conditions`, `nextSteps`, `urgentCare` and `disclaimer`, plus the
//! diagnostic `rawResponse`/`note` pair that only appears on fallback records.
//!
//! Guidance fields legally arrive either as a list of strings or as a single
//! string. Both shapes are kept as-is; consumers use [`Guidance::items`] when
//! they need a uniform view.
//!
//! `rawResponse` and `note` are only typed when they hold strings. Any other
//! value under those keys, `null` included, is kept in `extra` so a reply
//! round-trips unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One guidance field: a list of entries or a single free-text entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Guidance {
    /// Sequence of entries
    List(Vec<String>),
    /// Single entry
    Text(String),
}

impl Guidance {
    /// Entries as a uniform slice-like view
    #[must_use]
    pub fn items(&self) -> Vec<&str> {
        match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Text(text) => vec![text.as_str()],
        }
    }

    /// Whether this is a single empty string
    ///
    /// An empty list is a legitimate (if unhelpful) answer; an empty string
    /// is not.
    #[must_use]
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }
}

impl From<Vec<&str>> for Guidance {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(String::from).collect())
    }
}

impl From<&str> for Guidance {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Keys decoded leniently: typed only when they hold a string
const LENIENT_FIELDS: [&str; 2] = ["rawResponse", "note"];

/// Normalized analysis record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Map<String, Value>")]
pub struct StructuredResponse {
    /// Possible conditions, for education only
    pub conditions: Guidance,

    /// Recommended next steps
    pub next_steps: Guidance,

    /// When to seek immediate care
    pub urgent_care: Guidance,

    /// Medical disclaimer
    pub disclaimer: String,

    /// Original backend text, only present on fallback records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,

    /// Diagnostic flag, only present on fallback records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Any other top-level fields the backend emitted, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Field-for-field decode target behind [`StructuredResponse`]'s
/// `Deserialize`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    conditions: Guidance,
    next_steps: Guidance,
    urgent_care: Guidance,
    disclaimer: String,
    #[serde(default)]
    raw_response: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for StructuredResponse {
    type Error = serde_json::Error;

    fn try_from(mut object: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut untyped = Map::new();
        for key in LENIENT_FIELDS {
            if object.get(key).is_some_and(|v| !v.is_string()) {
                if let Some(value) = object.remove(key) {
                    untyped.insert(key.to_string(), value);
                }
            }
        }

        let wire: WireResponse = serde_json::from_value(Value::Object(object))?;
        let mut extra = wire.extra;
        extra.extend(untyped);

        Ok(Self {
            conditions: wire.conditions,
            next_steps: wire.next_steps,
            urgent_care: wire.urgent_care,
            disclaimer: wire.disclaimer,
            raw_response: wire.raw_response,
            note: wire.note,
            extra,
        })
    }
}

impl StructuredResponse {
    /// Create a record with the four required fields
    pub fn new(
        conditions: impl Into<Guidance>,
        next_steps: impl Into<Guidance>,
        urgent_care: impl Into<Guidance>,
        disclaimer: impl Into<String>,
    ) -> Self {
        Self {
            conditions: conditions.into(),
            next_steps: next_steps.into(),
            urgent_care: urgent_care.into(),
            disclaimer: disclaimer.into(),
            raw_response: None,
            note: None,
            extra: Map::new(),
        }
    }

    /// Required fields that carry no content
    ///
    /// Returns the wire name of the first offending field, if any.
    #[must_use]
    pub fn first_blank_field(&self) -> Option<&'static str> {
        if self.conditions.is_blank_text() {
            Some("conditions")
        } else if self.next_steps.is_blank_text() {
            Some("nextSteps")
        } else if self.urgent_care.is_blank_text() {
            Some("urgentCare")
        } else if self.disclaimer.is_empty() {
            Some("disclaimer")
        } else {
            None
        }
    }
}

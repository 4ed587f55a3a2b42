//! Field resolution — filling known values and finding missing inputs.
//!
//! Two primitives composed by the orchestrator:
//! - `fill_known_fields` pushes everything in the session context onto the
//!   page, best-effort, via the label-synonym table;
//! - `find_missing_fields` asks the page for required inputs that are
//!   still empty.
//!
//! Neither touches orchestration state.

pub mod synonyms;

pub use synonyms::{synonyms_for, FIELD_SYNONYMS, NUMERIC_LABEL_HINTS};

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::browser::BrowserDriver;
use crate::error::BrowserError;

/// One required input still missing from the current page.
///
/// Recomputed every advance cycle from live page state; only embedded in
/// the session snapshot, never stored standalone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRequest {
    /// Normalized identifier derived from label/placeholder/name.
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    /// Human-readable prompt to ask the session owner.
    pub question: String,
}

/// Lowercase and collapse non-alphanumeric runs to `_`.
pub fn normalize_key(raw: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
    re.replace_all(&raw.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Raw field shape returned by the page extractor.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawField {
    #[serde(default)]
    label: String,
    #[serde(default)]
    placeholder: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    field_type: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    value: String,
}

impl RawField {
    /// Best human-readable handle for this field.
    fn display_label(&self) -> &str {
        for candidate in [&self.label, &self.placeholder, &self.name] {
            if !candidate.is_empty() {
                return candidate;
            }
        }
        "this field"
    }

    fn into_request(self) -> FieldRequest {
        let key = normalize_key(self.display_label());
        let question = if self.question.is_empty() {
            format!("What should I enter for \"{}\"?", self.display_label())
        } else {
            self.question.clone()
        };
        FieldRequest {
            key,
            label: self.label,
            placeholder: self.placeholder,
            name: self.name,
            field_type: self.field_type,
            question,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExtractedFields {
    #[serde(default)]
    fields: Vec<RawField>,
}

/// Check whether `value` may be applied to a field labeled `label`.
///
/// Two misuse guards: an email-shaped value only goes into email fields,
/// and a value with no digits never goes into fields whose label suggests
/// a numeric identifier.
fn value_applies(value: &str, label: &str) -> bool {
    let label_lower = label.to_lowercase();

    if value.contains('@') && !label_lower.contains("email") {
        return false;
    }

    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    if !has_digit
        && NUMERIC_LABEL_HINTS
            .iter()
            .any(|hint| label_lower.contains(hint))
    {
        return false;
    }

    true
}

/// Resolves fields against one live page.
pub struct FieldResolver<'a> {
    driver: &'a dyn BrowserDriver,
}

impl<'a> FieldResolver<'a> {
    pub fn new(driver: &'a dyn BrowserDriver) -> Self {
        Self { driver }
    }

    /// Push every known context value onto the page.
    ///
    /// Best-effort by design: failing to find a field is the normal case,
    /// not an exception, so individual fill failures are logged and
    /// swallowed. Progress is judged by `find_missing_fields` afterwards.
    pub async fn fill_known_fields(&self, context: &HashMap<String, String>) {
        for (key, value) in context {
            if value.trim().is_empty() {
                continue;
            }

            let fallback = [key.replace('_', " ")];
            let labels: Vec<&str> = match synonyms_for(key) {
                Some(syns) => syns.to_vec(),
                None => fallback.iter().map(String::as_str).collect(),
            };

            let mut variables = HashMap::new();
            variables.insert("value".to_string(), value.clone());

            for label in labels {
                if !value_applies(value, label) {
                    continue;
                }
                let instruction =
                    format!("fill the form field labeled \"{label}\" with the value %value%");
                match self.driver.act(&instruction, &variables).await {
                    Ok(()) => {
                        tracing::debug!(key = %key, label = %label, "Filled field");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(key = %key, label = %label, "Fill attempt failed: {e}");
                    }
                }
            }
        }
    }

    /// Ask the page for required inputs that are still empty.
    ///
    /// The page is authoritative: a context value whose fill didn't stick
    /// leaves its field empty and comes back here, which is what lets the
    /// orchestrator notice and re-ask.
    pub async fn find_missing_fields(&self) -> Result<Vec<FieldRequest>, BrowserError> {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "fields": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "label": { "type": "string" },
                            "placeholder": { "type": "string" },
                            "name": { "type": "string" },
                            "type": { "type": "string" },
                            "question": { "type": "string" },
                            "value": { "type": "string" }
                        }
                    }
                }
            },
            "required": ["fields"]
        });

        let raw = self
            .driver
            .extract(
                "List every required form input that is currently empty or invalid, \
                 in page order. Include the visible label, placeholder, name attribute, \
                 input type, current value, and a short question a person could answer \
                 to fill it.",
                &schema,
            )
            .await?;

        let extracted: ExtractedFields =
            serde_json::from_value(raw).map_err(|e| BrowserError::Extraction {
                reason: format!("malformed field list: {e}"),
            })?;

        let requests = extracted
            .fields
            .into_iter()
            .filter(|f| f.value.trim().is_empty())
            .map(RawField::into_request)
            .filter(|r| !r.key.is_empty())
            .collect();

        Ok(requests)
    }
}

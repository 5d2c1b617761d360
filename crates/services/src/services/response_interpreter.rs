//! Turns raw model replies into catalog suggestions.
//!
//! The structured path never fails: replies that cannot be parsed or that miss
//! required keys degrade to a generic suggestion flagged as [`ResultSource::Fallback`].

use std::sync::{Arc, LazyLock};

use db::models::catalog_item::{EnrichmentPatch, normalize_tags};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use utils::text::{preview, truncate_chars};

use super::{
    analysis_history::AnalysisHistory,
    garment_prompts::ItemInfo,
    garment_vocabulary::{DEFAULT_TAG, Vocabulary},
};

pub const FALLBACK_NAME: &str = "Prenda sin nombre";
pub const FALLBACK_BRAND: &str = "Sin marca";
pub const FALLBACK_NOTES: &str =
    "Análisis automático no disponible. Revisa y completa los datos manualmente.";
pub const FALLBACK_METADATA_CHARS: usize = 500;
pub const DESCRIPTION_MAX_CHARS: usize = 1200;
pub const DEFAULT_CONFIDENCE: u8 = 5;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Whether a result came from the model's reply or from the fallback defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    #[default]
    Parsed,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub color: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggested_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
}

/// Model self-assessment, each score 1..=10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Confidence {
    #[serde(default = "default_score", deserialize_with = "score")]
    pub category: u8,
    #[serde(default = "default_score", deserialize_with = "score")]
    pub color: u8,
    #[serde(default = "default_score", deserialize_with = "score")]
    pub overall: u8,
}

impl Default for Confidence {
    fn default() -> Self {
        Self {
            category: DEFAULT_CONFIDENCE,
            color: DEFAULT_CONFIDENCE,
            overall: DEFAULT_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub form_data: FormData,
    pub ai_metadata: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: Confidence,
    #[serde(default)]
    pub source: ResultSource,
}

impl EnrichmentResult {
    pub fn is_fallback(&self) -> bool {
        self.source == ResultSource::Fallback
    }

    /// Fields to merge into a stored item. Placeholder fields of a fallback result are
    /// left blank so they never overwrite real data; `ai_metadata` is always carried.
    pub fn to_patch(&self) -> EnrichmentPatch {
        if self.is_fallback() {
            return EnrichmentPatch {
                ai_metadata: self.ai_metadata.clone(),
                ..EnrichmentPatch::default()
            };
        }
        EnrichmentPatch {
            name: self.form_data.name.clone(),
            category: self.form_data.category.clone(),
            color: self.form_data.color.clone(),
            brand: self.form_data.brand.clone(),
            notes: self.form_data.notes.clone(),
            tags: self.form_data.suggested_tags.clone(),
            ai_metadata: self.ai_metadata.clone(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_score() -> u8 {
    DEFAULT_CONFIDENCE
}

/// Accept integers, floats or numeric strings; clamp to 1..=10, anything else is 5
fn score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let number = value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });
    Ok(number
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(1.0, 10.0) as u8)
        .unwrap_or(DEFAULT_CONFIDENCE))
}

#[derive(Debug, Error)]
enum InterpretError {
    #[error("no JSON object in reply")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing or mistyped `{0}`")]
    MissingField(&'static str),
}

/// Locate the JSON payload: a fenced block if present, otherwise everything from the
/// first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(block) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return Some(block.as_str());
    }
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

fn parse_structured(raw: &str) -> Result<EnrichmentResult, InterpretError> {
    let json = extract_json_object(raw).ok_or(InterpretError::NoJsonObject)?;
    let value: Value = serde_json::from_str(json)?;

    if !value.get("formData").is_some_and(Value::is_object) {
        return Err(InterpretError::MissingField("formData"));
    }
    if !value.get("aiMetadata").is_some_and(Value::is_string) {
        return Err(InterpretError::MissingField("aiMetadata"));
    }

    let mut result: EnrichmentResult = serde_json::from_value(value)?;
    result.source = ResultSource::Parsed;
    Ok(result)
}

/// Replace out-of-vocabulary category/color with the defaults and drop unknown tags
fn enforce_vocabulary(mut result: EnrichmentResult, vocabulary: &Vocabulary) -> EnrichmentResult {
    let form = &mut result.form_data;

    match vocabulary.canonical_category(&form.category) {
        Some(category) => form.category = category.to_string(),
        None => {
            warn!(
                category = %form.category,
                "Model suggested a category outside the vocabulary, using default"
            );
            form.category = vocabulary.default_category().to_string();
            result.confidence.category = DEFAULT_CONFIDENCE;
        }
    }

    match vocabulary.canonical_color(&form.color) {
        Some(color) => form.color = color.to_string(),
        None => {
            warn!(
                color = %form.color,
                "Model suggested a color outside the vocabulary, using default"
            );
            form.color = vocabulary.default_color().to_string();
            result.confidence.color = DEFAULT_CONFIDENCE;
        }
    }

    let tags = form.suggested_tags.iter().filter_map(|tag| {
        vocabulary
            .tags
            .iter()
            .find(|allowed| allowed.to_lowercase() == tag.trim().to_lowercase())
    });
    form.suggested_tags = normalize_tags(tags);

    result
}

/// Generic suggestion used whenever the reply cannot be interpreted
pub fn fallback_result(
    raw: &str,
    vocabulary: &Vocabulary,
    item_info: Option<&ItemInfo>,
) -> EnrichmentResult {
    EnrichmentResult {
        form_data: FormData {
            name: item_info
                .and_then(ItemInfo::known_name)
                .unwrap_or(FALLBACK_NAME)
                .to_string(),
            category: vocabulary.default_category().to_string(),
            color: vocabulary.default_color().to_string(),
            brand: FALLBACK_BRAND.to_string(),
            suggested_tags: vec![DEFAULT_TAG.to_string()],
            notes: FALLBACK_NOTES.to_string(),
        },
        ai_metadata: truncate_chars(raw, FALLBACK_METADATA_CHARS).to_string(),
        confidence: Confidence::default(),
        source: ResultSource::Fallback,
    }
}

pub struct ResponseInterpreter {
    history: Arc<AnalysisHistory>,
}

impl ResponseInterpreter {
    pub fn new(history: Arc<AnalysisHistory>) -> Self {
        Self { history }
    }

    pub fn history(&self) -> &AnalysisHistory {
        &self.history
    }

    /// Structured path. Always returns a result and always records one history entry.
    pub fn interpret_analysis(
        &self,
        raw: &str,
        vocabulary: &Vocabulary,
        item_info: Option<&ItemInfo>,
    ) -> EnrichmentResult {
        let result = match parse_structured(raw) {
            Ok(parsed) => {
                debug!(overall = parsed.confidence.overall, "Parsed structured analysis");
                enforce_vocabulary(parsed, vocabulary)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    reply_preview = %preview(raw, 200),
                    "Could not interpret model reply, returning fallback suggestion"
                );
                fallback_result(raw, vocabulary, item_info)
            }
        };

        self.history
            .record(&result.form_data.name, &result.ai_metadata);
        result
    }

    /// Plain path: the reply itself, trimmed and capped
    pub fn interpret_description(&self, raw: &str, item_info: Option<&ItemInfo>) -> String {
        let description = truncate_chars(raw.trim(), DESCRIPTION_MAX_CHARS)
            .trim_end()
            .to_string();
        let name = item_info
            .and_then(ItemInfo::known_name)
            .unwrap_or(FALLBACK_NAME);
        self.history.record(name, &description);
        description
    }
}

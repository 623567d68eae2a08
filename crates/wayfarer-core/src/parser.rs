//! Extraction and structural validation of model responses.
//!
//! Models are asked for bare JSON but routinely wrap it in a fenced code
//! block or surround it with prose. `extract_json` recovers the object from
//! any of those shapes; `validate_plan_structure` then checks the decoded
//! value has the schedule layout the prompt demanded.

use serde_json::Value;
use thiserror::Error;

/// Maximum length of the response preview carried in extraction errors.
const PREVIEW_LEN: usize = 200;

/// Errors from extracting JSON out of a model response.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model response: {preview:?}")]
    NoJson { preview: String },

    #[error("model response is not valid JSON: {preview:?}")]
    Decode {
        preview: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from validating the decoded plan structure.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("response JSON is missing the {0:?} key")]
    MissingKey(&'static str),

    #[error("{0:?} must be an array")]
    NotAnArray(&'static str),

    #[error("schedules array is empty")]
    EmptySchedules,

    #[error("schedules[{index}] must be an object")]
    ScheduleNotAnObject { index: usize },

    #[error("schedules[{index}] is missing the {field:?} field")]
    ScheduleMissingField { index: usize, field: &'static str },

    #[error("schedules[{index}].timeline must be an array")]
    TimelineNotAnArray { index: usize },
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_LEN).collect()
}

/// Locate the JSON candidate within the response text.
///
/// Checked in order: a ```` ```json ```` fenced block, any ```` ``` ````
/// fenced block, then the span from the first `{` to the last `}`.
fn candidate(text: &str) -> Option<&str> {
    if let Some((_, rest)) = text.split_once("```json") {
        let inner = match rest.split_once("```") {
            Some((inner, _)) => inner,
            None => rest,
        };
        return Some(inner.trim());
    }
    if let Some((_, rest)) = text.split_once("```") {
        let inner = match rest.split_once("```") {
            Some((inner, _)) => inner,
            None => rest,
        };
        return Some(inner.trim());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].trim())
}

/// Extract and decode the JSON object from a model response.
///
/// Never panics; failures carry a preview of the offending text truncated
/// to [`PREVIEW_LEN`] characters.
pub fn extract_json(text: &str) -> Result<Value, ExtractError> {
    let candidate = candidate(text).ok_or_else(|| ExtractError::NoJson {
        preview: preview(text),
    })?;

    serde_json::from_str(candidate).map_err(|e| ExtractError::Decode {
        preview: preview(text),
        source: e,
    })
}

/// Check that a decoded response has the expected plan layout.
///
/// Requires a non-empty `schedules` array whose elements each carry `day`,
/// `date`, and an array `timeline`. Values are not range-checked here; the
/// typed deserialization in the generator does that.
pub fn validate_plan_structure(value: &Value) -> Result<(), StructureError> {
    let schedules = value
        .get("schedules")
        .ok_or(StructureError::MissingKey("schedules"))?;
    let schedules = schedules
        .as_array()
        .ok_or(StructureError::NotAnArray("schedules"))?;
    if schedules.is_empty() {
        return Err(StructureError::EmptySchedules);
    }

    for (index, entry) in schedules.iter().enumerate() {
        let obj = entry
            .as_object()
            .ok_or(StructureError::ScheduleNotAnObject { index })?;
        for field in ["day", "date"] {
            if !obj.contains_key(field) {
                return Err(StructureError::ScheduleMissingField { index, field });
            }
        }
        let timeline = obj
            .get("timeline")
            .ok_or(StructureError::ScheduleMissingField {
                index,
                field: "timeline",
            })?;
        if !timeline.is_array() {
            return Err(StructureError::TimelineNotAnArray { index });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

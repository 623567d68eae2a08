use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of timeline edit recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Update,
    Delete,
    Insert,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Insert => "insert",
        };
        f.write_str(s)
    }
}

impl FromStr for OperationKind {
    type Err = OperationKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "insert" => Ok(Self::Insert),
            other => Err(OperationKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`OperationKind`] string.
#[derive(Debug, Clone)]
pub struct OperationKindParseError(pub String);

impl fmt::Display for OperationKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid operation kind: {:?}", self.0)
    }
}

impl std::error::Error for OperationKindParseError {}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Trip parameters submitted by the caller.
///
/// Stored verbatim as the plan's `input_data` blob and embedded into the
/// generation prompt. Immutable once a plan is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelInput {
    pub origin: String,
    pub destination: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub start_date: String,
    /// Calendar date, `YYYY-MM-DD`. Must be after `start_date`.
    pub end_date: String,
    /// Total budget in whole currency units. Must be positive.
    pub budget: i64,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

/// Error returned when a [`TravelInput`] fails validation.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid {field} {value:?} (expected YYYY-MM-DD)")]
    BadDate { field: &'static str, value: String },

    #[error("start_date {start} must be before end_date {end}")]
    DateOrder { start: String, end: String },

    #[error("budget must be positive, got {0}")]
    NonPositiveBudget(i64),
}

impl TravelInput {
    /// Check all field-level constraints, returning the first violation.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.origin.trim().is_empty() {
            return Err(InputError::EmptyField("origin"));
        }
        if self.destination.trim().is_empty() {
            return Err(InputError::EmptyField("destination"));
        }
        if self.start_date.trim().is_empty() {
            return Err(InputError::EmptyField("start_date"));
        }
        if self.end_date.trim().is_empty() {
            return Err(InputError::EmptyField("end_date"));
        }
        let start = parse_input_date("start_date", &self.start_date)?;
        let end = parse_input_date("end_date", &self.end_date)?;
        if start >= end {
            return Err(InputError::DateOrder {
                start: self.start_date.clone(),
                end: self.end_date.clone(),
            });
        }
        if self.budget <= 0 {
            return Err(InputError::NonPositiveBudget(self.budget));
        }
        Ok(())
    }
}

fn parse_input_date(field: &'static str, value: &str) -> Result<NaiveDate, InputError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| InputError::BadDate {
        field,
        value: value.to_owned(),
    })
}

/// One activity within a day's schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineItem {
    /// Start time, `HH:MM` 24-hour.
    pub time: String,
    pub activity: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Cost in whole currency units.
    #[serde(default)]
    pub cost: i64,
    /// Duration in minutes.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Schedule for a single day of the trip.
///
/// `daily_cost` and `daily_duration` are the model's intended sums over the
/// timeline; they are stored as provided and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    /// 1-based day number.
    pub day: i32,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub timeline: Vec<TimelineItem>,
    #[serde(default)]
    pub daily_cost: i64,
    #[serde(default)]
    pub daily_duration: i64,
}

/// Generate a fresh client-visible plan id.
pub fn new_plan_id() -> String {
    Uuid::new_v4().to_string()
}

/// A complete travel plan as served by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelPlan {
    /// Client-visible identifier. Generated when absent from the payload.
    #[serde(default = "new_plan_id")]
    pub plan_id: String,
    pub input_data: TravelInput,
    #[serde(default)]
    pub schedules: Vec<DaySchedule>,
    #[serde(default)]
    pub total_cost: i64,
    #[serde(default)]
    pub total_duration: i64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A persisted travel plan row.
///
/// The JSONB blobs decode into typed structs here, at the storage boundary,
/// so a corrupt blob surfaces as a read error instead of failing later.
#[derive(Debug, Clone, FromRow)]
pub struct StoredPlan {
    pub id: Uuid,
    pub plan_id: String,
    pub input_data: Json<TravelInput>,
    pub schedules: Json<Vec<DaySchedule>>,
    pub total_cost: i64,
    pub total_duration: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredPlan> for TravelPlan {
    fn from(row: StoredPlan) -> Self {
        Self {
            plan_id: row.plan_id,
            input_data: row.input_data.0,
            schedules: row.schedules.0,
            total_cost: row.total_cost,
            total_duration: row.total_duration,
            created_at: row.created_at,
        }
    }
}

/// Listing shape for a plan: everything except the schedules blob.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlanSummary {
    pub plan_id: String,
    pub input_data: Json<TravelInput>,
    pub total_cost: i64,
    pub total_duration: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded timeline edit. Append-only.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HistoryRecord {
    pub id: Uuid,
    /// Client-visible plan id; the plan row may not exist yet.
    pub plan_id: String,
    pub day: i32,
    pub item_index: i32,
    pub operation: OperationKind,
    pub field_changed: Option<String>,
    pub original_data: Option<Value>,
    pub updated_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

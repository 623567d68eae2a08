//! Plan generation pipeline: validated input in, persisted-ready plan out.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use wayfarer_db::models::{new_plan_id, DaySchedule, InputError, TravelInput, TravelPlan};

use crate::apilog;
use crate::model::{GenerationParams, ModelClient, ModelError};
use crate::parser::{validate_plan_structure, StructureError};
use crate::prompt::{build_travel_prompt, PromptError};

/// Sampling temperature for plan generation.
const TEMPERATURE: f32 = 0.7;

/// Output token ceiling for plan generation.
const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Errors from a generation attempt.
///
/// `Input` and `Prompt` are caller mistakes; everything else means the
/// model failed to produce a usable plan.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("model output did not match the plan shape: {0}")]
    Shape(#[from] serde_json::Error),
}

impl GenerateError {
    /// True when the failure lies with the model service rather than the
    /// caller's input.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            GenerateError::Model(_) | GenerateError::Structure(_) | GenerateError::Shape(_)
        )
    }

    /// True when the model API rejected the call for quota reasons.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerateError::Model(e) if e.is_rate_limited())
    }
}

/// The model's answer, before it is stamped with identity and timestamps.
#[derive(Debug, Deserialize)]
struct GeneratedPlan {
    schedules: Vec<DaySchedule>,
    #[serde(default)]
    total_cost: i64,
    #[serde(default)]
    total_duration: i64,
}

/// Turns trip parameters into a full travel plan via a model client.
///
/// Each call is a single model attempt; the caller decides whether a
/// failed generation is worth retrying.
pub struct PlanGenerator {
    model: Arc<dyn ModelClient>,
    log_dir: Option<PathBuf>,
}

impl PlanGenerator {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            log_dir: None,
        }
    }

    /// Record every model exchange as a JSON file under `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Generate a travel plan for `input`.
    ///
    /// Validates the input, builds the prompt, asks the model for JSON,
    /// checks the structural contract, and assembles a [`TravelPlan`] with
    /// a fresh `plan_id`. The plan is not persisted here.
    pub async fn generate(&self, input: &TravelInput) -> Result<TravelPlan, GenerateError> {
        input.validate()?;

        let plan_id = new_plan_id();
        let prompt = build_travel_prompt(input)?;
        let params = GenerationParams {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        };

        let value = self.model.generate_json(&prompt, &params).await?;

        if let Some(dir) = &self.log_dir {
            // Logging must never fail a generation that already succeeded.
            if let Err(e) = apilog::write_call_log(dir, &plan_id, &prompt, &value) {
                warn!(plan_id = %plan_id, error = format!("{e:#}"), "failed to write model call log");
            }
        }

        validate_plan_structure(&value)?;
        let generated: GeneratedPlan = serde_json::from_value(value)?;

        Ok(TravelPlan {
            plan_id,
            input_data: input.clone(),
            schedules: generated.schedules,
            total_cost: generated.total_cost,
            total_duration: generated.total_duration,
            created_at: Utc::now(),
        })
    }

    /// Name of the model backing this generator.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedModel {
        body: String,
    }

    #[async_trait::async_trait]
    impl ModelClient for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, ModelError> {
            Ok(self.body.clone())
        }
    }

    struct RateLimitedModel;

    #[async_trait::async_trait]
    impl ModelClient for RateLimitedModel {
        fn name(&self) -> &str {
            "rate-limited"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, ModelError> {
            Err(ModelError::Api {
                status: 429,
                message: "quota exceeded".into(),
            })
        }
    }

    fn sample_input() -> TravelInput {
        TravelInput {
            origin: "Tokyo".into(),
            destination: "Kyoto".into(),
            start_date: "2025-01-01".into(),
            end_date: "2025-01-02".into(),
            budget: 100_000,
            interests: vec!["temples".into()],
            additional_notes: None,
        }
    }

    fn valid_plan_body() -> String {
        r#"Here is your plan:
```json
{
  "schedules": [
    {
      "day": 1,
      "date": "2025-01-01",
      "timeline": [
        {"time": "09:00", "activity": "Shinkansen to Kyoto", "cost": 13320, "duration": 140}
      ],
      "daily_cost": 13320,
      "daily_duration": 140
    },
    {
      "day": 2,
      "date": "2025-01-02",
      "timeline": [],
      "daily_cost": 0,
      "daily_duration": 0
    }
  ],
  "total_cost": 13320,
  "total_duration": 140
}
```"#
            .to_string()
    }

    fn generator(body: &str) -> PlanGenerator {
        PlanGenerator::new(Arc::new(CannedModel {
            body: body.to_string(),
        }))
    }

    #[tokio::test]
    async fn generates_a_plan_from_model_output() {
        let r#gen =generator(&valid_plan_body());
        let plan = r#gen.generate(&sample_input()).await.unwrap();

        assert!(!plan.plan_id.is_empty());
        assert_eq!(plan.input_data.destination, "Kyoto");
        assert_eq!(plan.schedules.len(), 2);
        assert_eq!(plan.schedules[0].timeline[0].activity, "Shinkansen to Kyoto");
        assert_eq!(plan.total_cost, 13_320);
        assert_eq!(plan.total_duration, 140);
    }

    #[tokio::test]
    async fn each_generation_gets_a_fresh_plan_id() {
        let r#gen =generator(&valid_plan_body());
        let first = r#gen.generate(&sample_input()).await.unwrap();
        let second = r#gen.generate(&sample_input()).await.unwrap();
        assert_ne!(first.plan_id, second.plan_id);
    }

    #[tokio::test]
    async fn invalid_input_fails_before_the_model_is_called() {
        let r#gen =generator("never parsed");
        let mut input = sample_input();
        input.destination = "  ".into();

        let err = r#gen.generate(&input).await.unwrap_err();
        assert!(matches!(err, GenerateError::Input(_)));
        assert!(!err.is_external());
    }

    #[tokio::test]
    async fn garbage_model_output_is_an_external_failure() {
        let r#gen =generator("I cannot help with that.");
        let err = r#gen.generate(&sample_input()).await.unwrap_err();
        assert!(matches!(err, GenerateError::Model(_)), "got: {err:?}");
        assert!(err.is_external());
    }

    #[tokio::test]
    async fn missing_schedules_is_an_external_failure() {
        let r#gen =generator(r#"{"plan": "looks nothing like a schedule"}"#);
        let err = r#gen.generate(&sample_input()).await.unwrap_err();
        assert!(matches!(err, GenerateError::Structure(_)), "got: {err:?}");
        assert!(err.is_external());
    }

    #[tokio::test]
    async fn wrong_field_types_are_an_external_failure() {
        // Structurally sound (schedules with day/date/timeline) but the
        // timeline entries do not deserialize.
        let body = r#"{"schedules": [{"day": 1, "date": "2025-01-01", "timeline": [{"time": 9}]}]}"#;
        let r#gen =generator(body);
        let err = r#gen.generate(&sample_input()).await.unwrap_err();
        assert!(matches!(err, GenerateError::Shape(_)), "got: {err:?}");
        assert!(err.is_external());
    }

    #[tokio::test]
    async fn rate_limit_is_reported_as_such() {
        let r#gen =PlanGenerator::new(Arc::new(RateLimitedModel));
        let err = r#gen.generate(&sample_input()).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.is_external());
    }

    #[tokio::test]
    async fn call_log_is_written_when_a_log_dir_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let r#gen =generator(&valid_plan_body()).with_log_dir(dir.path());

        let plan = r#gen.generate(&sample_input()).await.unwrap();

        let logs = apilog::list_call_logs(dir.path(), &plan.plan_id).unwrap();
        assert_eq!(logs.len(), 1);
    }
}

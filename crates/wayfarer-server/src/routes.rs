//! HTTP API for plan generation, storage, and weather lookups.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use wayfarer_core::generator::{GenerateError, PlanGenerator};
use wayfarer_core::weather::{WeatherClient, WeatherError, WeatherReport};
use wayfarer_db::error::StoreError;
use wayfarer_db::models::{HistoryRecord, OperationKind, PlanSummary, TravelInput, TravelPlan};
use wayfarer_db::pool;
use wayfarer_db::queries::{history, plans};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Shared state handed to every handler.
///
/// Built once at startup; no handler reaches for globals.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub generator: Arc<PlanGenerator>,
    pub weather: Arc<WeatherClient>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: format!("{:#}", anyhow::Error::new(err)),
        }
    }
}

impl From<GenerateError> for AppError {
    fn from(err: GenerateError) -> Self {
        if err.is_rate_limited() {
            return Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: format!("model rate limit exceeded, retry later: {err}"),
            };
        }
        if err.is_external() {
            return Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: format!("plan generation failed: {err}"),
            };
        }
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
        }
    }
}

impl From<WeatherError> for AppError {
    fn from(err: WeatherError) -> Self {
        let status = match err {
            WeatherError::UnknownLocation { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlanPageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EditHistoryQuery {
    limit: Option<i64>,
    day: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct RecordEditRequest {
    day: i32,
    item_index: i32,
    operation: OperationKind,
    #[serde(default)]
    field_changed: Option<String>,
    #[serde(default)]
    original_data: Option<serde_json::Value>,
    #[serde(default)]
    updated_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    location: String,
    days: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub message: String,
    pub data: SavedPlanId,
}

#[derive(Debug, Serialize)]
pub struct SavedPlanId {
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub success: bool,
    pub data: TravelPlan,
}

#[derive(Debug, Serialize)]
pub struct PlanListResponse {
    pub success: bool,
    pub data: Vec<PlanSummary>,
    pub count: usize,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub success: bool,
    pub data: Vec<HistoryRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct RecordEditResponse {
    pub success: bool,
    pub data: RecordedEdit,
}

#[derive(Debug, Serialize)]
pub struct RecordedEdit {
    pub history_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
    pub data: ClearedHistory,
}

#[derive(Debug, Serialize)]
pub struct ClearedHistory {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub data: StorageStatus,
}

#[derive(Debug, Serialize)]
pub struct StorageStatus {
    pub total_plans: i64,
    pub total_history_records: i64,
    pub database: DatabaseStatus,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub name: String,
    pub tables: Vec<TableStatus>,
}

#[derive(Debug, Serialize)]
pub struct TableStatus {
    pub name: String,
    pub rows: i64,
}

#[derive(Debug, Serialize)]
pub struct WeatherResponse {
    pub success: bool,
    pub data: WeatherReport,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/plans", post(generate_plan))
        .route("/api/storage/plans", post(save_plan_handler))
        .route("/api/storage/plans/history", get(list_plans_handler))
        .route(
            "/api/storage/plans/{plan_id}",
            get(get_plan_handler).delete(delete_plan_handler),
        )
        .route(
            "/api/storage/plans/{plan_id}/edit-history",
            get(get_edit_history)
                .post(record_edit_handler)
                .delete(clear_edit_history),
        )
        .route("/api/storage/status", get(storage_status))
        .route("/api/weather", get(weather_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("wayfarer serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("wayfarer serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "wayfarer API is running",
        status: "ok",
    })
}

async fn generate_plan(
    State(state): State<AppState>,
    Json(input): Json<TravelInput>,
) -> Result<Json<TravelPlan>, AppError> {
    let plan = state.generator.generate(&input).await?;
    tracing::info!(plan_id = %plan.plan_id, destination = %plan.input_data.destination, "plan generated");
    Ok(Json(plan))
}

/// Save a plan, updating it in place when the `plan_id` already exists.
async fn save_plan_handler(
    State(state): State<AppState>,
    Json(plan): Json<TravelPlan>,
) -> Result<Json<SaveResponse>, AppError> {
    match plans::get_plan(&state.pool, &plan.plan_id).await {
        Ok(_) => {
            plans::update_plan(&state.pool, &plan.plan_id, &plan).await?;
            Ok(Json(SaveResponse {
                success: true,
                message: "plan updated".to_string(),
                data: SavedPlanId {
                    plan_id: plan.plan_id,
                },
            }))
        }
        Err(err) if err.is_not_found() => {
            let plan_id = plans::save_plan(&state.pool, &plan).await?;
            Ok(Json(SaveResponse {
                success: true,
                message: "plan saved".to_string(),
                data: SavedPlanId { plan_id },
            }))
        }
        Err(err) => Err(err.into()),
    }
}

async fn list_plans_handler(
    State(state): State<AppState>,
    Query(page): Query<PlanPageQuery>,
) -> Result<Json<PlanListResponse>, AppError> {
    let limit = page.limit.unwrap_or(10);
    if !(1..=100).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 100"));
    }
    let offset = page.offset.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::bad_request("offset must not be negative"));
    }

    let data = plans::list_plans(&state.pool, limit, offset).await?;
    let total = plans::count_plans(&state.pool).await?;
    Ok(Json(PlanListResponse {
        success: true,
        count: data.len(),
        data,
        total,
    }))
}

async fn get_plan_handler(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanResponse>, AppError> {
    let stored = plans::get_plan(&state.pool, &plan_id).await?;
    Ok(Json(PlanResponse {
        success: true,
        data: stored.into(),
    }))
}

async fn delete_plan_handler(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    plans::delete_plan(&state.pool, &plan_id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("plan {plan_id} deleted"),
    }))
}

async fn get_edit_history(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
    Query(query): Query<EditHistoryQuery>,
) -> Result<Json<HistoryListResponse>, AppError> {
    let limit = query.limit.unwrap_or(50);
    if !(1..=500).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 500"));
    }

    // Listing history for a plan that was never saved is a 404; recording
    // history for one is allowed (the frontend records edits before saving).
    plans::get_plan(&state.pool, &plan_id).await?;

    let data = match query.day {
        Some(day) => {
            let mut records = history::get_history_by_day(&state.pool, &plan_id, day).await?;
            records.truncate(limit as usize);
            records
        }
        None => history::get_recent_history(&state.pool, &plan_id, limit).await?,
    };

    Ok(Json(HistoryListResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

async fn record_edit_handler(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
    Json(request): Json<RecordEditRequest>,
) -> Result<Json<RecordEditResponse>, AppError> {
    let edit = history::NewEdit {
        plan_id,
        day: request.day,
        item_index: request.item_index,
        operation: request.operation,
        field_changed: request.field_changed,
        original_data: request.original_data,
        updated_data: request.updated_data,
    };
    let record = history::record_edit(&state.pool, &edit).await?;
    Ok(Json(RecordEditResponse {
        success: true,
        data: RecordedEdit {
            history_id: record.id,
        },
    }))
}

async fn clear_edit_history(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<ClearHistoryResponse>, AppError> {
    let deleted = history::clear_history(&state.pool, &plan_id).await?;
    Ok(Json(ClearHistoryResponse {
        success: true,
        message: format!("edit history cleared for plan {plan_id}"),
        data: ClearedHistory { deleted },
    }))
}

async fn storage_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, AppError> {
    let total_plans = plans::count_plans(&state.pool).await?;
    let total_history_records = history::count_all_history(&state.pool).await?;
    let name = pool::current_database(&state.pool)
        .await
        .map_err(AppError::internal)?;
    let tables = pool::table_counts(&state.pool)
        .await
        .map_err(AppError::internal)?
        .into_iter()
        .map(|(name, rows)| TableStatus { name, rows })
        .collect();

    Ok(Json(StatusResponse {
        success: true,
        data: StorageStatus {
            total_plans,
            total_history_records,
            database: DatabaseStatus { name, tables },
        },
    }))
}

async fn weather_handler(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<WeatherResponse>, AppError> {
    let days = query.days.unwrap_or(7);
    if !(1..=wayfarer_core::weather::MAX_FORECAST_DAYS).contains(&days) {
        return Err(AppError::bad_request("days must be between 1 and 16"));
    }

    let report = state.weather.forecast_for_location(&query.location, days).await?;
    Ok(Json(WeatherResponse {
        success: true,
        data: report,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use wayfarer_core::generator::PlanGenerator;
    use wayfarer_core::model::GeminiClient;
    use wayfarer_core::weather::WeatherClient;
    use wayfarer_test_utils::{create_test_db, drop_test_db};

    use super::AppState;

    // -----------------------------------------------------------------------
    // State and HTTP helpers
    // -----------------------------------------------------------------------

    /// State whose model and weather clients point at unroutable defaults.
    /// Fine for storage-only tests, which never call them.
    fn test_state(pool: PgPool) -> AppState {
        let model = GeminiClient::new("test-key").unwrap();
        AppState {
            pool,
            generator: Arc::new(PlanGenerator::new(Arc::new(model))),
            weather: Arc::new(WeatherClient::new().unwrap()),
        }
    }

    fn mocked_model_state(pool: PgPool, server: &MockServer) -> AppState {
        let model = GeminiClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri())
            .with_timeout(Duration::from_secs(2));
        AppState {
            pool,
            generator: Arc::new(PlanGenerator::new(Arc::new(model))),
            weather: Arc::new(WeatherClient::new().unwrap()),
        }
    }

    fn mocked_weather_state(pool: PgPool, server: &MockServer) -> AppState {
        let base = server.uri();
        let weather = WeatherClient::new()
            .unwrap()
            .with_urls(format!("{base}/v1/forecast"), format!("{base}/v1/search"));
        let model = GeminiClient::new("test-key").unwrap();
        AppState {
            pool,
            generator: Arc::new(PlanGenerator::new(Arc::new(model))),
            weather: Arc::new(weather),
        }
    }

    async fn send_get(state: AppState, uri: &str) -> axum::response::Response {
        let app = super::build_router(state);
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn send_json(
        state: AppState,
        http_method: &str,
        uri: &str,
        body: &serde_json::Value,
    ) -> axum::response::Response {
        let app = super::build_router(state);
        app.oneshot(
            Request::builder()
                .method(http_method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn send_delete(state: AppState, uri: &str) -> axum::response::Response {
        let app = super::build_router(state);
        app.oneshot(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    fn plan_body(plan_id: &str) -> serde_json::Value {
        serde_json::json!({
            "plan_id": plan_id,
            "input_data": {
                "origin": "Tokyo",
                "destination": "Kyoto",
                "start_date": "2025-01-01",
                "end_date": "2025-01-05",
                "budget": 100000
            },
            "schedules": [{
                "day": 1,
                "date": "2025-01-01",
                "timeline": [{
                    "time": "09:00",
                    "activity": "Shinkansen to Kyoto",
                    "cost": 13320,
                    "duration": 140
                }],
                "daily_cost": 13320,
                "daily_duration": 140
            }],
            "total_cost": 13320,
            "total_duration": 140
        })
    }

    fn edit_body(day: i32) -> serde_json::Value {
        serde_json::json!({
            "day": day,
            "item_index": 0,
            "operation": "update",
            "field_changed": "cost",
            "original_data": {"cost": 1000},
            "updated_data": {"cost": 1200}
        })
    }

    fn gemini_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
    }

    fn valid_generated_plan() -> String {
        r#"```json
{
  "schedules": [
    {"day": 1, "date": "2025-01-01", "timeline": [
      {"time": "09:00", "activity": "Shinkansen to Kyoto", "cost": 13320, "duration": 140}
    ], "daily_cost": 13320, "daily_duration": 140},
    {"day": 2, "date": "2025-01-02", "timeline": [], "daily_cost": 0, "daily_duration": 0}
  ],
  "total_cost": 13320,
  "total_duration": 140
}
```"#
            .to_string()
    }

    fn trip_input() -> serde_json::Value {
        serde_json::json!({
            "origin": "Tokyo",
            "destination": "Kyoto",
            "start_date": "2025-01-01",
            "end_date": "2025-01-02",
            "budget": 100000,
            "interests": ["temples"]
        })
    }

    // -----------------------------------------------------------------------
    // Tests: health
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_health_reports_ok() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_get(test_state(pool.clone()), "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    // -----------------------------------------------------------------------
    // Tests: storage
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_save_then_get_roundtrip() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans",
            &plan_body("p1"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "plan saved");
        assert_eq!(json["data"]["plan_id"], "p1");

        let resp = send_get(test_state(pool.clone()), "/api/storage/plans/p1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["input_data"]["destination"], "Kyoto");
        assert_eq!(json["data"]["schedules"][0]["timeline"][0]["cost"], 13320);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_saving_twice_updates_in_place() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans",
            &plan_body("p1"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let mut updated = plan_body("p1");
        updated["total_cost"] = serde_json::json!(20000);
        let resp = send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans",
            &updated,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "plan updated");

        let resp = send_get(test_state(pool.clone()), "/api/storage/plans/p1").await;
        let json = body_json(resp).await;
        assert_eq!(json["data"]["total_cost"], 20000);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_get_unknown_plan_is_404() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_get(test_state(pool.clone()), "/api/storage/plans/ghost").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert!(
            json["error"].as_str().unwrap().contains("not found"),
            "unexpected body: {json}"
        );

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_plan_history_pages_newest_first() {
        let (pool, db_name) = create_test_db().await;

        for id in ["p1", "p2", "p3"] {
            let resp = send_json(
                test_state(pool.clone()),
                "POST",
                "/api/storage/plans",
                &plan_body(id),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let resp = send_get(
            test_state(pool.clone()),
            "/api/storage/plans/history?limit=2",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["total"], 3);
        assert_eq!(json["data"][0]["plan_id"], "p3");
        assert_eq!(json["data"][1]["plan_id"], "p2");

        let resp = send_get(
            test_state(pool.clone()),
            "/api/storage/plans/history?limit=2&offset=2",
        )
        .await;
        let json = body_json(resp).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["plan_id"], "p1");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_plan_history_rejects_out_of_range_limit() {
        let (pool, db_name) = create_test_db().await;

        for uri in [
            "/api/storage/plans/history?limit=0",
            "/api/storage/plans/history?limit=101",
            "/api/storage/plans/history?offset=-1",
        ] {
            let resp = send_get(test_state(pool.clone()), uri).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri: {uri}");
        }

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_delete_plan_then_404() {
        let (pool, db_name) = create_test_db().await;

        send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans",
            &plan_body("p1"),
        )
        .await;

        let resp = send_delete(test_state(pool.clone()), "/api/storage/plans/p1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);

        let resp = send_get(test_state(pool.clone()), "/api/storage/plans/p1").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send_delete(test_state(pool.clone()), "/api/storage/plans/p1").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    // -----------------------------------------------------------------------
    // Tests: edit history
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_edit_history_for_unknown_plan_is_404() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_get(
            test_state(pool.clone()),
            "/api/storage/plans/ghost/edit-history",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_record_then_list_edit_history() {
        let (pool, db_name) = create_test_db().await;

        send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans",
            &plan_body("p1"),
        )
        .await;

        let resp = send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans/p1/edit-history",
            &edit_body(1),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert!(json["data"]["history_id"].is_string());

        send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans/p1/edit-history",
            &edit_body(2),
        )
        .await;

        let resp = send_get(
            test_state(pool.clone()),
            "/api/storage/plans/p1/edit-history",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["data"][0]["operation"], "update");

        // Day filter narrows the result.
        let resp = send_get(
            test_state(pool.clone()),
            "/api/storage/plans/p1/edit-history?day=2",
        )
        .await;
        let json = body_json(resp).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["day"], 2);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_recording_edits_for_unsaved_plans_is_allowed() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans/not-saved-yet/edit-history",
            &edit_body(1),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_clear_edit_history_reports_deleted_count() {
        let (pool, db_name) = create_test_db().await;

        send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans",
            &plan_body("p1"),
        )
        .await;
        for day in [1, 2, 3] {
            send_json(
                test_state(pool.clone()),
                "POST",
                "/api/storage/plans/p1/edit-history",
                &edit_body(day),
            )
            .await;
        }

        let resp = send_delete(
            test_state(pool.clone()),
            "/api/storage/plans/p1/edit-history",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["deleted"], 3);

        let resp = send_get(
            test_state(pool.clone()),
            "/api/storage/plans/p1/edit-history",
        )
        .await;
        let json = body_json(resp).await;
        assert_eq!(json["count"], 0);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    // -----------------------------------------------------------------------
    // Tests: status
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_storage_status_reports_tables_and_counts() {
        let (pool, db_name) = create_test_db().await;

        send_json(
            test_state(pool.clone()),
            "POST",
            "/api/storage/plans",
            &plan_body("p1"),
        )
        .await;

        let resp = send_get(test_state(pool.clone()), "/api/storage/status").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["total_plans"], 1);
        assert_eq!(json["data"]["total_history_records"], 0);
        assert_eq!(json["data"]["database"]["name"], db_name);
        let tables: Vec<&str> = json["data"]["database"]["tables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(tables.contains(&"travel_plans"), "tables: {tables:?}");
        assert!(
            tables.contains(&"timeline_item_history"),
            "tables: {tables:?}"
        );

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    // -----------------------------------------------------------------------
    // Tests: generation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_generate_returns_a_plan() {
        let (pool, db_name) = create_test_db().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_response(&valid_generated_plan())),
            )
            .expect(1)
            .mount(&server)
            .await;

        let resp = send_json(
            mocked_model_state(pool.clone(), &server),
            "POST",
            "/api/plans",
            &trip_input(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(!json["plan_id"].as_str().unwrap().is_empty());
        assert_eq!(json["schedules"].as_array().unwrap().len(), 2);
        assert_eq!(json["total_cost"], 13320);
        assert_eq!(json["input_data"]["destination"], "Kyoto");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_generate_with_invalid_input_is_400() {
        let (pool, db_name) = create_test_db().await;

        let mut input = trip_input();
        input["destination"] = serde_json::json!("   ");
        let resp = send_json(test_state(pool.clone()), "POST", "/api/plans", &input).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_generate_model_garbage_is_503() {
        let (pool, db_name) = create_test_db().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_response("I cannot help with that.")),
            )
            .mount(&server)
            .await;

        let resp = send_json(
            mocked_model_state(pool.clone(), &server),
            "POST",
            "/api/plans",
            &trip_input(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_generate_rate_limit_is_503_with_hint() {
        let (pool, db_name) = create_test_db().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let resp = send_json(
            mocked_model_state(pool.clone(), &server),
            "POST",
            "/api/plans",
            &trip_input(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert!(
            json["error"].as_str().unwrap().contains("rate limit"),
            "unexpected body: {json}"
        );

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    // -----------------------------------------------------------------------
    // Tests: weather
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_weather_returns_forecast() {
        let (pool, db_name) = create_test_db().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"name": "Kyoto", "country": "Japan", "latitude": 35.0, "longitude": 135.75}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "latitude": 35.0,
                "longitude": 135.75,
                "timezone": "Asia/Tokyo",
                "daily": {
                    "time": ["2025-01-01"],
                    "weather_code": [0],
                    "temperature_2m_max": [9.4],
                    "temperature_2m_min": [1.2],
                    "precipitation_sum": [0.0]
                }
            })))
            .mount(&server)
            .await;

        let resp = send_get(
            mocked_weather_state(pool.clone(), &server),
            "/api/weather?location=Kyoto&days=1",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["location"]["name"], "Kyoto");
        assert_eq!(json["data"]["daily"][0]["description"], "clear sky");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_weather_unknown_location_is_400() {
        let (pool, db_name) = create_test_db().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let resp = send_get(
            mocked_weather_state(pool.clone(), &server),
            "/api/weather?location=Atlantis",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_weather_rejects_out_of_range_days() {
        let (pool, db_name) = create_test_db().await;

        let resp = send_get(
            test_state(pool.clone()),
            "/api/weather?location=Kyoto&days=0",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send_get(
            test_state(pool.clone()),
            "/api/weather?location=Kyoto&days=17",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}

//! Database query functions for the `timeline_item_history` table.

use serde_json::Value;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::{HistoryRecord, OperationKind};

/// Parameters for recording a new timeline edit.
///
/// There is deliberately no check that `plan_id` names a saved plan: the
/// frontend records edits against plans it has not persisted yet.
#[derive(Debug, Clone)]
pub struct NewEdit {
    pub plan_id: String,
    pub day: i32,
    pub item_index: i32,
    pub operation: OperationKind,
    pub field_changed: Option<String>,
    pub original_data: Option<Value>,
    pub updated_data: Option<Value>,
}

/// Insert a new history row. Returns the inserted row with
/// server-generated defaults (id, created_at).
pub async fn record_edit(pool: &PgPool, new: &NewEdit) -> Result<HistoryRecord, StoreError> {
    let record = sqlx::query_as::<_, HistoryRecord>(
        "INSERT INTO timeline_item_history \
         (plan_id, day, item_index, operation, field_changed, original_data, updated_data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(&new.plan_id)
    .bind(new.day)
    .bind(new.item_index)
    .bind(new.operation)
    .bind(&new.field_changed)
    .bind(&new.original_data)
    .bind(&new.updated_data)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::Database {
        context: format!(
            "failed to record {} edit for travel plan {}",
            new.operation, new.plan_id
        ),
        source: e,
    })?;

    Ok(record)
}

/// All history rows for a plan, newest first.
pub async fn get_history(pool: &PgPool, plan_id: &str) -> Result<Vec<HistoryRecord>, StoreError> {
    let records = sqlx::query_as::<_, HistoryRecord>(
        "SELECT * FROM timeline_item_history \
         WHERE plan_id = $1 \
         ORDER BY created_at DESC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::Database {
        context: format!("failed to fetch history for travel plan {plan_id}"),
        source: e,
    })?;

    Ok(records)
}

/// History rows for one day of a plan, newest first.
pub async fn get_history_by_day(
    pool: &PgPool,
    plan_id: &str,
    day: i32,
) -> Result<Vec<HistoryRecord>, StoreError> {
    let records = sqlx::query_as::<_, HistoryRecord>(
        "SELECT * FROM timeline_item_history \
         WHERE plan_id = $1 AND day = $2 \
         ORDER BY created_at DESC",
    )
    .bind(plan_id)
    .bind(day)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::Database {
        context: format!("failed to fetch day {day} history for travel plan {plan_id}"),
        source: e,
    })?;

    Ok(records)
}

/// The most recent history rows for a plan, newest first, at most `limit`.
pub async fn get_recent_history(
    pool: &PgPool,
    plan_id: &str,
    limit: i64,
) -> Result<Vec<HistoryRecord>, StoreError> {
    let records = sqlx::query_as::<_, HistoryRecord>(
        "SELECT * FROM timeline_item_history \
         WHERE plan_id = $1 \
         ORDER BY created_at DESC \
         LIMIT $2",
    )
    .bind(plan_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::Database {
        context: format!("failed to fetch recent history for travel plan {plan_id}"),
        source: e,
    })?;

    Ok(records)
}

/// Count history rows for one plan.
pub async fn count_history(pool: &PgPool, plan_id: &str) -> Result<i64, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM timeline_item_history WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_one(pool)
            .await
            .map_err(|e| StoreError::Database {
                context: format!("failed to count history for travel plan {plan_id}"),
                source: e,
            })?;

    Ok(count)
}

/// Count history rows across all plans.
pub async fn count_all_history(pool: &PgPool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM timeline_item_history")
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Database {
            context: "failed to count history records".into(),
            source: e,
        })?;

    Ok(count)
}

/// Delete all history rows for a plan. Returns the number deleted.
///
/// Deleting history for an unknown plan id is not an error; it deletes
/// zero rows.
pub async fn clear_history(pool: &PgPool, plan_id: &str) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM timeline_item_history WHERE plan_id = $1")
        .bind(plan_id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Database {
            context: format!("failed to clear history for travel plan {plan_id}"),
            source: e,
        })?;

    Ok(result.rows_affected())
}

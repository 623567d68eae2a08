//! Database query functions for the `travel_plans` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::error::StoreError;
use crate::models::{PlanSummary, StoredPlan, TravelPlan};

/// Insert a new plan row. Returns the stored plan id.
///
/// `created_at` and `updated_at` use the server clock, not whatever the
/// payload carried. A duplicate `plan_id` surfaces as `Database` (unique
/// constraint); callers that want upsert semantics check existence first.
pub async fn save_plan(pool: &PgPool, plan: &TravelPlan) -> Result<String, StoreError> {
    let plan_id: String = sqlx::query_scalar(
        "INSERT INTO travel_plans (plan_id, input_data, schedules, total_cost, total_duration) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING plan_id",
    )
    .bind(&plan.plan_id)
    .bind(Json(&plan.input_data))
    .bind(Json(&plan.schedules))
    .bind(plan.total_cost)
    .bind(plan.total_duration)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::Database {
        context: format!("failed to insert travel plan {}", plan.plan_id),
        source: e,
    })?;

    Ok(plan_id)
}

/// Fetch a plan by its client-visible id.
///
/// An absent row is `NotFound`, never `Database`.
pub async fn get_plan(pool: &PgPool, plan_id: &str) -> Result<StoredPlan, StoreError> {
    let plan = sqlx::query_as::<_, StoredPlan>("SELECT * FROM travel_plans WHERE plan_id = $1")
        .bind(plan_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StoreError::Database {
            context: format!("failed to fetch travel plan {plan_id}"),
            source: e,
        })?;

    plan.ok_or_else(|| StoreError::not_found(plan_id))
}

/// List plan summaries (no schedules), newest first.
pub async fn list_plans(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<PlanSummary>, StoreError> {
    let plans = sqlx::query_as::<_, PlanSummary>(
        "SELECT plan_id, input_data, total_cost, total_duration, created_at, updated_at \
         FROM travel_plans \
         ORDER BY created_at DESC \
         LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::Database {
        context: "failed to list travel plans".into(),
        source: e,
    })?;

    Ok(plans)
}

/// Replace a plan's schedules and totals, advancing `updated_at`.
///
/// `input_data` is immutable once submitted and is left untouched.
pub async fn update_plan(
    pool: &PgPool,
    plan_id: &str,
    plan: &TravelPlan,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE travel_plans \
         SET schedules = $1, total_cost = $2, total_duration = $3, updated_at = now() \
         WHERE plan_id = $4",
    )
    .bind(Json(&plan.schedules))
    .bind(plan.total_cost)
    .bind(plan.total_duration)
    .bind(plan_id)
    .execute(pool)
    .await
    .map_err(|e| StoreError::Database {
        context: format!("failed to update travel plan {plan_id}"),
        source: e,
    })?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(plan_id));
    }

    Ok(())
}

/// Delete a plan and all of its edit history in one transaction.
///
/// `NotFound` when no plan row exists; the history deletion rolls back in
/// that case so a typo'd id cannot silently drop history rows.
pub async fn delete_plan(pool: &PgPool, plan_id: &str) -> Result<(), StoreError> {
    let mut tx = pool.begin().await.map_err(|e| StoreError::Database {
        context: "failed to begin transaction".into(),
        source: e,
    })?;

    sqlx::query("DELETE FROM timeline_item_history WHERE plan_id = $1")
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database {
            context: format!("failed to delete history for travel plan {plan_id}"),
            source: e,
        })?;

    let result = sqlx::query("DELETE FROM travel_plans WHERE plan_id = $1")
        .bind(plan_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database {
            context: format!("failed to delete travel plan {plan_id}"),
            source: e,
        })?;

    if result.rows_affected() == 0 {
        // Transaction rolls back on drop (no commit).
        return Err(StoreError::not_found(plan_id));
    }

    tx.commit().await.map_err(|e| StoreError::Database {
        context: format!("failed to commit deletion of travel plan {plan_id}"),
        source: e,
    })?;

    Ok(())
}

/// Count all stored plans.
pub async fn count_plans(pool: &PgPool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM travel_plans")
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Database {
            context: "failed to count travel plans".into(),
            source: e,
        })?;

    Ok(count)
}

/// Count plans created before the cutoff.
pub async fn count_plans_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM travel_plans WHERE created_at < $1")
        .bind(cutoff)
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Database {
            context: "failed to count old travel plans".into(),
            source: e,
        })?;

    Ok(count)
}

/// Delete all plans created before the cutoff, plus their history rows,
/// in one transaction. Returns the number of plans deleted.
pub async fn delete_plans_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await.map_err(|e| StoreError::Database {
        context: "failed to begin transaction".into(),
        source: e,
    })?;

    sqlx::query(
        "DELETE FROM timeline_item_history \
         WHERE plan_id IN (SELECT plan_id FROM travel_plans WHERE created_at < $1)",
    )
    .bind(cutoff)
    .execute(&mut *tx)
    .await
    .map_err(|e| StoreError::Database {
        context: "failed to delete history for old travel plans".into(),
        source: e,
    })?;

    let result = sqlx::query("DELETE FROM travel_plans WHERE created_at < $1")
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database {
            context: "failed to delete old travel plans".into(),
            source: e,
        })?;

    tx.commit().await.map_err(|e| StoreError::Database {
        context: "failed to commit deletion of old travel plans".into(),
        source: e,
    })?;

    Ok(result.rows_affected())
}

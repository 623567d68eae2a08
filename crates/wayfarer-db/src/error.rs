use thiserror::Error;

/// Errors from the storage layer.
///
/// Every query function returns this closed set so callers can branch on
/// the variant instead of inspecting message text. Absence of a plan is
/// always `NotFound`; everything the database driver reports is `Database`
/// with the failing operation named in `context`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No plan row exists for the given client-visible plan id.
    #[error("travel plan {plan_id:?} not found")]
    NotFound { plan_id: String },

    /// The database rejected or failed the operation.
    #[error("{context}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub fn not_found(plan_id: impl Into<String>) -> Self {
        Self::NotFound {
            plan_id: plan_id.into(),
        }
    }

    /// True when the error is the benign "no such plan" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

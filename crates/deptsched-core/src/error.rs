use crate::store::StoreError;

/// Input rejected before anything reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message content is empty")]
    EmptyContent,

    #[error("Date range start {start} is after end {end}")]
    InvertedDateRange { start: String, end: String },

    #[error("Thread {record_id} is not live")]
    ThreadNotLive { record_id: String },
}

/// Errors surfaced by the scheduling core.
///
/// None of these are process-fatal: the worst outcome is a degraded
/// (partial or empty) view together with the reported cause.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Source {source_name} unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Subscription to {source_name} failed: {message}")]
    Subscription {
        source_name: String,
        message: String,
    },

    #[error("Write to {source_name} failed: {message}")]
    Write {
        source_name: String,
        message: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }

    pub(crate) fn source_unavailable(source_name: &str, err: &StoreError) -> Self {
        CoreError::SourceUnavailable {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(source_name: &str, err: &StoreError) -> Self {
        CoreError::Write {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn subscription(source_name: &str, err: &StoreError) -> Self {
        CoreError::Subscription {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }
}

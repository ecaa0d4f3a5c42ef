use crate::types::DbId;
use crate::timeline::TimelineError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TimelineError> for CoreError {
    fn from(e: TimelineError) -> Self {
        CoreError::Internal(e.to_string())
    }
}

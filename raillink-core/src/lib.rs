pub mod alerts;
pub mod api;
pub mod booking;
pub mod pricing;
pub mod search;
pub mod seating;
pub mod session;
pub mod tracking;
pub mod validate;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl CoreError {
    /// User-facing text without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            CoreError::ValidationError(message) => message,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

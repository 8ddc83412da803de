use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Entity not found: {entity}")]
    NotFound { entity: String },

    #[error("Uniqueness conflict: {field}")]
    Uniqueness { field: String },

    #[error("Invalid transition: cannot complete {attempted} while visit is {current}")]
    InvalidTransition { current: String, attempted: String },

    #[error("Stage already completed: {stage}")]
    AlreadyCompleted { stage: String },

    #[error("Validation error: {message}")]
    Validation { message: String },
}

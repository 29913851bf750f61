use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("mail protocol error: {0}")]
    Mail(String),

    #[error("analyzer error: {0}")]
    Analyzer(String),

    #[error("invalid secret: {0}")]
    Crypto(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<parcelwatch_model::ModelError> for CoreError {
    fn from(err: parcelwatch_model::ModelError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl From<mailparse::MailParseError> for CoreError {
    fn from(err: mailparse::MailParseError) -> Self {
        CoreError::Mail(format!("failed to parse message: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

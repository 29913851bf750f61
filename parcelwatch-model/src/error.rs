use thiserror::Error;

/// Errors produced when converting untrusted strings into model enums.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid order status: {0}")]
    InvalidOrderStatus(String),

    #[error("invalid queue status: {0}")]
    InvalidQueueStatus(String),

    #[error("invalid module kind: {0}")]
    InvalidModuleKind(String),

    #[error("invalid mailbox security: {0}")]
    InvalidMailboxSecurity(String),

    #[error("invalid email type: {0}")]
    InvalidEmailType(String),

    #[error("invalid notification event: {0}")]
    InvalidNotificationEvent(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

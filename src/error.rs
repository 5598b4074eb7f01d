use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("campus {0} not found")]
    CampusNotFound(Uuid),

    #[error("issue {0} not found")]
    IssueNotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("issue title is required")]
    MissingTitle,

    #[error("invalid status '{0}': expected escalated or actioned")]
    InvalidStatus(String),

    #[error("issue {0} is already resolved")]
    AlreadyResolved(Uuid),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SyncResult<T> = Result<T, SyncError>;

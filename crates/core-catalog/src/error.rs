//! Catalog error types

use thiserror::Error;

/// Errors raised by a [`CatalogStore`](crate::CatalogStore) backend
#[derive(Debug, Error)]
pub enum CatalogError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "sqlite")]
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("No backend available for path: {0}")]
    NoBackend(String),
}

impl CatalogError {
    /// Lock contention and pool exhaustion clear up on their own
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            CatalogError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

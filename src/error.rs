/*!
 * Error types for Ballast
 */

use ballast_core_catalog::CatalogError;
use ballast_core_ingest::IngestError;
use ballast_core_ranking::RankingError;
use std::fmt;
use std::io;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, BallastError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum BallastError {
    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Catalog store failure
    Catalog(CatalogError),

    /// Ranking pass failure
    Ranking(RankingError),

    /// Ingestion stage failure
    Ingest(IngestError),

    /// A core upstream service stayed unreachable after every retry
    Connectivity { service: String, reason: String },

    /// The cycle exceeded its deadline
    Timeout(Duration),

    /// The run was interrupted
    Cancelled,

    /// Audit log error
    AuditLog(String),
}

impl BallastError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            EXIT_PARTIAL
        }
    }

    /// Errors that end the whole run rather than one cycle
    pub fn is_fatal(&self) -> bool {
        match self {
            BallastError::Config(_) => true,
            BallastError::Connectivity { .. } => true,
            BallastError::Catalog(_) => true,
            BallastError::Ranking(RankingError::Catalog(_)) => true,
            BallastError::Ingest(IngestError::Catalog(_)) => true,
            BallastError::Ingest(IngestError::Upstream { .. }) => true,

            BallastError::Io(_) => false,
            BallastError::Ingest(IngestError::Cancelled) => false,
            BallastError::Timeout(_) => false,
            BallastError::Cancelled => false,
            BallastError::AuditLog(_) => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            BallastError::Config(_) => ErrorCategory::Configuration,
            BallastError::Io(_) => ErrorCategory::IoError,
            BallastError::Catalog(_) | BallastError::Ranking(_) => ErrorCategory::Catalog,
            BallastError::Ingest(IngestError::Catalog(_)) => ErrorCategory::Catalog,
            BallastError::Ingest(_) | BallastError::Connectivity { .. } => ErrorCategory::Network,
            BallastError::Timeout(_) | BallastError::Cancelled => ErrorCategory::Deadline,
            BallastError::AuditLog(_) => ErrorCategory::Audit,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration errors
    Configuration,
    /// I/O operation errors
    IoError,
    /// Catalog store errors
    Catalog,
    /// Upstream service errors
    Network,
    /// Deadline and cancellation
    Deadline,
    /// Audit logging errors
    Audit,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Catalog => write!(f, "catalog"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Deadline => write!(f, "deadline"),
            ErrorCategory::Audit => write!(f, "audit"),
        }
    }
}

impl fmt::Display for BallastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BallastError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BallastError::Io(err) => write!(f, "I/O error: {}", err),
            BallastError::Catalog(err) => write!(f, "{}", err),
            BallastError::Ranking(err) => write!(f, "Ranking failed: {}", err),
            BallastError::Ingest(err) => write!(f, "Ingestion failed: {}", err),
            BallastError::Connectivity { service, reason } => {
                write!(f, "Cannot reach {}: {}", service, reason)
            }
            BallastError::Timeout(limit) => {
                write!(f, "Cycle exceeded its {}s deadline", limit.as_secs())
            }
            BallastError::Cancelled => write!(f, "Cycle cancelled"),
            BallastError::AuditLog(msg) => write!(f, "Audit log error: {}", msg),
        }
    }
}

impl std::error::Error for BallastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BallastError::Io(err) => Some(err),
            BallastError::Catalog(err) => Some(err),
            BallastError::Ranking(err) => Some(err),
            BallastError::Ingest(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BallastError {
    fn from(err: io::Error) -> Self {
        BallastError::Io(err)
    }
}

impl From<CatalogError> for BallastError {
    fn from(err: CatalogError) -> Self {
        BallastError::Catalog(err)
    }
}

impl From<RankingError> for BallastError {
    fn from(err: RankingError) -> Self {
        BallastError::Ranking(err)
    }
}

impl From<IngestError> for BallastError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Cancelled => BallastError::Cancelled,
            other => BallastError::Ingest(other),
        }
    }
}

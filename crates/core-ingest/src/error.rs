use ballast_core_catalog::CatalogError;
use ballast_core_resilience::ResilienceError;
use thiserror::Error;

/// Errors that abort a whole ingestion stage.
///
/// Per-item failures never surface here; they end up in the stage's
/// [`PoolReport`](crate::PoolReport).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Upstream {service} unavailable: {source}")]
    Upstream {
        service: &'static str,
        #[source]
        source: ResilienceError,
    },

    #[error("Ingestion cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn upstream(service: &'static str, source: ResilienceError) -> Self {
        IngestError::Upstream { service, source }
    }
}

/// Store failures inside a worker are retried like upstream ones
pub(crate) fn catalog_to_resilience(err: CatalogError) -> ResilienceError {
    if err.is_transient() {
        ResilienceError::Transient(err.to_string())
    } else {
        ResilienceError::Permanent(err.to_string())
    }
}

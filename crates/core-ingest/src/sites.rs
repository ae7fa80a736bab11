//! Site registry refresh

use crate::client::SiteRegistryClient;
use crate::error::IngestError;
use ballast_core_catalog::CatalogStore;
use ballast_core_resilience::{retry, RetryPolicy};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteRefresh {
    pub listed: usize,
    pub deactivated: Vec<String>,
}

/// Mirrors the registry into the catalog.
///
/// Sites that disappear from the registry are marked inactive rather than
/// removed, so replicas they still hold stay tracked.
pub struct SiteIngestor {
    store: Arc<dyn CatalogStore>,
    client: Arc<dyn SiteRegistryClient>,
    retry: RetryPolicy,
}

impl SiteIngestor {
    pub fn new(store: Arc<dyn CatalogStore>, client: Arc<dyn SiteRegistryClient>) -> Self {
        Self {
            store,
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn refresh(&self) -> Result<SiteRefresh, IngestError> {
        let listed = retry(&self.retry, "list_sites", || self.client.list_sites())
            .await
            .map_err(|e| IngestError::upstream("site registry", e))?;

        let names: BTreeSet<&str> = listed.iter().map(|s| s.name.as_str()).collect();
        for site in &listed {
            self.store.upsert_site(site).await?;
        }

        let mut deactivated = Vec::new();
        for known in self.store.list_sites().await? {
            if known.active && !names.contains(known.name.as_str()) {
                warn!(site = %known.name, "site left the registry, deactivating");
                self.store.set_site_active(&known.name, false).await?;
                deactivated.push(known.name);
            }
        }

        info!(
            listed = listed.len(),
            deactivated = deactivated.len(),
            "site registry refreshed"
        );
        Ok(SiteRefresh {
            listed: listed.len(),
            deactivated,
        })
    }
}

//! Camera source catalog
//!
//! Thin client for the public CCTV open-data API. The relay itself never
//! consults it; the web UI and the `probe` command use it to find source
//! descriptors.

mod types;

pub use types::{SourceInfo, StreamUrls};

use std::time::Duration;
use tracing::debug;

use crate::config::CatalogConfig;
use crate::error::{AppError, Result};
use types::RawPage;

/// Environment variable holding the API service key
pub const SERVICE_KEY_ENV: &str = "CAM_RELAY_CATALOG_KEY";

#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Same HTTP client, different settings
    pub fn with_config(&self, config: CatalogConfig) -> Self {
        Self {
            http: self.http.clone(),
            config,
        }
    }

    fn service_key(&self) -> Result<String> {
        self.config
            .service_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                std::env::var(SERVICE_KEY_ENV)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
            })
            .ok_or_else(|| {
                AppError::ServiceUnavailable(format!(
                    "Catalog service key not configured (set catalog.service_key or {})",
                    SERVICE_KEY_ENV
                ))
            })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.dataset.trim_start_matches('/')
        )
    }

    /// One page of sources, `page` starting at 1
    pub async fn list_sources(&self, page: u32, per_page: u32) -> Result<Vec<SourceInfo>> {
        if page == 0 || per_page == 0 {
            return Err(AppError::BadRequest(
                "page and perPage must be at least 1".to_string(),
            ));
        }
        let key = self.service_key()?;
        let url = self.endpoint();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("page", page.to_string()),
                ("perPage", per_page.to_string()),
                ("returnType", "JSON".to_string()),
                ("serviceKey", key),
            ])
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| AppError::Catalog(format!("Failed to fetch {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| AppError::Catalog(format!("Request failed {}: {}", url, e)))?;

        let page: RawPage = response
            .json()
            .await
            .map_err(|e| AppError::Catalog(format!("Invalid catalog response: {}", e)))?;

        debug!(
            "Catalog returned {} of {} sources",
            page.data.len(),
            page.total_count
        );
        Ok(page.data.into_iter().map(SourceInfo::from).collect())
    }
}

//! HTTP client for downloading the booster catalog snapshot.

use std::time::Duration;

use pomwatch_shared::{CatalogConfig, PomwatchError, Result};
use reqwest::{Client, redirect};
use tracing::{debug, info};
use url::Url;

use crate::archive::CatalogArchive;

/// User agent for catalog requests.
const USER_AGENT: &str = concat!("pomwatch/", env!("CARGO_PKG_VERSION"));

/// Well-known path of the catalog zip snapshot under the base URL.
const ARCHIVE_PATH: &str = "archive/master.zip";

/// Downloads the booster catalog archive from its base URL.
#[derive(Debug)]
pub struct CatalogClient {
    client: Client,
    base_url: Url,
}

impl CatalogClient {
    /// Build a catalog client for the configured base URL.
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let trimmed = config.url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(PomwatchError::config(
                "catalog URL not configured; set [catalog] url or BOOSTER_CATALOG",
            ));
        }
        let base_url = Url::parse(trimmed)
            .map_err(|e| PomwatchError::config(format!("invalid catalog URL {trimmed:?}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PomwatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Download the `master` snapshot of the catalog and open it as a
    /// [`CatalogArchive`]. A non-success HTTP status is a network error.
    pub async fn fetch_archive(&self) -> Result<CatalogArchive> {
        let url = format!(
            "{}/{ARCHIVE_PATH}",
            self.base_url.as_str().trim_end_matches('/')
        );
        debug!(%url, "downloading catalog archive");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PomwatchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PomwatchError::Network(format!(
                "unable to access catalog at {url}: HTTP {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PomwatchError::Network(format!("{url}: {e}")))?;
        info!(bytes = bytes.len(), "fetched catalog archive");

        CatalogArchive::from_bytes(bytes)
    }
}

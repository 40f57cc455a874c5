//! Backend HTTP CRUD client
//!
//! Thin typed wrapper over the backend record store: reads of proxies,
//! sources and pending parts, idempotent updates of parts and sources,
//! and append-only archive / error-log writes. No retry wrapper lives
//! here; every call site applies its own isolation rule, and a failed
//! write is picked up again on the next scheduling pass.

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::domain::models::{
    ArchiveNameEntry, ArchivePictureEntry, ArchiveReplaceEntry, ErrorLogEntry, Part, Proxy, Source,
};
use crate::infrastructure::config::ApiConfig;

/// Failure of one backend call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status} for {url}")]
    Status { status: StatusCode, url: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Outcome of the pending-parts read: "no work currently available" is an
/// ordinary branch, not an error.
#[derive(Debug)]
pub enum PendingParts {
    Found(Vec<Part>),
    NoWork,
}

/// Backend record-store client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }

    async fn put_json<B: Serialize>(&self, url: &str, body: &B) -> ApiResult<()> {
        debug!("PUT {url}");
        let response = self.client.put(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> ApiResult<()> {
        debug!("POST {url}");
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    /// Proxies currently marked active on the backend.
    pub async fn get_active_proxies(&self) -> ApiResult<Vec<Proxy>> {
        let proxies: Vec<Proxy> = self
            .get_json(&self.url(&self.config.endpoints.get_proxies))
            .await?;
        Ok(proxies.into_iter().filter(|p| p.active).collect())
    }

    /// Sources currently marked active on the backend.
    pub async fn get_active_sources(&self) -> ApiResult<Vec<Source>> {
        let sources: Vec<Source> = self
            .get_json(&self.url(&self.config.endpoints.get_sources))
            .await?;
        Ok(sources.into_iter().filter(|s| s.active).collect())
    }

    /// All known sources regardless of status; used by the reactivation
    /// policy when probing previously deactivated sources.
    pub async fn get_all_sources(&self) -> ApiResult<Vec<Source>> {
        self.get_json(&self.url(&self.config.endpoints.get_sources))
            .await
    }

    /// Parts whose processing is outstanding. A 404 or empty list from
    /// the backend is the distinguished no-work signal.
    pub async fn get_pending_parts(&self) -> ApiResult<PendingParts> {
        let url = self.url(&self.config.endpoints.get_pending_parts);
        debug!("GET {url}");
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(PendingParts::NoWork);
        }
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status(),
                url,
            });
        }
        let parts: Vec<Part> = response.json().await?;
        if parts.is_empty() {
            Ok(PendingParts::NoWork)
        } else {
            Ok(PendingParts::Found(parts))
        }
    }

    /// Persist the canonical merge result for one part.
    pub async fn update_part(&self, part: &Part) -> ApiResult<()> {
        self.put_json(&self.url(&self.config.endpoints.update_part), part)
            .await
    }

    /// Persist a source status change (deactivation or reactivation).
    pub async fn update_source(&self, source: &Source) -> ApiResult<()> {
        let url = format!(
            "{}/{}",
            self.url(&self.config.endpoints.update_source),
            source.id
        );
        self.put_json(&url, source).await
    }

    pub async fn add_name_archive(&self, entry: &ArchiveNameEntry) -> ApiResult<()> {
        self.post_json(&self.url(&self.config.endpoints.add_name_archive), entry)
            .await
    }

    pub async fn add_replace_archive(&self, entry: &ArchiveReplaceEntry) -> ApiResult<()> {
        self.post_json(&self.url(&self.config.endpoints.add_replace_archive), entry)
            .await
    }

    pub async fn add_picture_archive(&self, entry: &ArchivePictureEntry) -> ApiResult<()> {
        self.post_json(&self.url(&self.config.endpoints.add_picture_archive), entry)
            .await
    }

    /// Append one entry to the backend error log.
    pub async fn log_error(&self, message: impl Into<String>) -> ApiResult<()> {
        let entry = ErrorLogEntry::new(message);
        self.post_json(&self.url(&self.config.endpoints.save_error), &entry)
            .await
    }
}

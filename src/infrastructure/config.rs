//! Configuration infrastructure
//!
//! Loads the JSON configuration file (backend endpoints, scheduling
//! cadence, proxy gating, image store location, logging) with sane
//! defaults, creating the file on first run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend API endpoints and timeouts
    pub api: ApiConfig,

    /// Scheduler loop cadence
    pub scheduler: SchedulerConfig,

    /// Proxy gating and reachability probing
    pub proxies: ProxyConfig,

    /// Per-source scraping behavior
    pub scrape: ScrapeConfig,

    /// Image acquisition and storage
    pub images: ImageConfig,

    /// Source health policy
    pub sources: SourcePolicyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Backend API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend record store
    pub base_url: String,

    /// Per-operation endpoint paths, appended to `base_url`
    pub endpoints: EndpointConfig,

    /// Request timeout for backend calls in seconds
    pub request_timeout_seconds: u64,
}

/// Endpoint paths for the backend CRUD surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub get_proxies: String,
    pub get_sources: String,
    pub get_pending_parts: String,
    pub update_part: String,
    /// Source id is appended as a path segment
    pub update_source: String,
    pub add_name_archive: String,
    pub add_replace_archive: String,
    pub add_picture_archive: String,
    pub save_error: String,
}

/// Scheduler loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between the end of one pass and the start of the next
    pub interval_seconds: u64,

    /// Idle sleep between loop ticks while waiting for the next run
    pub idle_tick_ms: u64,
}

/// Proxy gate and health probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Maximum concurrent leases per proxy
    pub max_concurrent_per_proxy: usize,

    /// Reachability probe timeout in seconds
    pub probe_timeout_seconds: u64,

    /// User agent sent on all outbound scrape/probe traffic
    pub user_agent: String,
}

/// Per-source scrape settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Hard ceiling on one source invocation, in seconds
    pub request_timeout_seconds: u64,

    /// How long the dispatcher waits for a proxy lease before giving up
    /// on a source, in milliseconds
    pub lease_wait_ms: u64,
}

/// Image acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Root directory of the image store; `<root>/<source_id>/<part_id>/`
    pub root_dir: String,

    /// Download timeout in seconds
    pub download_timeout_seconds: u64,
}

/// Source health policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePolicyConfig {
    /// Re-enable a previously deactivated source when a probe succeeds.
    /// Deactivation is one-directional when false.
    pub reactivate_on_probe: bool,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Also write log output to a rolling file under `log_dir`
    pub file_output: bool,

    /// Directory for log files when `file_output` is set
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            scheduler: SchedulerConfig::default(),
            proxies: ProxyConfig::default(),
            scrape: ScrapeConfig::default(),
            images: ImageConfig::default(),
            sources: SourcePolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            endpoints: EndpointConfig::default(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            get_proxies: "/api/proxies".to_string(),
            get_sources: "/api/part-sources".to_string(),
            get_pending_parts: "/api/parts/pending".to_string(),
            update_part: "/api/parts".to_string(),
            update_source: "/api/part-sources".to_string(),
            add_name_archive: "/api/archive/names".to_string(),
            add_replace_archive: "/api/archive/replaces".to_string(),
            add_picture_archive: "/api/archive/pictures".to_string(),
            save_error: "/api/errors".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            idle_tick_ms: 200,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_proxy: 2,
            probe_timeout_seconds: 10,
            user_agent: "parts-grabber/0.2".to_string(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 60,
            lease_wait_ms: 5_000,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            root_dir: "parts/pic".to_string(),
            download_timeout_seconds: 30,
        }
    }
}

impl Default for SourcePolicyConfig {
    fn default() -> Self {
        Self {
            reactivate_on_probe: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_output: false,
            log_dir: "logs".to_string(),
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Default configuration location under the user config directory.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("parts-grabber");
        Ok(config_dir.join("parts_grabber_config.json"))
    }

    /// Manager for an explicit configuration file path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Manager for the default configuration location.
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: Self::default_config_path()?,
        })
    }

    /// Load configuration from file, creating the default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Configuration file not found, creating default: {:?}",
                self.config_path
            );
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        let config = serde_json::from_str::<AppConfig>(&content)
            .with_context(|| format!("Invalid configuration file: {:?}", self.config_path))?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration, creating the parent directory on demand
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(config_dir) = self.config_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        Ok(())
    }
}

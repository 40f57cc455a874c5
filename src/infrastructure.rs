//! Infrastructure layer for the backend API client, proxy gating, health
//! probing, image acquisition, configuration, and logging.

pub mod config;      // Configuration file loading and defaults
pub mod logging;     // Logging infrastructure
pub mod api;         // Backend HTTP CRUD client
pub mod proxy_gate;  // Proxy lease gate and per-proxy HTTP client pool
pub mod health;      // Source reachability checker
pub mod images;      // Image fetch, normalization and storage

// Re-export commonly used items
pub use api::{ApiClient, ApiError, PendingParts};
pub use config::{AppConfig, ConfigManager};
pub use health::{ProbeReport, SourceHealthChecker};
pub use images::ImageAcquirer;
pub use logging::init_logging;
pub use proxy_gate::{AcquireOutcome, ProxyClientPool, ProxyGate, ProxyLease};

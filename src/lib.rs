//! parts-grabber - Multi-source parts catalog scrape & reconciliation pipeline
//!
//! Periodically enriches a catalog of physical part records by scraping
//! multiple independent external sources through health-gated proxies,
//! reconciling the per-source observations into one canonical record per
//! part, and persisting an append-only audit trail of every contribution.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

// Re-export commonly used items for convenience
pub use domain::models::{
    ArchiveNameEntry, ArchivePictureEntry, ArchiveReplaceEntry, Observation, ObservedPicture,
    Part, PartStatus, Proxy, Source, SourceReachability,
};
pub use infrastructure::api::{ApiClient, ApiError, PendingParts};
pub use infrastructure::config::{AppConfig, ConfigManager};
pub use infrastructure::proxy_gate::{AcquireOutcome, ProxyClientPool, ProxyGate, ProxyLease};

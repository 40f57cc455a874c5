//! Application layer module
//!
//! Orchestrates the scrape pipeline: per-source parser strategies, the
//! proxy-gated concurrent dispatcher, the reconciler that collapses
//! observations into the canonical part record, and the scheduler loop
//! that drives everything on an interval.

pub mod parsers;
pub mod dispatcher;
pub mod reconciler;
pub mod scheduler;

// Re-export commonly used items
pub use dispatcher::Dispatcher;
pub use parsers::{ParserRegistry, ScrapeError, ScrapedPart, SourceScraper};
pub use reconciler::Reconciler;
pub use scheduler::Scheduler;

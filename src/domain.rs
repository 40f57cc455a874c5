//! Domain module - Core business logic and entities
//!
//! Contains the catalog entities (parts, sources, proxies, observations,
//! archive entries), the pure cross-source merge policy, and the text /
//! URL / part-number normalizers. Nothing in here performs I/O.

pub mod models;
pub mod merge;
pub mod normalize;

// Re-export commonly used items for convenience
pub use models::{
    Observation, ObservedPicture, Part, PartStatus, Proxy, Source, SourceReachability,
};
pub use merge::{MergeOutcome, merge_observations, select_picture};

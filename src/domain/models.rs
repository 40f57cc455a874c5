//! Catalog entities exchanged with the backend and flowing through the
//! scrape pipeline.
//!
//! `Part`, `Source` and `Proxy` mirror the backend's JSON payloads; the
//! remaining types (`Observation`, `SourceReachability`, archive entries)
//! are pipeline-internal or write-only.

use serde::{Deserialize, Serialize};

/// Processing state of a canonical part record.
///
/// The backend stores this as a string code; `Pending` records are the
/// scheduler's work queue, the other two are terminal for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    /// Awaiting processing.
    #[serde(rename = "1")]
    Pending,
    /// Observations were merged into the canonical record.
    #[serde(rename = "2")]
    Merged,
    /// No source contributed a name or a replace number.
    #[serde(rename = "3")]
    NoDataFound,
}

/// Canonical part record, owned by the backend and mutated only through
/// the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub id: i64,
    /// Required lookup key; records missing it are skipped and logged.
    pub main_part_number: Option<String>,
    #[serde(default)]
    pub part_name: Option<String>,
    /// JSON-encoded string array, backend wire format. Always contains
    /// `main_part_number` itself after reconciliation.
    #[serde(default)]
    pub replaces: Option<String>,
    /// Local path of the canonical picture, if one was acquired.
    #[serde(default)]
    pub pic: Option<String>,
    /// Set to `Some(1)` iff `pic` is set.
    #[serde(default)]
    pub photo_status: Option<u8>,
    pub status: PartStatus,
}

impl Part {
    /// Encode a replace-number list into the backend's wire format.
    pub fn encode_replaces(replaces: &[String]) -> String {
        serde_json::to_string(replaces).unwrap_or_else(|_| "[]".to_string())
    }
}

/// One external data provider for part information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: i64,
    pub source_name: String,
    /// Site root, probed for reachability and used by the parser strategy.
    pub base_url: String,
    /// Lower is more trusted; ties broken by id.
    pub confidence: i32,
    /// Cleared when no proxy reaches the site.
    pub active: bool,
}

/// A network egress point used to reach sources, rate-limited by the
/// proxy gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    pub id: i64,
    /// Connection descriptor understood by the HTTP client,
    /// e.g. `http://10.0.0.7:3128`.
    pub address: String,
    pub active: bool,
}

/// The subset of proxies that reached a source during this pass.
///
/// Ephemeral: recomputed every scheduler iteration and reused as the
/// candidate pool for every dispatch in that pass.
#[derive(Debug, Clone)]
pub struct SourceReachability {
    pub source: Source,
    pub proxies: Vec<Proxy>,
}

/// One image reference scraped from a source, with the local path filled
/// in once acquisition succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPicture {
    pub url: String,
    pub local_path: Option<String>,
}

impl ObservedPicture {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), local_path: None }
    }
}

/// One source's scrape result for one part lookup.
///
/// `failed = true` means the source did not respond and must be treated
/// as unreachable; an observation with no data but `failed = false` is a
/// valid empty result.
#[derive(Debug, Clone)]
pub struct Observation {
    pub source: Source,
    pub name: Option<String>,
    pub replaces: Vec<String>,
    pub pictures: Vec<ObservedPicture>,
    pub attempt_count: u32,
    pub failed: bool,
}

impl Observation {
    /// An observation recording that the source did not respond.
    pub fn failed(source: Source) -> Self {
        Self {
            source,
            name: None,
            replaces: Vec::new(),
            pictures: Vec::new(),
            attempt_count: 1,
            failed: true,
        }
    }

    /// A non-empty trimmed name, if the source contributed one.
    pub fn name_if_present(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Audit-trail record of one observation's name contribution.
/// Write-once; never read back by the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveNameEntry {
    pub part_name: String,
    pub part_id: i64,
    pub source_id: i64,
    pub attempt_counter: u32,
}

/// Audit-trail record of one replace-number contribution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReplaceEntry {
    pub replace_number: String,
    pub part_id: i64,
    pub source_id: i64,
    pub attempt_counter: u32,
}

/// Audit-trail record of one successfully acquired picture.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivePictureEntry {
    pub link: String,
    pub local_path: String,
    pub part_id: i64,
    pub source_id: i64,
    pub attempt_counter: u32,
}

/// Backend error-log payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    pub error_message: String,
    pub script_name: String,
}

/// Originating-script tag on every error-log entry.
pub const SCRIPT_NAME: &str = "parts-grabber";

impl ErrorLogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            script_name: SCRIPT_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: i64) -> Source {
        Source {
            id,
            source_name: format!("source-{id}"),
            base_url: "https://example.com".to_string(),
            confidence: id as i32,
            active: true,
        }
    }

    #[test]
    fn part_status_uses_backend_string_codes() {
        let json = serde_json::to_string(&PartStatus::Merged).unwrap();
        assert_eq!(json, "\"2\"");
        let parsed: PartStatus = serde_json::from_str("\"3\"").unwrap();
        assert_eq!(parsed, PartStatus::NoDataFound);
    }

    #[test]
    fn part_deserializes_with_missing_optionals() {
        let part: Part =
            serde_json::from_str(r#"{"id":7,"mainPartNumber":"12345","status":"1"}"#).unwrap();
        assert_eq!(part.id, 7);
        assert_eq!(part.main_part_number.as_deref(), Some("12345"));
        assert_eq!(part.status, PartStatus::Pending);
        assert!(part.part_name.is_none());
        assert!(part.pic.is_none());
    }

    #[test]
    fn encode_replaces_is_json_array() {
        let encoded = Part::encode_replaces(&["12345".to_string(), "678".to_string()]);
        assert_eq!(encoded, r#"["12345","678"]"#);
    }

    #[test]
    fn failed_observation_carries_no_data() {
        let obs = Observation::failed(source(1));
        assert!(obs.failed);
        assert!(obs.name_if_present().is_none());
        assert!(obs.replaces.is_empty());
    }

    #[test]
    fn blank_name_is_treated_as_absent() {
        let mut obs = Observation::failed(source(1));
        obs.failed = false;
        obs.name = Some("   ".to_string());
        assert!(obs.name_if_present().is_none());
    }
}

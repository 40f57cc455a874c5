//! Cross-source merge policy.
//!
//! Pure functions that collapse the non-failed observations for one part
//! into a canonical name, replace set, status and picture. Deterministic
//! given the same observation set and source confidence ordering; the
//! reconciler wires the results into backend writes.

use crate::domain::models::{Observation, PartStatus, Source};

/// Maximum length of a canonical part name on the backend.
pub const NAME_MAX_CHARS: usize = 255;
/// Names over the ceiling are cut here and suffixed with `...`.
pub const NAME_TRUNCATE_AT: usize = 251;

/// Result of merging one part's observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub status: PartStatus,
    pub name: Option<String>,
    /// Canonical replace set; first element is always the main part number.
    pub replaces: Vec<String>,
}

/// Merge the non-failed observations for `main_part_number`.
///
/// Yields `NoDataFound` iff no observation contributed a name and the
/// union of non-self replace numbers is empty; otherwise `Merged` with
/// the shortest contributed name (first-seen tie-break) and the deduped
/// replace union.
pub fn merge_observations(main_part_number: &str, observations: &[Observation]) -> MergeOutcome {
    let replaces = canonical_replaces(main_part_number, observations);
    let name = canonical_name(observations);

    // Only the main number itself means no source contributed anything.
    if name.is_none() && replaces.len() == 1 {
        return MergeOutcome {
            status: PartStatus::NoDataFound,
            name: None,
            replaces,
        };
    }

    MergeOutcome {
        status: PartStatus::Merged,
        name,
        replaces,
    }
}

/// Shortest non-empty name across observations, first-seen on ties,
/// truncated to the backend ceiling.
fn canonical_name(observations: &[Observation]) -> Option<String> {
    let mut best: Option<&str> = None;
    for obs in observations {
        if let Some(name) = obs.name_if_present() {
            let shorter = best.is_none_or(|b| name.chars().count() < b.chars().count());
            if shorter {
                best = Some(name);
            }
        }
    }
    best.map(truncate_name)
}

/// Enforce the 255-char ceiling: longer names are cut at 251 chars and
/// suffixed with an ellipsis marker.
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_MAX_CHARS {
        let cut: String = name.chars().take(NAME_TRUNCATE_AT).collect();
        format!("{cut}...")
    } else {
        name.to_string()
    }
}

/// `{main} ∪ (union of all replaces, excluding main)`, main first,
/// duplicates removed in encounter order.
fn canonical_replaces(main_part_number: &str, observations: &[Observation]) -> Vec<String> {
    let mut out = vec![main_part_number.to_string()];
    for obs in observations {
        for replace in &obs.replaces {
            if replace != main_part_number && !out.contains(replace) {
                out.push(replace.clone());
            }
        }
    }
    out
}

/// Pick the canonical picture: iterate sources in ascending confidence
/// order (ties by id); the candidate for each matching observation is
/// its **first** picture only. An observation whose first picture was
/// not acquired counts as pictureless and the next source is tried,
/// even if a later picture of that observation was stored.
pub fn select_picture(sources: &[Source], observations: &[Observation]) -> Option<String> {
    let mut ordered: Vec<&Source> = sources.iter().collect();
    ordered.sort_by_key(|s| (s.confidence, s.id));

    for source in ordered {
        let Some(obs) = observations.iter().find(|o| o.source.id == source.id) else {
            continue;
        };
        if let Some(path) = obs.pictures.first().and_then(|p| p.local_path.clone()) {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ObservedPicture;

    fn source(id: i64, confidence: i32) -> Source {
        Source {
            id,
            source_name: format!("source-{id}"),
            base_url: "https://example.com".to_string(),
            confidence,
            active: true,
        }
    }

    fn obs(id: i64, name: Option<&str>, replaces: &[&str]) -> Observation {
        Observation {
            source: source(id, id as i32),
            name: name.map(str::to_string),
            replaces: replaces.iter().map(|s| s.to_string()).collect(),
            pictures: Vec::new(),
            attempt_count: 1,
            failed: false,
        }
    }

    #[test]
    fn empty_observations_yield_no_data_found() {
        let outcome = merge_observations("12345", &[]);
        assert_eq!(outcome.status, PartStatus::NoDataFound);
        assert_eq!(outcome.replaces, vec!["12345".to_string()]);
        assert!(outcome.name.is_none());
    }

    #[test]
    fn nameless_observations_with_only_self_replace_yield_no_data_found() {
        // A source echoing back the looked-up number contributes nothing.
        let observations = vec![obs(1, None, &["12345"]), obs(2, Some("  "), &[])];
        let outcome = merge_observations("12345", &observations);
        assert_eq!(outcome.status, PartStatus::NoDataFound);
        assert_eq!(outcome.replaces, vec!["12345".to_string()]);
    }

    #[test]
    fn shortest_name_wins() {
        let observations = vec![
            obs(1, Some("Ice Maker Kit"), &[]),
            obs(2, Some("Ice Kit"), &[]),
        ];
        let outcome = merge_observations("12345", &observations);
        assert_eq!(outcome.status, PartStatus::Merged);
        assert_eq!(outcome.name.as_deref(), Some("Ice Kit"));
    }

    #[test]
    fn name_ties_break_by_encounter_order() {
        let observations = vec![obs(1, Some("Kit A"), &[]), obs(2, Some("Kit B"), &[])];
        let outcome = merge_observations("12345", &observations);
        assert_eq!(outcome.name.as_deref(), Some("Kit A"));
    }

    #[test]
    fn overlong_name_is_truncated_to_254_chars() {
        let long = "x".repeat(300);
        let observations = vec![obs(1, Some(&long), &[])];
        let outcome = merge_observations("12345", &observations);
        let name = outcome.name.unwrap();
        assert_eq!(name.chars().count(), NAME_TRUNCATE_AT + 3);
        assert!(name.ends_with("..."));
        assert!(name.starts_with("xxx"));
    }

    #[test]
    fn name_at_ceiling_is_kept_verbatim() {
        let exact = "y".repeat(NAME_MAX_CHARS);
        let observations = vec![obs(1, Some(&exact), &[])];
        let outcome = merge_observations("12345", &observations);
        assert_eq!(outcome.name.as_deref(), Some(exact.as_str()));
    }

    #[test]
    fn replaces_contain_main_number_exactly_once() {
        let observations = vec![
            obs(1, Some("Kit"), &["12345", "678", "999"]),
            obs(2, None, &["678", "12345", "111"]),
        ];
        let outcome = merge_observations("12345", &observations);
        assert_eq!(
            outcome.replaces,
            vec!["12345", "678", "999", "111"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(outcome.replaces.iter().filter(|r| *r == "12345").count(), 1);
    }

    #[test]
    fn replaces_alone_still_mean_merged() {
        let observations = vec![obs(1, None, &["678"])];
        let outcome = merge_observations("12345", &observations);
        assert_eq!(outcome.status, PartStatus::Merged);
        assert!(outcome.name.is_none());
        assert_eq!(outcome.replaces, vec!["12345".to_string(), "678".to_string()]);
    }

    #[test]
    fn picture_comes_from_most_trusted_source_with_acquired_picture() {
        let sources = vec![source(1, 1), source(2, 2)];
        let mut trusted = obs(1, None, &[]);
        trusted.pictures = vec![ObservedPicture::new("https://a/1.jpg")]; // not acquired
        let mut fallback = obs(2, None, &[]);
        fallback.pictures = vec![ObservedPicture {
            url: "https://b/1.jpg".to_string(),
            local_path: Some("parts/pic/2/7/1.jpg".to_string()),
        }];
        let picked = select_picture(&sources, &[trusted, fallback]);
        assert_eq!(picked.as_deref(), Some("parts/pic/2/7/1.jpg"));
    }

    #[test]
    fn picture_selection_is_deterministic_under_reordering() {
        let sources = vec![source(2, 2), source(1, 1)];
        let mut a = obs(1, None, &[]);
        a.pictures = vec![ObservedPicture {
            url: "https://a/1.jpg".to_string(),
            local_path: Some("parts/pic/1/7/1.jpg".to_string()),
        }];
        let mut b = obs(2, None, &[]);
        b.pictures = vec![ObservedPicture {
            url: "https://b/1.jpg".to_string(),
            local_path: Some("parts/pic/2/7/1.jpg".to_string()),
        }];
        let first = select_picture(&sources, &[a.clone(), b.clone()]);
        let second = select_picture(&sources, &[b, a]);
        assert_eq!(first.as_deref(), Some("parts/pic/1/7/1.jpg"));
        assert_eq!(first, second);
    }

    #[test]
    fn later_pictures_do_not_rescue_an_observation() {
        // Only the first picture of an observation is the candidate: if
        // it was not acquired, the observation is pictureless and the
        // next source in confidence order wins.
        let sources = vec![source(1, 1), source(2, 2)];
        let mut trusted = obs(1, None, &[]);
        trusted.pictures = vec![
            ObservedPicture::new("https://a/1.jpg"),
            ObservedPicture {
                url: "https://a/2.jpg".to_string(),
                local_path: Some("parts/pic/1/7/1.jpg".to_string()),
            },
        ];
        let mut fallback = obs(2, None, &[]);
        fallback.pictures = vec![ObservedPicture {
            url: "https://b/1.jpg".to_string(),
            local_path: Some("parts/pic/2/7/1.jpg".to_string()),
        }];

        let picked = select_picture(&sources, &[trusted, fallback]);
        assert_eq!(picked.as_deref(), Some("parts/pic/2/7/1.jpg"));
    }

    #[test]
    fn no_acquired_picture_means_no_canonical_picture() {
        let sources = vec![source(1, 1)];
        let mut a = obs(1, None, &[]);
        a.pictures = vec![ObservedPicture::new("https://a/1.jpg")];
        assert!(select_picture(&sources, &[a]).is_none());
    }
}

//! Cross-source reconciliation
//!
//! Takes the responsive observations for one part, acquires and archives
//! every contribution (names, replace numbers, pictures), then collapses
//! the set into the canonical part record via the pure merge policy and
//! persists it with one update call. The archive is an audit trail; it
//! is written even when the merge outcome is "no data found", and a
//! failed archive write never blocks the merge.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::domain::merge::{self, truncate_name};
use crate::domain::models::{
    ArchiveNameEntry, ArchivePictureEntry, ArchiveReplaceEntry, Observation, Part, PartStatus,
    Source,
};
use crate::infrastructure::api::ApiClient;
use crate::infrastructure::images::ImageAcquirer;

/// Merges observations into the canonical part record.
pub struct Reconciler {
    api: Arc<ApiClient>,
    images: ImageAcquirer,
}

impl Reconciler {
    pub fn new(api: Arc<ApiClient>, images: ImageAcquirer) -> Self {
        Self { api, images }
    }

    /// Reconcile one part from its responsive observations.
    ///
    /// `sources` is the full known source list; its confidence ordering
    /// drives picture selection. The final part update is the only call
    /// whose failure propagates: without it the part stays pending and
    /// is retried next pass.
    pub async fn reconcile(
        &self,
        part: &mut Part,
        mut observations: Vec<Observation>,
        sources: &[Source],
    ) -> Result<()> {
        let main_number = part
            .main_part_number
            .clone()
            .context("part has no main part number")?;

        // Acquire pictures first so both the archive and the canonical
        // selection see the same stored paths.
        self.acquire_pictures(part, &mut observations).await;
        self.archive_contributions(part, &observations).await;

        let outcome = merge::merge_observations(&main_number, &observations);
        part.replaces = Some(Part::encode_replaces(&outcome.replaces));
        part.status = outcome.status;

        match outcome.status {
            PartStatus::NoDataFound => {
                part.part_name = None;
                part.pic = None;
                part.photo_status = None;
                info!(
                    part = %main_number,
                    "no names or replaces contributed, updating with status NoDataFound"
                );
            }
            _ => {
                part.part_name = outcome.name;
                part.pic = merge::select_picture(sources, &observations);
                part.photo_status = part.pic.as_ref().map(|_| 1);
                info!(part = %main_number, "updating canonical record with status Merged");
            }
        }

        self.api
            .update_part(part)
            .await
            .with_context(|| format!("failed to persist canonical part {main_number}"))?;
        Ok(())
    }

    /// Fetch and store every observed picture, filling in local paths.
    /// Failures degrade to "no picture from this source".
    async fn acquire_pictures(&self, part: &Part, observations: &mut [Observation]) {
        for observation in observations.iter_mut() {
            let source = observation.source.clone();
            for picture in observation.pictures.iter_mut() {
                picture.local_path = self.images.acquire(&picture.url, &source, part).await;
            }
        }
    }

    /// Append every observation's contributions to the audit trail.
    /// Write failures are logged and skipped; the trail is never read
    /// back by the pipeline.
    async fn archive_contributions(&self, part: &Part, observations: &[Observation]) {
        for observation in observations {
            let source_id = observation.source.id;

            if let Some(name) = observation.name_if_present() {
                let entry = ArchiveNameEntry {
                    part_name: truncate_name(name),
                    part_id: part.id,
                    source_id,
                    attempt_counter: observation.attempt_count,
                };
                if let Err(e) = self.api.add_name_archive(&entry).await {
                    warn!(part_id = part.id, source_id, "name archive write failed: {e}");
                }
            }

            for replace in &observation.replaces {
                let entry = ArchiveReplaceEntry {
                    replace_number: replace.clone(),
                    part_id: part.id,
                    source_id,
                    attempt_counter: observation.attempt_count,
                };
                if let Err(e) = self.api.add_replace_archive(&entry).await {
                    warn!(part_id = part.id, source_id, "replace archive write failed: {e}");
                }
            }

            for picture in &observation.pictures {
                let Some(local_path) = &picture.local_path else {
                    continue;
                };
                let entry = ArchivePictureEntry {
                    link: picture.url.clone(),
                    local_path: local_path.clone(),
                    part_id: part.id,
                    source_id,
                    attempt_counter: observation.attempt_count,
                };
                if let Err(e) = self.api.add_picture_archive(&entry).await {
                    warn!(part_id = part.id, source_id, "picture archive write failed: {e}");
                }
            }
        }
    }
}

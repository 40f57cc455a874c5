//! Scheduler loop
//!
//! Drives the pipeline on an interval: `Idle(next_run_at)` until the
//! clock passes it, then one `Running` pass over all pending parts, then
//! back to idle at `now + interval`. Parts are processed sequentially so
//! total in-flight concurrency stays bounded to one part's fan-out; each
//! part's failure is isolated and logged. A stop signal preempts the
//! loop between iterations, never mid-dispatch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::dispatcher::{self, Dispatcher};
use crate::application::reconciler::Reconciler;
use crate::domain::models::{Part, Source, SourceReachability};
use crate::infrastructure::api::{ApiClient, PendingParts};
use crate::infrastructure::health::SourceHealthChecker;

/// Interval-driven pipeline loop.
pub struct Scheduler {
    api: Arc<ApiClient>,
    health: SourceHealthChecker,
    dispatcher: Dispatcher,
    reconciler: Reconciler,
    interval: Duration,
    idle_tick: Duration,
    reactivate_sources: bool,
    cancel: CancellationToken,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<ApiClient>,
        health: SourceHealthChecker,
        dispatcher: Dispatcher,
        reconciler: Reconciler,
        interval: Duration,
        idle_tick: Duration,
        reactivate_sources: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            health,
            dispatcher,
            reconciler,
            interval,
            idle_tick,
            reactivate_sources,
            cancel,
        }
    }

    /// Run until cancelled. Errors escaping this function are fatal for
    /// the process; everything recoverable is handled inside the pass.
    pub async fn run(&self) -> Result<()> {
        let mut next_run_at = Utc::now();
        info!("scheduler started, first run now, interval {:?}", self.interval);

        while !self.cancel.is_cancelled() {
            if Utc::now() < next_run_at {
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_tick) => {}
                    _ = self.cancel.cancelled() => break,
                }
                continue;
            }

            next_run_at = self.run_pass().await?;
        }

        info!("scheduler stopped");
        Ok(())
    }

    /// One `Running` pass. Returns the next scheduled run time.
    async fn run_pass(&self) -> Result<DateTime<Utc>> {
        let reachability = self.check_sources().await?;

        let parts = match self
            .api
            .get_pending_parts()
            .await
            .context("failed to load pending parts")?
        {
            PendingParts::Found(parts) => parts,
            PendingParts::NoWork => {
                // Not an error: reschedule silently.
                return Ok(Utc::now() + self.interval);
            }
        };

        let sources: Vec<Source> = reachability.iter().map(|r| r.source.clone()).collect();
        info!(parts = parts.len(), sources = sources.len(), "processing pass");

        for part in parts {
            if self.cancel.is_cancelled() {
                break;
            }
            self.process_part(part, &reachability, &sources).await;
        }

        Ok(Utc::now() + self.interval)
    }

    /// Recompute source reachability for this pass and gate out (and
    /// deactivate) sources no proxy can reach. Failures here are fatal:
    /// without proxies and sources the pipeline cannot run.
    async fn check_sources(&self) -> Result<Vec<SourceReachability>> {
        let proxies = self
            .api
            .get_active_proxies()
            .await
            .context("failed to load proxies")?;
        let sources = if self.reactivate_sources {
            self.api
                .get_all_sources()
                .await
                .context("failed to load sources")?
        } else {
            self.api
                .get_active_sources()
                .await
                .context("failed to load sources")?
        };

        let reports = self.health.check(&proxies, &sources).await;
        Ok(self
            .health
            .gate_sources(&self.api, reports, self.reactivate_sources)
            .await)
    }

    /// Process one part, isolating any failure to this part.
    async fn process_part(
        &self,
        mut part: Part,
        reachability: &[SourceReachability],
        sources: &[Source],
    ) {
        let Some(part_number) = part.main_part_number.clone() else {
            info!(part_id = part.id, "part is missing a part number, skipping");
            return;
        };

        info!(part = %part_number, "start processing");

        let observations = self.dispatcher.dispatch(&part_number, reachability).await;
        let responsive = dispatcher::split_failed(&self.api, observations).await;

        if let Err(e) = self
            .reconciler
            .reconcile(&mut part, responsive, sources)
            .await
        {
            error!(part = %part_number, "error processing part: {e:#}");
        }

        info!(part = %part_number, "end processing");
    }
}

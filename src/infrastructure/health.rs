//! Source reachability checker
//!
//! Probes every (source, proxy) pair concurrently through leased proxies
//! and reduces the results to one report per source. Probes wait a
//! bounded time for a lease, so contention on the gate serializes the
//! probes of a shared proxy instead of discarding them; a probe that
//! still could not lease its proxy is recorded as skipped, never as a
//! failure. A source whose probes actually failed against every proxy is
//! deactivated on the backend and reported to the error log exactly
//! once, then excluded from dispatch for the pass.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::domain::models::{Proxy, Source, SourceReachability};
use crate::infrastructure::api::ApiClient;
use crate::infrastructure::proxy_gate::{ProxyClientPool, ProxyGate};

/// Result of one (source, proxy) probe.
enum ProbeOutcome {
    Usable(Proxy),
    Failed,
    /// The proxy could not be leased within the wait; not a failure.
    Skipped,
}

/// One source's probe results for a pass.
#[derive(Debug)]
pub struct ProbeReport {
    pub reachability: SourceReachability,
    /// Probes that reached the site and were rejected, errored or timed out.
    pub failed: usize,
    /// Probes abandoned because the proxy stayed at capacity.
    pub skipped: usize,
}

/// Concurrent reachability prober for active sources.
pub struct SourceHealthChecker {
    gate: Arc<ProxyGate>,
    clients: Arc<ProxyClientPool>,
    probe_timeout: Duration,
    lease_wait: Duration,
}

impl SourceHealthChecker {
    pub fn new(
        gate: Arc<ProxyGate>,
        clients: Arc<ProxyClientPool>,
        probe_timeout: Duration,
        lease_wait: Duration,
    ) -> Self {
        Self {
            gate,
            clients,
            probe_timeout,
            lease_wait,
        }
    }

    /// Probe every (source, proxy) pair and report the usable-proxy set
    /// for each source, including sources whose set came back empty.
    pub async fn check(&self, proxies: &[Proxy], sources: &[Source]) -> Vec<ProbeReport> {
        let checks = sources.iter().map(|source| async {
            let probes = proxies
                .iter()
                .map(|proxy| self.probe(source, proxy))
                .collect::<Vec<_>>();

            let mut usable = Vec::new();
            let mut failed = 0;
            let mut skipped = 0;
            for outcome in join_all(probes).await {
                match outcome {
                    ProbeOutcome::Usable(proxy) => usable.push(proxy),
                    ProbeOutcome::Failed => failed += 1,
                    ProbeOutcome::Skipped => skipped += 1,
                }
            }
            info!(
                source = %source.source_name,
                usable = usable.len(),
                failed,
                skipped,
                "reachability check complete"
            );
            ProbeReport {
                reachability: SourceReachability {
                    source: source.clone(),
                    proxies: usable,
                },
                failed,
                skipped,
            }
        });

        join_all(checks).await
    }

    /// One lightweight probe of `source` through `proxy`. The lease is
    /// awaited up to `lease_wait` so concurrent probes of one proxy take
    /// turns; a proxy that stays at capacity is skipped for the round,
    /// not treated as a failure.
    async fn probe(&self, source: &Source, proxy: &Proxy) -> ProbeOutcome {
        let Some((_, _lease)) = self
            .gate
            .acquire_first_available(std::slice::from_ref(proxy), self.lease_wait)
            .await
        else {
            debug!(
                source = %source.source_name,
                proxy_id = proxy.id,
                "proxy stayed at capacity, skipping probe this round"
            );
            return ProbeOutcome::Skipped;
        };

        let client = match self.clients.client_for(proxy) {
            Ok(client) => client,
            Err(e) => {
                warn!(proxy_id = proxy.id, "unusable proxy descriptor: {e:#}");
                return ProbeOutcome::Failed;
            }
        };

        let request = client.get(&source.base_url).send();
        match tokio::time::timeout(self.probe_timeout, request).await {
            Ok(Ok(response)) if response.status().is_success() => {
                ProbeOutcome::Usable(proxy.clone())
            }
            Ok(Ok(response)) => {
                debug!(
                    source = %source.source_name,
                    proxy_id = proxy.id,
                    status = %response.status(),
                    "probe rejected"
                );
                ProbeOutcome::Failed
            }
            Ok(Err(e)) => {
                debug!(
                    source = %source.source_name,
                    proxy_id = proxy.id,
                    "probe failed: {e}"
                );
                ProbeOutcome::Failed
            }
            Err(_) => {
                debug!(
                    source = %source.source_name,
                    proxy_id = proxy.id,
                    "probe timed out"
                );
                ProbeOutcome::Failed
            }
        }
    }

    /// Split the probe reports into dispatchable sources and dead ones.
    ///
    /// A dead source — empty usable set with at least one real probe
    /// failure — is deactivated on the backend and gets exactly one
    /// error-log entry regardless of how many proxies were attempted
    /// against it. A source whose probes were all lease-skips is
    /// excluded for the pass but stays active. When `reactivate` is set,
    /// a currently inactive source that passed its probes is re-enabled
    /// and persisted before dispatch; otherwise deactivation stays
    /// one-directional.
    pub async fn gate_sources(
        &self,
        api: &ApiClient,
        reports: Vec<ProbeReport>,
        reactivate: bool,
    ) -> Vec<SourceReachability> {
        let mut dispatchable = Vec::with_capacity(reports.len());
        for report in reports {
            let mut reachability = report.reachability;
            match decide(
                reachability.proxies.len(),
                report.failed,
                reachability.source.active,
                reactivate,
            ) {
                GateDecision::Dispatch => dispatchable.push(reachability),
                GateDecision::Reactivate => {
                    let name = reachability.source.source_name.clone();
                    info!(source = %name, "probe succeeded, reactivating source");
                    reachability.source.active = true;
                    match api.update_source(&reachability.source).await {
                        Ok(()) => dispatchable.push(reachability),
                        Err(e) => {
                            warn!(source = %name, "failed to persist source reactivation: {e}");
                        }
                    }
                }
                GateDecision::Exclude => {
                    if reachability.proxies.is_empty() && report.skipped > 0 {
                        warn!(
                            source = %reachability.source.source_name,
                            skipped = report.skipped,
                            "all probes lease-skipped, excluding source for this pass"
                        );
                    }
                }
                GateDecision::Deactivate => {
                    let name = reachability.source.source_name.clone();
                    error!(source = %name, "no suitable proxy, deactivating source");
                    reachability.source.active = false;
                    if let Err(e) = api.update_source(&reachability.source).await {
                        warn!(source = %name, "failed to persist source deactivation: {e}");
                    }
                    let message = format!("Couldn't select a suitable proxy for the site {name}");
                    if let Err(e) = api.log_error(message).await {
                        warn!(source = %name, "failed to write error log: {e}");
                    }
                }
            }
        }
        dispatchable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateDecision {
    Dispatch,
    Reactivate,
    /// Left out of this pass without a status change or error log.
    Exclude,
    Deactivate,
}

/// Gate policy for one source given its probe counts. Only real probe
/// failures may deactivate; an empty usable set made entirely of
/// lease-skips keeps the source active.
fn decide(usable: usize, failed: usize, active: bool, reactivate: bool) -> GateDecision {
    if usable > 0 {
        if active {
            GateDecision::Dispatch
        } else if reactivate {
            GateDecision::Reactivate
        } else {
            GateDecision::Exclude
        }
    } else if !active || failed == 0 {
        GateDecision::Exclude
    } else {
        GateDecision::Deactivate
    }
}

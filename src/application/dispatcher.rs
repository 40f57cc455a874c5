//! Per-part concurrent dispatch
//!
//! Fans one part-number lookup out to every source that still has a
//! usable proxy, running all source invocations concurrently and joining
//! them before reconciliation. Each invocation is fully isolated: a
//! timeout, transport error or parser failure on one source never
//! cancels or affects another. Every attempted source yields exactly one
//! `Observation`; a source that did not respond yields one flagged
//! `failed`. A source with no registered parser strategy is a local
//! capability gap, not an unresponsive site: it is logged and left out
//! of the fan-out entirely.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::domain::models::{Observation, ObservedPicture, Source, SourceReachability};
use crate::domain::normalize;
use crate::infrastructure::api::ApiClient;
use crate::infrastructure::proxy_gate::{ProxyClientPool, ProxyGate};

use super::parsers::{ParserRegistry, ScrapedPart, SourceScraper};

/// Fans a part lookup out across sources.
pub struct Dispatcher {
    registry: ParserRegistry,
    gate: Arc<ProxyGate>,
    clients: Arc<ProxyClientPool>,
    scrape_timeout: Duration,
    lease_wait: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: ParserRegistry,
        gate: Arc<ProxyGate>,
        clients: Arc<ProxyClientPool>,
        scrape_timeout: Duration,
        lease_wait: Duration,
    ) -> Self {
        Self {
            registry,
            gate,
            clients,
            scrape_timeout,
            lease_wait,
        }
    }

    /// Look `part_number` up on every dispatchable source concurrently.
    ///
    /// Completion order is irrelevant; the join waits for all attempted
    /// sources so the reconciler never sees a partial set.
    pub async fn dispatch(
        &self,
        part_number: &str,
        reachability: &[SourceReachability],
    ) -> Vec<Observation> {
        let lookups = reachability
            .iter()
            .filter(|r| !r.proxies.is_empty())
            .filter_map(|r| {
                let Some(strategy) = self.registry.get(&r.source.source_name) else {
                    warn!(
                        source = %r.source.source_name,
                        "no parser strategy registered, skipping source"
                    );
                    return None;
                };
                Some(self.scrape_one(part_number, r, strategy))
            });
        join_all(lookups).await
    }

    /// One isolated source invocation: lease a proxy, run the strategy
    /// under a hard timeout, and fold every failure mode into a failed
    /// observation.
    async fn scrape_one(
        &self,
        part_number: &str,
        reachability: &SourceReachability,
        strategy: Arc<dyn SourceScraper>,
    ) -> Observation {
        let source = &reachability.source;

        let Some((proxy, _lease)) = self
            .gate
            .acquire_first_available(&reachability.proxies, self.lease_wait)
            .await
        else {
            warn!(source = %source.source_name, "all usable proxies at capacity");
            return Observation::failed(source.clone());
        };

        let client = match self.clients.client_for(&proxy) {
            Ok(client) => client,
            Err(e) => {
                warn!(proxy_id = proxy.id, "unusable proxy descriptor: {e:#}");
                return Observation::failed(source.clone());
            }
        };

        debug!(
            source = %source.source_name,
            proxy_id = proxy.id,
            part = part_number,
            "scraping"
        );

        let invocation = strategy.scrape(part_number, &source.base_url, &client);
        match tokio::time::timeout(self.scrape_timeout, invocation).await {
            Ok(Ok(scraped)) => into_observation(source.clone(), scraped),
            Ok(Err(e)) => {
                info!(source = %source.source_name, part = part_number, "scrape failed: {e}");
                Observation::failed(source.clone())
            }
            Err(_) => {
                info!(
                    source = %source.source_name,
                    part = part_number,
                    "scrape timed out after {:?}",
                    self.scrape_timeout
                );
                Observation::failed(source.clone())
            }
        }
    }
}

fn into_observation(source: Source, scraped: ScrapedPart) -> Observation {
    let name = scraped
        .name
        .map(|n| normalize::text(&n))
        .filter(|n| !n.is_empty());
    Observation {
        source,
        name,
        replaces: scraped.replaces,
        pictures: scraped
            .picture_urls
            .into_iter()
            .map(ObservedPicture::new)
            .collect(),
        attempt_count: scraped.attempts.max(1),
        failed: false,
    }
}

/// Caller-facing post-processing for failed observations: deactivate the
/// source, write one error-log entry, and hand only the responsive
/// observations on to reconciliation. Backend write failures are logged
/// and the step is abandoned for this cycle.
pub async fn split_failed(api: &ApiClient, observations: Vec<Observation>) -> Vec<Observation> {
    let mut responsive = Vec::with_capacity(observations.len());
    for mut observation in observations {
        if !observation.failed {
            responsive.push(observation);
            continue;
        }

        let name = observation.source.source_name.clone();
        error!(source = %name, "source not responding, deactivating");
        observation.source.active = false;
        if let Err(e) = api.update_source(&observation.source).await {
            warn!(source = %name, "failed to persist source deactivation: {e}");
        }
        if let Err(e) = api.log_error(format!("Site {name} not responding")).await {
            warn!(source = %name, "failed to write error log: {e}");
        }
    }
    responsive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::parsers::{ScrapeError, SourceScraper};
    use async_trait::async_trait;

    struct StubScraper {
        name: &'static str,
        result: Result<ScrapedPart, ()>,
        delay: Duration,
    }

    #[async_trait]
    impl SourceScraper for StubScraper {
        fn source_name(&self) -> &'static str {
            self.name
        }

        async fn scrape(
            &self,
            _part_number: &str,
            _base_url: &str,
            _client: &reqwest::Client,
        ) -> Result<ScrapedPart, ScrapeError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone().map_err(|()| ScrapeError::Selector("stub failure".to_string()))
        }
    }

    fn source(id: i64, name: &'static str) -> Source {
        Source {
            id,
            source_name: name.to_string(),
            base_url: "https://example.invalid".to_string(),
            confidence: id as i32,
            active: true,
        }
    }

    fn proxy(id: i64) -> crate::domain::models::Proxy {
        crate::domain::models::Proxy {
            id,
            address: format!("http://10.0.0.{id}:3128"),
            active: true,
        }
    }

    fn dispatcher(registry: ParserRegistry, scrape_timeout: Duration) -> Dispatcher {
        Dispatcher::new(
            registry,
            Arc::new(ProxyGate::new(2)),
            Arc::new(ProxyClientPool::new("test-agent", Duration::from_secs(5))),
            scrape_timeout,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn one_failing_source_does_not_affect_the_others() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubScraper {
            name: "good",
            result: Ok(ScrapedPart {
                name: Some("Ice Kit".to_string()),
                attempts: 1,
                ..ScrapedPart::default()
            }),
            delay: Duration::ZERO,
        }));
        registry.register(Arc::new(StubScraper {
            name: "bad",
            result: Err(()),
            delay: Duration::ZERO,
        }));

        let dispatcher = dispatcher(registry, Duration::from_secs(5));
        let reachability = vec![
            SourceReachability {
                source: source(1, "good"),
                proxies: vec![proxy(1)],
            },
            SourceReachability {
                source: source(2, "bad"),
                proxies: vec![proxy(1)],
            },
        ];

        let observations = dispatcher.dispatch("12345", &reachability).await;
        assert_eq!(observations.len(), 2);
        let good = observations.iter().find(|o| o.source.id == 1).unwrap();
        let bad = observations.iter().find(|o| o.source.id == 2).unwrap();
        assert!(!good.failed);
        assert_eq!(good.name.as_deref(), Some("Ice Kit"));
        assert!(bad.failed);
    }

    #[tokio::test]
    async fn timed_out_source_becomes_a_failed_observation() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubScraper {
            name: "slow",
            result: Ok(ScrapedPart::default()),
            delay: Duration::from_secs(60),
        }));

        let dispatcher = dispatcher(registry, Duration::from_millis(50));
        let reachability = vec![SourceReachability {
            source: source(1, "slow"),
            proxies: vec![proxy(1)],
        }];

        let observations = dispatcher.dispatch("12345", &reachability).await;
        assert_eq!(observations.len(), 1);
        assert!(observations[0].failed);
    }

    #[tokio::test]
    async fn unregistered_source_is_skipped_not_failed() {
        // A missing parser strategy is our gap, not the site's fault: the
        // source yields no observation at all, so it can never reach the
        // not-responding deactivation path.
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubScraper {
            name: "known",
            result: Ok(ScrapedPart::default()),
            delay: Duration::ZERO,
        }));

        let dispatcher = dispatcher(registry, Duration::from_secs(1));
        let reachability = vec![
            SourceReachability {
                source: source(1, "mystery"),
                proxies: vec![proxy(1)],
            },
            SourceReachability {
                source: source(2, "known"),
                proxies: vec![proxy(1)],
            },
        ];

        let observations = dispatcher.dispatch("12345", &reachability).await;
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].source.id, 2);
        assert!(!observations[0].failed);
    }

    #[tokio::test]
    async fn sources_without_proxies_are_not_attempted() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubScraper {
            name: "good",
            result: Ok(ScrapedPart::default()),
            delay: Duration::ZERO,
        }));

        let dispatcher = dispatcher(registry, Duration::from_secs(1));
        let reachability = vec![
            SourceReachability {
                source: source(1, "good"),
                proxies: vec![proxy(1)],
            },
            SourceReachability {
                source: source(2, "good"),
                proxies: Vec::new(),
            },
        ];

        let observations = dispatcher.dispatch("12345", &reachability).await;
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].source.id, 1);
    }

    #[tokio::test]
    async fn empty_scrape_result_is_not_a_failure() {
        let mut registry = ParserRegistry::new();
        registry.register(Arc::new(StubScraper {
            name: "empty",
            result: Ok(ScrapedPart::default()),
            delay: Duration::ZERO,
        }));

        let dispatcher = dispatcher(registry, Duration::from_secs(1));
        let reachability = vec![SourceReachability {
            source: source(1, "empty"),
            proxies: vec![proxy(1)],
        }];

        let observations = dispatcher.dispatch("12345", &reachability).await;
        assert!(!observations[0].failed);
        assert!(observations[0].name.is_none());
        assert!(observations[0].replaces.is_empty());
    }
}

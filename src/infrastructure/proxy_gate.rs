//! Proxy lease gate and per-proxy HTTP client pool
//!
//! The gate caps concurrent use of each egress proxy so no single egress
//! point is overloaded or blacklisted by a target site. State is
//! process-local and in-memory; an acquire at capacity reports back
//! immediately instead of blocking, so callers can pick another proxy or
//! defer. The client pool builds one reqwest client per proxy and reuses
//! it for every probe and scrape routed through that proxy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::models::Proxy;

/// Outcome of a non-blocking lease attempt.
#[derive(Debug)]
pub enum AcquireOutcome {
    Leased(ProxyLease),
    AtCapacity,
}

/// Per-proxy concurrency gate.
///
/// Explicitly owned and passed in by the caller; there is no ambient
/// global state. Lease counters are the only cross-task mutable state in
/// the pipeline and are serialized behind one mutex.
#[derive(Debug)]
pub struct ProxyGate {
    max_per_proxy: usize,
    in_use: Mutex<HashMap<i64, usize>>,
}

impl ProxyGate {
    pub fn new(max_per_proxy: usize) -> Self {
        Self {
            max_per_proxy: max_per_proxy.max(1),
            in_use: Mutex::new(HashMap::new()),
        }
    }

    /// Try to lease `proxy`. Never blocks: a proxy at its cap yields
    /// `AtCapacity` so the caller can choose a different proxy or defer.
    pub fn try_acquire(self: &Arc<Self>, proxy: &Proxy) -> AcquireOutcome {
        let mut in_use = self.in_use.lock().expect("proxy gate lock poisoned");
        let count = in_use.entry(proxy.id).or_insert(0);
        if *count >= self.max_per_proxy {
            debug!(proxy_id = proxy.id, "proxy at capacity");
            return AcquireOutcome::AtCapacity;
        }
        *count += 1;
        AcquireOutcome::Leased(ProxyLease {
            gate: Arc::clone(self),
            proxy_id: proxy.id,
        })
    }

    /// Lease the first available proxy out of `candidates`, retrying on a
    /// short tick until `wait` elapses. Returns the leased proxy together
    /// with its lease, or `None` if every candidate stayed at capacity.
    pub async fn acquire_first_available(
        self: &Arc<Self>,
        candidates: &[Proxy],
        wait: Duration,
    ) -> Option<(Proxy, ProxyLease)> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            for proxy in candidates {
                if let AcquireOutcome::Leased(lease) = self.try_acquire(proxy) {
                    return Some((proxy.clone(), lease));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    fn release(&self, proxy_id: i64) {
        let mut in_use = self.in_use.lock().expect("proxy gate lock poisoned");
        if let Some(count) = in_use.get_mut(&proxy_id) {
            *count = count.saturating_sub(1);
        }
    }

    #[cfg(test)]
    fn leases_for(&self, proxy_id: i64) -> usize {
        *self
            .in_use
            .lock()
            .expect("proxy gate lock poisoned")
            .get(&proxy_id)
            .unwrap_or(&0)
    }
}

/// RAII lease on one proxy slot; released on drop.
#[derive(Debug)]
pub struct ProxyLease {
    gate: Arc<ProxyGate>,
    proxy_id: i64,
}

impl ProxyLease {
    pub fn proxy_id(&self) -> i64 {
        self.proxy_id
    }
}

impl Drop for ProxyLease {
    fn drop(&mut self) {
        self.gate.release(self.proxy_id);
    }
}

/// Pool of HTTP clients, one per proxy, shared by the health checker and
/// the dispatcher so connection pools are reused across a pass.
#[derive(Debug, Default)]
pub struct ProxyClientPool {
    user_agent: String,
    timeout: Duration,
    clients: Mutex<HashMap<i64, reqwest::Client>>,
}

impl ProxyClientPool {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Client whose traffic egresses through `proxy`, built on first use.
    /// Target sites present a long tail of broken certificate chains, so
    /// certificate validation is disabled on scrape traffic.
    pub fn client_for(&self, proxy: &Proxy) -> Result<reqwest::Client> {
        let mut clients = self.clients.lock().expect("client pool lock poisoned");
        if let Some(client) = clients.get(&proxy.id) {
            return Ok(client.clone());
        }

        let upstream = reqwest::Proxy::all(&proxy.address)
            .with_context(|| format!("Invalid proxy address: {}", proxy.address))?;
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true)
            .proxy(upstream)
            .build()
            .context("Failed to build proxied HTTP client")?;

        clients.insert(proxy.id, client.clone());
        Ok(client)
    }

    /// Drop cached clients for proxies that are no longer active.
    pub fn retain(&self, active: &[Proxy]) {
        let mut clients = self.clients.lock().expect("client pool lock poisoned");
        clients.retain(|id, _| active.iter().any(|p| p.id == *id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(id: i64) -> Proxy {
        Proxy {
            id,
            address: format!("http://10.0.0.{id}:3128"),
            active: true,
        }
    }

    #[test]
    fn acquire_up_to_cap_then_at_capacity() {
        let gate = Arc::new(ProxyGate::new(2));
        let p = proxy(1);

        let a = gate.try_acquire(&p);
        let b = gate.try_acquire(&p);
        assert!(matches!(a, AcquireOutcome::Leased(_)));
        assert!(matches!(b, AcquireOutcome::Leased(_)));
        assert!(matches!(gate.try_acquire(&p), AcquireOutcome::AtCapacity));
    }

    #[test]
    fn dropping_a_lease_frees_the_slot() {
        let gate = Arc::new(ProxyGate::new(1));
        let p = proxy(1);

        let lease = match gate.try_acquire(&p) {
            AcquireOutcome::Leased(lease) => lease,
            AcquireOutcome::AtCapacity => panic!("fresh gate must lease"),
        };
        assert!(matches!(gate.try_acquire(&p), AcquireOutcome::AtCapacity));

        drop(lease);
        assert_eq!(gate.leases_for(1), 0);
        assert!(matches!(gate.try_acquire(&p), AcquireOutcome::Leased(_)));
    }

    #[test]
    fn proxies_are_gated_independently() {
        let gate = Arc::new(ProxyGate::new(1));
        let _a = gate.try_acquire(&proxy(1));
        assert!(matches!(gate.try_acquire(&proxy(2)), AcquireOutcome::Leased(_)));
    }

    #[tokio::test]
    async fn acquire_first_available_skips_busy_proxies() {
        let gate = Arc::new(ProxyGate::new(1));
        let busy = proxy(1);
        let free = proxy(2);
        let _held = gate.try_acquire(&busy);

        let leased = gate
            .acquire_first_available(&[busy, free], Duration::from_millis(50))
            .await;
        let (picked, _lease) = leased.expect("second proxy is free");
        assert_eq!(picked.id, 2);
    }

    #[tokio::test]
    async fn acquire_first_available_times_out_when_all_busy() {
        let gate = Arc::new(ProxyGate::new(1));
        let p = proxy(1);
        let _held = gate.try_acquire(&p);

        let leased = gate
            .acquire_first_available(std::slice::from_ref(&p), Duration::from_millis(60))
            .await;
        assert!(leased.is_none());
    }

    #[tokio::test]
    async fn concurrent_acquire_release_never_exceeds_cap() {
        let gate = Arc::new(ProxyGate::new(3));
        let p = proxy(1);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    if let AcquireOutcome::Leased(lease) = gate.try_acquire(&p) {
                        tokio::task::yield_now().await;
                        drop(lease);
                    } else {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(gate.leases_for(1), 0);
    }
}

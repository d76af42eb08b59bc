use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::config::DnsConfig;

use super::{ReverseResolver, SystemResolver};

/// Where a cached hostname came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Observed in a DNS answer on the wire.
    Forward,
    /// Returned by a reverse lookup.
    Reverse,
    /// A reverse lookup found nothing (or timed out).
    Negative,
}

/// Cached knowledge about one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub hostname: Option<String>,
    pub provenance: Provenance,
}

/// Shared IP-to-hostname map.
///
/// Forward entries come from observed A/AAAA answers and always win.
/// Reverse results (including misses) are cached per address, and concurrent
/// first lookups for one address share a single resolver call.
pub struct DnsCache {
    forward: RwLock<HashMap<IpAddr, String>>,
    reverse: Mutex<HashMap<IpAddr, Arc<OnceCell<Option<String>>>>>,
    resolver: Arc<dyn ReverseResolver>,
    config: DnsConfig,
    lookups: AtomicU64,
}

impl DnsCache {
    /// Cache backed by the system resolver.
    pub fn new(config: DnsConfig) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    pub fn with_resolver(config: DnsConfig, resolver: Arc<dyn ReverseResolver>) -> Self {
        Self {
            forward: RwLock::new(HashMap::new()),
            reverse: Mutex::new(HashMap::new()),
            resolver,
            config,
            lookups: AtomicU64::new(0),
        }
    }

    /// Record an observed answer. The last answer for an address wins.
    pub fn record_answer(&self, ip: IpAddr, hostname: &str) {
        let Some(name) = normalize(hostname) else {
            return;
        };
        trace!(%ip, hostname = %name, "recording DNS answer");
        self.forward.write().insert(ip, name);
    }

    /// Hostname from observed answers only.
    pub fn forward(&self, ip: IpAddr) -> Option<String> {
        self.forward.read().get(&ip).cloned()
    }

    /// Best known hostname for `ip`, performing a bounded reverse lookup
    /// the first time an address without a forward entry is seen.
    pub async fn resolve(&self, ip: IpAddr) -> Option<String> {
        if let Some(name) = self.forward(ip) {
            return Some(name);
        }
        if !self.config.reverse_lookup {
            return None;
        }

        let cell = self.reverse.lock().entry(ip).or_default().clone();
        cell.get_or_init(|| self.reverse_lookup(ip)).await.clone()
    }

    async fn reverse_lookup(&self, ip: IpAddr) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.config.lookup_timeout, self.resolver.lookup_addr(ip)).await
        {
            Ok(Some(name)) => normalize(&name),
            Ok(None) => None,
            Err(_) => {
                debug!(%ip, timeout = ?self.config.lookup_timeout, "reverse lookup timed out");
                None
            }
        }
    }

    /// What the cache currently knows about `ip`, without resolving.
    pub fn entry(&self, ip: IpAddr) -> Option<CacheEntry> {
        if let Some(name) = self.forward(ip) {
            return Some(CacheEntry {
                hostname: Some(name),
                provenance: Provenance::Forward,
            });
        }
        let cell = self.reverse.lock().get(&ip).cloned()?;
        let result = cell.get()?;
        Some(match result {
            Some(name) => CacheEntry {
                hostname: Some(name.clone()),
                provenance: Provenance::Reverse,
            },
            None => CacheEntry {
                hostname: None,
                provenance: Provenance::Negative,
            },
        })
    }

    /// Number of reverse lookups issued to the resolver.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of forward entries.
    pub fn forward_len(&self) -> usize {
        self.forward.read().len()
    }
}

impl std::fmt::Debug for DnsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsCache")
            .field("forward", &self.forward_len())
            .field("reverse", &self.reverse.lock().len())
            .field("lookups", &self.lookup_count())
            .finish()
    }
}

/// Strip the trailing root dot; empty names are no names.
fn normalize(hostname: &str) -> Option<String> {
    let name = hostname.trim().trim_end_matches('.');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

use std::net::IpAddr;

use async_trait::async_trait;
use tracing::{debug, trace};

/// Backend for reverse (PTR) lookups.
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    /// Name for `ip`, or `None` when there is none.
    async fn lookup_addr(&self, ip: IpAddr) -> Option<String>;
}

/// Reverse lookups through the operating system resolver.
///
/// `getnameinfo` blocks, so each lookup runs on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl ReverseResolver for SystemResolver {
    async fn lookup_addr(&self, ip: IpAddr) -> Option<String> {
        match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip)).await {
            // getnameinfo falls back to the numeric form when no PTR exists
            Ok(Ok(name)) if name != ip.to_string() => Some(name),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                trace!(%ip, error = %e, "reverse lookup failed");
                None
            }
            Err(e) => {
                debug!(%ip, error = %e, "reverse lookup task failed");
                None
            }
        }
    }
}

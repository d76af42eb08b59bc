//! Analysis configuration.
//!
//! All limits that bound memory or time live here so the CLI can map its
//! flags onto them and tests can shrink them.

use std::time::Duration;

/// Hard cap on the number of body bytes kept per HTTP message (1 MiB).
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Ports excluded from TCP stream analysis by default.
///
/// These carry protocols that are never HTTP (SSH, Telnet, SMTP, POP3, IMAP
/// and their TLS variants).
pub const DEFAULT_IGNORED_PORTS: [u16; 7] = [22, 23, 25, 110, 143, 993, 995];

/// Configuration for the StreamManager and the per-direction parsers.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum out-of-order bytes buffered per direction before the
    /// direction is abandoned.
    pub max_pending_bytes: usize,
    /// Maximum body bytes kept per HTTP message.
    pub max_body_size: usize,
    /// Maximum size of an HTTP start line plus header block.
    pub max_head_size: usize,
    /// Decode `Transfer-Encoding: chunked` bodies.
    pub decode_chunked: bool,
    /// Flows idle for longer than this (capture time, microseconds) are
    /// finalized.
    pub idle_timeout_us: i64,
    /// Time given to parsing tasks to finish after end of input.
    pub drain_grace: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: 4 * 1024 * 1024, // 4 MB per direction
            max_body_size: MAX_BODY_SIZE,
            max_head_size: 64 * 1024,
            decode_chunked: true,
            idle_timeout_us: 300_000_000, // 5 minutes
            drain_grace: Duration::from_secs(2),
        }
    }
}

/// Configuration for hostname correlation.
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// Fall back to reverse DNS when no forward answer was observed.
    pub reverse_lookup: bool,
    /// Upper bound for a single reverse lookup.
    pub lookup_timeout: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            reverse_lookup: true,
            lookup_timeout: Duration::from_secs(2),
        }
    }
}

/// Top-level configuration for an analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub stream: StreamConfig,
    pub dns: DnsConfig,
    /// Emit DNS query/response observations as events.
    pub report_dns: bool,
    /// TCP flows touching any of these ports are not reassembled.
    pub ignored_ports: Vec<u16>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            dns: DnsConfig::default(),
            report_dns: false,
            ignored_ports: DEFAULT_IGNORED_PORTS.to_vec(),
        }
    }
}

impl AnalyzerConfig {
    /// Whether a TCP flow between these ports should be analyzed.
    pub fn should_track(&self, src_port: u16, dst_port: u16) -> bool {
        !self.ignored_ports.contains(&src_port) && !self.ignored_ports.contains(&dst_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.stream.max_body_size, 1024 * 1024);
        assert!(config.stream.decode_chunked);
        assert!(config.dns.reverse_lookup);
        assert_eq!(config.dns.lookup_timeout, Duration::from_secs(2));
        assert!(!config.report_dns);
    }

    #[test]
    fn test_should_track() {
        let config = AnalyzerConfig::default();
        assert!(config.should_track(54321, 80));
        assert!(config.should_track(54321, 443));
        assert!(!config.should_track(54321, 22));
        assert!(!config.should_track(25, 40000));
    }
}

//! Command-line argument definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use pcapwire_core::config::{AnalyzerConfig, DnsConfig, StreamConfig, MAX_BODY_SIZE};

use super::OutputFormat;

/// Reconstruct HTTP conversations and DNS lookups from a packet capture.
#[derive(Parser, Debug)]
#[command(name = "pcapwire")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PCAP or PCAPNG file to analyze (may be gzip-compressed)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Report DNS queries and responses
    #[arg(short = 'd', long = "dns")]
    pub dns: bool,

    /// Output format for stdout
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Never perform reverse DNS lookups
    #[arg(long = "no-rdns")]
    pub no_rdns: bool,

    /// Upper bound for a single reverse DNS lookup
    #[arg(long = "rdns-timeout", value_name = "SECS", default_value = "2")]
    pub rdns_timeout: u64,

    /// Do not decode chunked transfer encoding
    #[arg(long = "no-chunked")]
    pub no_chunked: bool,

    /// Maximum body bytes kept per HTTP message (at most 1 MiB)
    #[arg(long = "max-body", value_name = "BYTES", default_value_t = MAX_BODY_SIZE)]
    pub max_body: usize,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Map the flags onto an analysis configuration.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            stream: StreamConfig {
                max_body_size: self.max_body.min(MAX_BODY_SIZE),
                decode_chunked: !self.no_chunked,
                ..StreamConfig::default()
            },
            dns: DnsConfig {
                reverse_lookup: !self.no_rdns,
                lookup_timeout: Duration::from_secs(self.rdns_timeout),
            },
            report_dns: self.dns,
            ..AnalyzerConfig::default()
        }
    }

    /// Default log filter for the `-v` count.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pcapwire", "capture.pcap"]).unwrap();
        assert_eq!(args.file, PathBuf::from("capture.pcap"));
        assert_eq!(args.format, OutputFormat::Text);
        assert_eq!(args.log_filter(), "warn");

        let config = args.analyzer_config();
        assert!(!config.report_dns);
        assert!(config.dns.reverse_lookup);
        assert!(config.stream.decode_chunked);
        assert_eq!(config.stream.max_body_size, MAX_BODY_SIZE);
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "pcapwire",
            "-d",
            "--format",
            "json",
            "--no-rdns",
            "--rdns-timeout",
            "5",
            "--no-chunked",
            "--max-body",
            "4096",
            "-vv",
            "capture.pcap.gz",
        ])
        .unwrap();

        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.log_filter(), "debug");

        let config = args.analyzer_config();
        assert!(config.report_dns);
        assert!(!config.dns.reverse_lookup);
        assert_eq!(config.dns.lookup_timeout, Duration::from_secs(5));
        assert!(!config.stream.decode_chunked);
        assert_eq!(config.stream.max_body_size, 4096);
    }

    #[test]
    fn test_file_required() {
        assert!(Args::try_parse_from(["pcapwire"]).is_err());
    }

    #[test]
    fn test_max_body_clamped() {
        let args =
            Args::try_parse_from(["pcapwire", "--max-body", "50000000", "capture.pcap"]).unwrap();
        assert_eq!(args.analyzer_config().stream.max_body_size, MAX_BODY_SIZE);
    }
}

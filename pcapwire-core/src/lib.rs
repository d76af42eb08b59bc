//! # pcapwire-core
//!
//! Offline reconstruction of HTTP/1.x conversations from packet captures,
//! with hostnames correlated from the DNS traffic in the same capture.
//!
//! ## Features
//!
//! - **Capture Reading**: PCAP and PCAPNG, optionally gzip-compressed
//! - **Packet Decoding**: Ethernet (with VLAN tags), Linux SLL, raw IP and
//!   BSD loopback; IPv4, IPv6, TCP and UDP
//! - **TCP Reassembly**: Per-direction ordering with bounded out-of-order
//!   buffering and sequence wraparound
//! - **HTTP Parsing**: Incremental request/response framing, chunked
//!   transfer decoding and gzip bodies
//! - **DNS Correlation**: Hostnames from observed answers, with cached
//!   reverse lookups as fallback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pcapwire_core::{Analyzer, AnalyzerConfig, Event};
//!
//! # async fn run() -> pcapwire_core::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let analyzer = Analyzer::new(AnalyzerConfig::default(), tx);
//!
//! let printer = tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         if let Event::HttpRequest(req) = event {
//!             println!("{} {}", req.method, req.url);
//!         }
//!     }
//! });
//!
//! let summary = analyzer.run("capture.pcap").await?;
//! printer.await.ok();
//! println!("{} packets", summary.packets);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        pcapwire-core                                |
//! +---------------------------------------------------------------------+
//! |  io/         - PCAP/PCAPNG reading, gzip decompression              |
//! |  protocol/   - Link/IP/TCP/UDP decoding, DNS wire format            |
//! |  dns/        - Hostname cache and reverse resolver                  |
//! |  stream/     - Flow tracking, reassembly, HTTP parsing tasks        |
//! |  analyzer    - Reader -> decoder -> manager pipeline                |
//! |  event       - Observations delivered to the caller                 |
//! |  config      - Limits and switches                                  |
//! |  error       - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```

pub mod analyzer;
pub mod config;
pub mod dns;
pub mod error;
pub mod event;
pub mod io;
pub mod protocol;
pub mod stream;

pub use analyzer::{AnalysisSummary, Analyzer};
pub use config::{AnalyzerConfig, DnsConfig, StreamConfig};
pub use dns::{DnsCache, ReverseResolver, SystemResolver};
pub use error::{Error, PcapError, Result};
pub use event::Event;
pub use io::{PcapReader, RawPacket};
pub use protocol::{CaptureRecord, DnsAnswer, RecordType, Transport};
pub use stream::{
    Body, Direction, Endpoint, Headers, HttpMessage, HttpRequest, HttpResponse, ManagerStats,
    StreamManager, TcpFlags,
};

//! TCP stream processing and HTTP reconstruction.
//!
//! This module tracks TCP flows, reassembles each direction into an ordered
//! byte stream, and hands that stream to a per-direction task that
//! classifies it and parses HTTP/1.x messages.
//!
//! ## Components
//!
//! - [`FlowTracker`] - Tracks TCP flows by normalized key
//! - [`TcpReassembler`] - Reassembles TCP segments into ordered byte runs
//! - [`classify`] - Decides what a direction carries from its first bytes
//! - [`HttpStreamParser`] - Incremental HTTP/1.x message framing
//! - [`StreamManager`] - Coordinates tracking, reassembly, and parsing tasks
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use pcapwire_core::config::{DnsConfig, StreamConfig};
//! use pcapwire_core::dns::DnsCache;
//! use pcapwire_core::stream::{StreamManager, TcpFlags};
//!
//! # async fn run() {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let dns = Arc::new(DnsCache::new(DnsConfig::default()));
//! let mut manager = StreamManager::new(StreamConfig::default(), dns, tx);
//!
//! // Process TCP segments from packets...
//! // manager.process_segment(...);
//!
//! let stats = manager.finish().await;
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

pub mod classifier;
mod connection;
mod context;
mod manager;
pub mod message;
pub mod parsers;
mod reassembly;
mod task;

pub use classifier::{classify, MIN_CLASSIFY_BYTES};
pub use connection::{ConnectionKey, Flow, FlowTracker, TcpFlags};
pub use context::{Direction, StreamChunk, StreamContext, StreamRole};
pub use manager::{ManagerStats, StreamManager};
pub use message::{Body, Endpoint, Headers, HttpMessage, HttpRequest, HttpResponse};
pub use parsers::HttpStreamParser;
pub use reassembly::{Delivery, Segment, StreamBuffer, StreamKey, StreamStats, TcpReassembler};
pub use task::DirectionSummary;

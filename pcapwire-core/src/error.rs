//! Error types for pcapwire-core.
//!
//! Only capture-source failures surface as errors. Everything that goes wrong
//! inside a single flow or message (framing, decompression, reverse lookups)
//! is contained where it happens and never reaches the caller.
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`PcapError`] - Errors from capture file reading

use thiserror::Error;

/// Main error type for pcapwire-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing the capture file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture reader stopped before the analysis finished consuming it.
    #[error("capture reader terminated unexpectedly: {reason}")]
    ReaderAborted { reason: String },
}

/// Errors related to capture file reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

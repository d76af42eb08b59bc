//! pcapwire - Reconstruct HTTP conversations and DNS lookups from packet captures.
//!
//! The analysis engine lives in [`pcapwire_core`]; this crate adds the
//! command-line front end.
//!
//! # Example
//!
//! ```no_run
//! use pcapwire::cli::{OutputFormat, OutputFormatter};
//! use pcapwire_core::{Analyzer, AnalyzerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let formatter = OutputFormatter::new(OutputFormat::Json);
//!     let printer = tokio::spawn(async move {
//!         let mut out = std::io::stdout();
//!         while let Some(event) = rx.recv().await {
//!             formatter.write_event(&event, &mut out)?;
//!         }
//!         Ok::<_, std::io::Error>(())
//!     });
//!     Analyzer::new(AnalyzerConfig::default(), tx).run("capture.pcap").await?;
//!     printer.await??;
//!     Ok(())
//! }
//! ```

pub mod cli;

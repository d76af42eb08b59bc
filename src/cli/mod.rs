//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Event formatting (text report blocks or JSON Lines)
//! - The end-of-run summary table

mod args;
mod output;

pub use args::Args;
pub use output::{event_json, format_timestamp, summary_table, OutputFormat, OutputFormatter};

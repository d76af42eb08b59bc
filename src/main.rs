//! pcapwire CLI entry point.

use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pcapwire::cli::{summary_table, Args, OutputFormatter};
use pcapwire_core::Analyzer;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays a clean report
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_filter().into()),
        )
        .init();

    let config = args.analyzer_config();
    let formatter = OutputFormatter::new(args.format);

    {
        let mut stdout = io::stdout().lock();
        formatter.write_banner(&args.file, config.report_dns, &mut stdout)?;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut out = BufWriter::new(io::stdout());
        while let Some(event) = rx.recv().await {
            formatter.write_event(&event, &mut out)?;
            out.flush()?;
        }
        Ok::<_, io::Error>(())
    });

    let summary = Analyzer::new(config, tx)
        .run(&args.file)
        .await
        .with_context(|| format!("Failed to analyze capture: {}", args.file.display()))?;

    printer
        .await
        .context("output task panicked")?
        .context("Failed to write output")?;

    info!(
        packets = summary.packets,
        messages = summary.streams.messages,
        "analysis complete"
    );

    let mut stdout = io::stdout().lock();
    formatter.write_footer(&mut stdout)?;
    eprintln!("{}", summary_table(&summary));

    Ok(())
}

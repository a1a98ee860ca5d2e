use anyhow::{Context, Result};
use clap::Parser;
use hbtrace::{AnalysisConfig, Analyzer, RecordingCommandSender, TraceReader, core::logger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "hbtrace - Happens-Before Replay and Deadlock Detection for Recorded Traces"
)]
struct Cli {
    /// Trace to analyze (JSON lines, one recorded event per line)
    trace: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the structured replay log here ("{timestamp}" is expanded)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Also write the final report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if cli.log.is_some() {
        config.log_path = cli.log;
    }
    if cli.report.is_some() {
        config.report_path = cli.report;
    }
    let report_path = config.report_path.clone();

    // No agent is attached to a recorded trace; snapshot requests are only kept
    let mut pipeline = Analyzer::new()
        .with_config(config)
        .command_sender(Arc::new(RecordingCommandSender::new()))
        .start()?;

    for event in TraceReader::open(&cli.trace)? {
        pipeline.process(event?).context("Analysis stopped")?;
    }
    logger::flush_logs()?;

    let json = serde_json::to_string_pretty(&pipeline.report()).context("Failed to serialize report")?;
    if let Some(path) = report_path {
        std::fs::write(&path, &json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    println!("{json}");
    Ok(())
}

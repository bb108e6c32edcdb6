//! strata - deterministic procedural world generation
//!
//! Driver executable: generates a chunk region from a TOML config and writes
//! an event log plus a metrics report.

mod config;
mod driver;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use config::GenerationConfig;
use strata_testkit::{JsonlSink, MetricsSink};
use strata_world::ExecutionMode;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "strata", version, about = "Generate a region of voxel terrain")]
struct CliOptions {
    /// Configuration file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Override the world seed
    #[arg(long)]
    seed: Option<u64>,
    /// Override the chunk region as min_x,min_z,max_x,max_z
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    region: Option<Vec<i32>>,
    /// Run feature subtasks on this many worker threads
    #[arg(long)]
    workers: Option<usize>,
    /// Override the metrics report path
    #[arg(long)]
    metrics: Option<PathBuf>,
    /// Override the event log path
    #[arg(long)]
    events: Option<PathBuf>,
    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl CliOptions {
    fn apply(&self, cfg: &mut GenerationConfig) {
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(&[min_x, min_z, max_x, max_z]) = self.region.as_deref() {
            cfg.region.min_chunk = [min_x, min_z];
            cfg.region.max_chunk = [max_x, max_z];
        }
        if let Some(workers) = self.workers {
            cfg.terrain.execution = ExecutionMode::Parallel { workers };
        }
        if self.metrics.is_some() {
            cfg.output.metrics = self.metrics.clone();
        }
        if self.events.is_some() {
            cfg.output.events = self.events.clone();
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    info!("Starting strata v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse();
    let mut cfg = GenerationConfig::load_from_path(&cli.config);
    cli.apply(&mut cfg);
    cfg.validate().context("invalid generation settings")?;

    if let Some(path) = &cli.write_config {
        cfg.save_to_path(path)
            .with_context(|| format!("writing config to {}", path.display()))?;
        info!(path = %path.display(), "config written");
        return Ok(());
    }

    let mut events = match &cfg.output.events {
        Some(path) => Some(JsonlSink::create(path)?),
        None => None,
    };
    let summary = driver::run_region(&cfg, events.as_mut())?;
    if let Some(sink) = events.as_mut() {
        sink.flush()?;
    }
    if let Some(path) = &cfg.output.metrics {
        MetricsSink::create(path)?.write(&summary.report)?;
        info!(path = %path.display(), "metrics written");
    }

    println!("Generated {} chunks (seed {})", summary.chunks, cfg.seed);
    println!(
        "Features: {} placed, {} skipped, {} failed subtasks, {} blocks",
        summary.features.placed,
        summary.features.skipped,
        summary.features.failed_subtasks,
        summary.features.blocks_written
    );
    for (feature, count) in &summary.features.by_feature {
        println!("  {feature:<28} {count}");
    }
    println!("Digest: {}", summary.digest);
    Ok(())
}

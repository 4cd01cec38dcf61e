//! loadchain CLI
//!
//! Builds the scenario chain described by the configuration and runs it.

use anyhow::{Context, Result};
use clap::Parser;
use loadchain::config::parse_override;
use loadchain::logging::{init_logging, marker};
use loadchain::{BasicStageFactory, ChainBuilder, ChainExecutor, ScenarioConfig, SyntheticWorkload};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "loadchain")]
#[command(about = "Run a chain of load-testing stages", long_about = None)]
struct Cli {
    /// Path to a JSON scenario configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a configuration key, e.g. -D scenario.chain.load=create,read
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_override)]
    defines: Vec<(String, String)>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli.log_level, cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => ScenarioConfig::from_file(path, &cli.defines)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ScenarioConfig::from_overrides(&cli.defines)?,
    };

    let ctx = Arc::new(config.run_context());
    tracing::info!(
        marker = marker::MSG,
        run = %ctx.run_name,
        run_id = %ctx.run_id,
        buffer_dir = %ctx.buffer_dir.display(),
        "Scenario start"
    );

    let load_types = config.load_chain();
    let simultaneous = config.simultaneous();
    let (min_size, max_size) = config.size_bounds();

    let workload = Arc::new(SyntheticWorkload::new(config.item_count()));
    let factory = BasicStageFactory::new(config.stage_defaults(), workload);
    let mut builder = ChainBuilder::new(Arc::clone(&ctx), load_types, Box::new(factory));
    let chain = builder.build(simultaneous, min_size, max_size, config.threads());

    ChainExecutor::new(ctx).execute(&chain, simultaneous).await;

    tracing::info!(marker = marker::MSG, "Scenario end");
    Ok(())
}

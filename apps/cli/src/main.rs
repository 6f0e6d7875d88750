use clb_importer::ImporterConfig;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod context;
mod domains;

use context::{Context, OutputFormat};
use domains::{plan::PlanArgs, serve::ServeArgs, sync::SyncArgs};

#[derive(Parser, Debug)]
#[command(name = "clb", about = "Checklist importer, dry-run against in-memory backends")]
struct Cli {
	/// Importer config file, defaults apply when it doesn't exist
	#[arg(long, env = "CLB_CONFIG", default_value = "importer.json")]
	config: PathBuf,

	/// Log filter used unless RUST_LOG is set
	#[arg(long, default_value = "info")]
	log_level: String,

	/// Output format
	#[arg(long, value_enum, default_value = "human")]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Show how a graph dump would be split into batches and chunks
	Plan(PlanArgs),
	/// Import a graph dump
	Sync(SyncArgs),
	/// Import every graph dump of a directory through the importer service
	Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(&cli.log_level);

	let config = ImporterConfig::load_or_default(&cli.config)?;
	let ctx = Context::new(config, cli.format);

	match cli.command {
		Commands::Plan(args) => domains::plan::run(&ctx, &args).await,
		Commands::Sync(args) => domains::sync::run(&ctx, args).await,
		Commands::Serve(args) => domains::serve::run(&ctx, args).await,
	}
}

fn init_tracing(default_filter: &str) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}

use clb_importer::{graph::MemoryGraph, ImporterConfig, Interrupter};

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
	Human,
	Json,
}

pub struct Context {
	pub config: ImporterConfig,
	pub format: OutputFormat,
}

impl Context {
	pub const fn new(config: ImporterConfig, format: OutputFormat) -> Self {
		Self { config, format }
	}

	/// Prints `output` as pretty json, or through `human` otherwise.
	pub fn print<T: Serialize>(&self, output: &T, human: impl FnOnce(&T)) -> Result<()> {
		match self.format {
			OutputFormat::Human => human(output),
			OutputFormat::Json => println!("{}", serde_json::to_string_pretty(output)?),
		}
		Ok(())
	}
}

pub async fn load_graph(path: &Path) -> Result<MemoryGraph> {
	let json = tokio::fs::read_to_string(path)
		.await
		.with_context(|| format!("reading graph dump {}", path.display()))?;

	MemoryGraph::from_json(&json).with_context(|| format!("loading graph dump {}", path.display()))
}

/// Interrupts on ctrl-c.
pub fn interrupt_on_ctrl_c() -> Interrupter {
	let interrupter = Interrupter::new();

	tokio::spawn({
		let interrupter = interrupter.clone();
		async move {
			match signal::ctrl_c().await {
				Ok(()) => {
					info!("Ctrl-c received, interrupting");
					interrupter.interrupt();
				}
				Err(e) => warn!(?e, "Failed to listen for ctrl-c;"),
			}
		}
	});

	interrupter
}

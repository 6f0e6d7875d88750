mod args;

pub use args::SyncArgs;

use crate::context::{interrupt_on_ctrl_c, load_graph, Context};

use clb_importer::{
	backend::{in_memory, MemoryStore},
	ImportReport,
};

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct SyncOutput {
	dataset_key: Uuid,
	runs: Vec<ImportReport>,
	stored: usize,
	indexed: usize,
}

pub async fn run(ctx: &Context, args: SyncArgs) -> Result<()> {
	let dataset_key = args.dataset_key.unwrap_or_else(Uuid::new_v4);
	let store = MemoryStore::new();
	let (importer, index) = in_memory(ctx.config.clone(), &store);
	let interrupter = interrupt_on_ctrl_c();

	let mut runs = Vec::with_capacity(args.runs);
	for run in 1..=args.runs {
		let graph = load_graph(&args.graph).await?;
		info!(run, %dataset_key, "Starting import");
		runs.push(importer.run(dataset_key, Arc::new(graph), &interrupter).await?);
	}

	let output = SyncOutput {
		dataset_key,
		runs,
		stored: store.usages(dataset_key).len(),
		indexed: index.documents(dataset_key).len(),
	};

	ctx.print(&output, |output| {
		println!("Dataset {}", output.dataset_key);
		for (run, report) in output.runs.iter().enumerate() {
			println!(
				"  run {}: {} synced ({} main, {} in chunks, {} pro parte), {} deleted",
				run + 1,
				report.synced(),
				report.main,
				report.chunks,
				report.pro_parte,
				report.deleted
			);
		}
		println!("  {} records stored, {} indexed", output.stored, output.indexed);
	})
}

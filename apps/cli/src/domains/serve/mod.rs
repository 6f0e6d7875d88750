mod args;

pub use args::ServeArgs;

use crate::context::{load_graph, Context};

use clb_importer::{
	backend::{in_memory, MemoryStore},
	listener::{ImporterEvent, ImporterMessage, ImporterService, MemoryGraphProvider},
};

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_channel as chan;
use tokio::{fs, signal};
use tracing::{info, warn};
use uuid::Uuid;

pub async fn run(ctx: &Context, args: ServeArgs) -> Result<()> {
	let provider = Arc::new(MemoryGraphProvider::new());
	let mut datasets = Vec::new();

	let mut entries = fs::read_dir(&args.dir)
		.await
		.with_context(|| format!("listing {}", args.dir.display()))?;
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		let Some(dataset_key) = path
			.file_stem()
			.and_then(|stem| stem.to_str())
			.and_then(|stem| Uuid::parse_str(stem).ok())
		else {
			warn!(path = %path.display(), "Skipping file not named after a dataset key");
			continue;
		};

		provider.insert(dataset_key, load_graph(&path).await?);
		datasets.push(dataset_key);
	}

	info!(count = datasets.len(), "Graphs loaded");

	let store = MemoryStore::new();
	let (importer, _index) = in_memory(ctx.config.clone(), &store);
	let (service, events_rx) = ImporterService::new(Arc::new(importer), provider);

	let (msg_tx, msg_rx) = chan::unbounded();
	for dataset_key in datasets {
		msg_tx.send(ImporterMessage::ChecklistNormalized { dataset_key }).await?;
	}
	drop(msg_tx);

	tokio::select! {
		() = service.run(msg_rx) => {}
		res = signal::ctrl_c() => {
			res?;
			info!("Ctrl-c received, interrupting running imports");
			service.interrupter().interrupt();
		}
	}

	let mut events = Vec::new();
	while let Ok(event) = events_rx.try_recv() {
		events.push(event);
	}

	ctx.print(&events, |events| {
		for event in events {
			match event {
				ImporterEvent::ChecklistSynced {
					dataset_key,
					report,
				} => println!(
					"{dataset_key}: {} synced, {} deleted",
					report.synced(),
					report.deleted
				),
				ImporterEvent::ImportFailed { dataset_key, cause } => {
					println!("{dataset_key}: failed, {cause}");
				}
			}
		}
		println!(
			"{} started, {} failed",
			service.started(),
			service.failed()
		);
	})
}

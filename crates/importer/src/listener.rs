//! Imports checklists as their normalization finishes.

use crate::{
	error::Error,
	graph::{GraphReader, MemoryGraph},
	importer::{ImportReport, Importer},
};

use clb_task_system::Interrupter;

use std::{
	sync::{
		atomic::{AtomicU64, AtomicUsize, Ordering},
		Arc,
	},
	time::{Duration, Instant},
};

use async_channel as chan;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImporterMessage {
	ChecklistNormalized { dataset_key: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImporterEvent {
	ChecklistSynced {
		dataset_key: Uuid,
		report: ImportReport,
	},
	ImportFailed {
		dataset_key: Uuid,
		cause: String,
	},
}

impl ImporterEvent {
	#[must_use]
	pub const fn dataset_key(&self) -> Uuid {
		match self {
			Self::ChecklistSynced { dataset_key, .. } | Self::ImportFailed { dataset_key, .. } => {
				*dataset_key
			}
		}
	}
}

/// Hands out the normalized graph of a dataset.
#[async_trait]
pub trait GraphProvider: Send + Sync + 'static {
	async fn open(&self, dataset_key: Uuid) -> Result<Arc<dyn GraphReader>, Error>;
}

/// Graphs kept in memory until their import, each can be opened once.
#[derive(Debug, Default)]
pub struct MemoryGraphProvider {
	graphs: DashMap<Uuid, Arc<MemoryGraph>>,
}

impl MemoryGraphProvider {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, dataset_key: Uuid, graph: MemoryGraph) {
		if self.graphs.insert(dataset_key, Arc::new(graph)).is_some() {
			debug!(%dataset_key, "Replaced pending graph");
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.graphs.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.graphs.is_empty()
	}
}

#[async_trait]
impl GraphProvider for MemoryGraphProvider {
	async fn open(&self, dataset_key: Uuid) -> Result<Arc<dyn GraphReader>, Error> {
		self.graphs
			.remove(&dataset_key)
			.map(|(_, graph)| -> Arc<dyn GraphReader> { graph })
			.ok_or(Error::GraphNotFound(dataset_key))
	}
}

/// Listens for normalized checklists, importing up to `msg_pool_size` of them at once.
pub struct ImporterService {
	importer: Arc<Importer>,
	graphs: Arc<dyn GraphProvider>,
	events_tx: chan::Sender<ImporterEvent>,
	interrupter: Interrupter,
	started: AtomicUsize,
	failed: AtomicUsize,
	processing_micros: AtomicU64,
}

impl ImporterService {
	/// Creates the service and the receiving end of its events.
	#[must_use]
	pub fn new(
		importer: Arc<Importer>,
		graphs: Arc<dyn GraphProvider>,
	) -> (Self, chan::Receiver<ImporterEvent>) {
		let (events_tx, events_rx) = chan::unbounded();

		(
			Self {
				importer,
				graphs,
				events_tx,
				interrupter: Interrupter::new(),
				started: AtomicUsize::new(0),
				failed: AtomicUsize::new(0),
				processing_micros: AtomicU64::new(0),
			},
			events_rx,
		)
	}

	/// Interrupting fails the imports in flight and every import started afterwards.
	#[must_use]
	pub const fn interrupter(&self) -> &Interrupter {
		&self.interrupter
	}

	#[must_use]
	pub fn started(&self) -> usize {
		self.started.load(Ordering::Relaxed)
	}

	#[must_use]
	pub fn failed(&self) -> usize {
		self.failed.load(Ordering::Relaxed)
	}

	/// Time spent importing, summed over every handled message.
	#[must_use]
	pub fn processing_time(&self) -> Duration {
		Duration::from_micros(self.processing_micros.load(Ordering::Relaxed))
	}

	/// Handles messages until every sender is dropped.
	#[instrument(skip_all)]
	pub async fn run(&self, messages: chan::Receiver<ImporterMessage>) {
		let pool_size = self.importer.config().msg_pool_size.max(1);
		info!(pool_size, "Importer service listening");

		messages
			.for_each_concurrent(pool_size, |msg| self.handle(msg))
			.await;

		info!(
			started = self.started(),
			failed = self.failed(),
			processing_time = ?self.processing_time(),
			"Importer service stopped"
		);
	}

	async fn handle(&self, msg: ImporterMessage) {
		match msg {
			ImporterMessage::ChecklistNormalized { dataset_key } => {
				self.started.fetch_add(1, Ordering::Relaxed);
				let start = Instant::now();

				let event = match self.import(dataset_key).await {
					Ok(report) => ImporterEvent::ChecklistSynced {
						dataset_key,
						report,
					},
					Err(e) => {
						self.failed.fetch_add(1, Ordering::Relaxed);
						error!(%dataset_key, ?e, "Failed to import checklist;");
						ImporterEvent::ImportFailed {
							dataset_key,
							cause: e.to_string(),
						}
					}
				};

				let elapsed = start.elapsed();
				self.processing_micros.fetch_add(
					u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
					Ordering::Relaxed,
				);
				debug!(%dataset_key, ?elapsed, "Checklist processed");

				if self.events_tx.send(event).await.is_err() {
					warn!(%dataset_key, "Nobody listening to importer events");
				}
			}
		}
	}

	async fn import(&self, dataset_key: Uuid) -> Result<ImportReport, Error> {
		let graph = self.graphs.open(dataset_key).await?;
		self.importer.run(dataset_key, graph, &self.interrupter).await
	}
}

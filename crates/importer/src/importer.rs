use crate::{
	callback::{ImporterCallback, RunContext},
	chunking::{ChunkPlanner, WalkStep},
	config::ImporterConfig,
	error::Error,
	graph::GraphReader,
	model::{NodeId, ProParteUsage},
	pro_parte::ProParteGroup,
	reaper::StaleReaper,
	service::{DatasetImportService, UsageService},
};

use clb_task_system::{Completion, Interrupter, PendingTasks, TaskFailure, TaskHandle, TaskId};

use std::{collections::HashSet, future::Future, mem, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, error, info, instrument, trace};
use uuid::Uuid;

/// Steps of an import run, always gone through in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ImportState {
	Init,
	Traverse,
	AwaitMainWrites,
	PatchDeferredFks,
	ExpandProParte,
	ValidateNonEmpty,
	ReapStale,
	Done,
	Failed,
}

/// Number of records written or deleted by a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
	/// Records synced in the batches of the main walk
	pub main: usize,
	/// Records synced as part of subtree chunks
	pub chunks: usize,
	pub pro_parte: usize,
	/// Records of previous runs removed
	pub deleted: usize,
}

impl ImportReport {
	#[must_use]
	pub const fn synced(&self) -> usize {
		self.main + self.chunks + self.pro_parte
	}
}

/// Syncs normalized datasets into the relational store and the search index.
pub struct Importer {
	config: Arc<ImporterConfig>,
	relational: Arc<dyn DatasetImportService>,
	search: Arc<dyn DatasetImportService>,
	usages: Arc<dyn UsageService>,
}

impl Importer {
	pub fn new(
		config: ImporterConfig,
		relational: Arc<dyn DatasetImportService>,
		search: Arc<dyn DatasetImportService>,
		usages: Arc<dyn UsageService>,
	) -> Self {
		Self {
			config: Arc::new(config),
			relational,
			search,
			usages,
		}
	}

	#[must_use]
	pub fn config(&self) -> &ImporterConfig {
		&self.config
	}

	/// Syncs the whole graph of a dataset, replacing whatever a previous run left behind.
	///
	/// The graph is closed once the run is over, whatever its outcome.
	#[instrument(skip_all, fields(%dataset_key, nodes = graph.node_count()), err)]
	pub async fn run(
		&self,
		dataset_key: Uuid,
		graph: Arc<dyn GraphReader>,
		interrupter: &Interrupter,
	) -> Result<ImportReport, Error> {
		let res = match ImportRun::init(self, dataset_key, Arc::clone(&graph), interrupter).await {
			Ok(mut run) => {
				let res = run.execute().await;
				if let Err(e) = &res {
					error!(state = %run.state, ?e, "Import failed;");
					run.enter(ImportState::Failed);
				}
				res
			}
			Err(e) => {
				error!(state = %ImportState::Init, ?e, "Import failed;");
				Err(e)
			}
		};

		graph.close();

		res.inspect(|report| {
			info!(
				main = report.main,
				chunks = report.chunks,
				pro_parte = report.pro_parte,
				deleted = report.deleted,
				"Import succeeded"
			);
		})
	}

	/// Removes every record of a dataset, from the index first.
	#[instrument(skip(self, interrupter), err)]
	pub async fn delete_dataset(
		&self,
		dataset_key: Uuid,
		interrupter: &Interrupter,
	) -> Result<(), Error> {
		wait_handle(self.search.delete_dataset(dataset_key), dataset_key, interrupter).await?;
		wait_handle(self.relational.delete_dataset(dataset_key), dataset_key, interrupter).await?;

		info!("Dataset deleted");

		Ok(())
	}
}

/// Waits for a backend task, wrapping its failure with the task identity.
pub(crate) async fn wait_for(
	task: impl Future<Output = Result<(), Error>> + Send,
	task_id: TaskId,
	name: &'static str,
	dataset_key: Uuid,
	interrupter: &Interrupter,
) -> Result<(), Error> {
	interrupter
		.guard(task)
		.await
		.map_err(|e| Error::from_interrupted(dataset_key, e))?
		.map_err(|source| {
			TaskFailure {
				task_id,
				name,
				source,
			}
			.into()
		})
}

pub(crate) async fn wait_handle(
	handle: TaskHandle<Error>,
	dataset_key: Uuid,
	interrupter: &Interrupter,
) -> Result<(), Error> {
	let (task_id, name) = (handle.task_id(), handle.name());
	wait_for(handle, task_id, name, dataset_key, interrupter).await
}

struct ImportRun<'a> {
	importer: &'a Importer,
	dataset_key: Uuid,
	graph: Arc<dyn GraphReader>,
	ctx: Arc<RunContext>,
	pending: PendingTasks<Error>,
	interrupter: &'a Interrupter,
	state: ImportState,
	pro_parte: Vec<NodeId>,
	report: ImportReport,
}

impl<'a> ImportRun<'a> {
	async fn init(
		importer: &'a Importer,
		dataset_key: Uuid,
		graph: Arc<dyn GraphReader>,
		interrupter: &'a Interrupter,
	) -> Result<Self, Error> {
		let max_existing_key = if importer.config.is_master(dataset_key) {
			let max = importer.usages.max_usage_key(dataset_key).await?;
			info!(?max, "Syncing master dataset, usages up to the current max key are updates");
			max
		} else {
			None
		};

		let pending = PendingTasks::new();
		let ctx = Arc::new(RunContext::new(
			dataset_key,
			Arc::clone(&graph),
			max_existing_key,
			pending.background(),
		));

		Ok(Self {
			importer,
			dataset_key,
			graph,
			ctx,
			pending,
			interrupter,
			state: ImportState::Init,
			pro_parte: Vec::new(),
			report: ImportReport::default(),
		})
	}

	fn enter(&mut self, state: ImportState) {
		debug!(from = %self.state, to = %state, "Import state change");
		self.state = state;
	}

	async fn execute(&mut self) -> Result<ImportReport, Error> {
		self.enter(ImportState::Traverse);
		self.traverse().await?;

		self.enter(ImportState::AwaitMainWrites);
		self.await_critical().await?;

		self.enter(ImportState::PatchDeferredFks);
		let pro_parte = self.pro_parte.iter().copied().collect::<HashSet<_>>();
		self.patch_foreign_keys(|node| pro_parte.contains(&node))?;

		self.enter(ImportState::ExpandProParte);
		self.expand_pro_parte().await?;

		self.enter(ImportState::ValidateNonEmpty);
		self.await_critical().await?;
		let (first_node, first_key) = self
			.ctx
			.keys()
			.first()
			.ok_or(Error::EmptyImport(self.dataset_key))?;
		debug!(%first_node, first_key, keys = self.ctx.keys().len(), "Run wrote usages");

		self.enter(ImportState::ReapStale);
		self.report.deleted = StaleReaper {
			dataset_key: self.dataset_key,
			margin: self.importer.config.reap_margin(),
			usages: self.importer.usages.as_ref(),
			relational: self.importer.relational.as_ref(),
			search: self.importer.search.as_ref(),
			interrupter: self.interrupter,
		}
		.reap(first_key)
		.await?;

		self.enter(ImportState::Done);
		self.await_critical().await?;
		let drained = self
			.pending
			.drain_background(self.interrupter)
			.await
			.map_err(|e| Error::from_drain(self.dataset_key, e))?;
		debug!(drained, "Search index caught up");

		Ok(self.report)
	}

	async fn traverse(&mut self) -> Result<(), Error> {
		let graph = Arc::clone(&self.graph);
		let planner = ChunkPlanner::from_config(graph.as_ref(), &self.importer.config);
		let mut batch = Vec::new();
		let mut chunks = 0_usize;

		for step in planner.walk() {
			match step {
				WalkStep::Node(node) => batch.push(node),

				WalkStep::ProParte(node) => self.pro_parte.push(node),

				WalkStep::Chunk(root) => {
					trace!(%root, "Chunk found");
					let main = if batch.is_empty() {
						None
					} else {
						self.report.main += batch.len();
						Some(self.submit(mem::take(&mut batch), None))
					};

					// Main nodes are being written, the subtree can be read in the meantime
					let chunk = planner.read_chunk(root);
					self.pro_parte.extend_from_slice(&chunk.pro_parte);

					if let Some(main) = main {
						let task_id = main.task_id();
						wait_for(main, task_id, "relational sync", self.dataset_key, self.interrupter)
							.await?;
						trace!("Main batch synced");
					}

					debug!(%root, count = chunk.nodes.len(), "Submitting subtree chunk");
					self.report.chunks += chunk.nodes.len();
					self.submit(chunk.nodes, None);
					chunks += 1;
				}
			}
		}

		if !batch.is_empty() {
			debug!(count = batch.len(), "Submitting final main batch");
			self.report.main += batch.len();
			self.submit(batch, None);
		}

		info!(
			main = self.report.main,
			chunk_usages = self.report.chunks,
			chunks,
			pro_parte = self.pro_parte.len(),
			"Tree walked"
		);

		Ok(())
	}

	/// Sends nodes to both backends, the index trailing the relational write.
	fn submit(&mut self, nodes: Vec<NodeId>, after: Option<Completion<Error>>) -> Completion<Error> {
		let source: Arc<dyn ImporterCallback> = self.ctx.clone();

		let relational = self.importer.relational.sync(
			self.dataset_key,
			Arc::clone(&source),
			nodes.clone(),
			after,
		);
		let written = relational.completion();
		let search = self
			.importer
			.search
			.sync(self.dataset_key, source, nodes, Some(written.clone()));

		self.pending.push_critical(relational);
		self.pending.push_background(search);

		written
	}

	fn submit_usages(&mut self, usages: Vec<ProParteUsage>) -> Completion<Error> {
		let source: Arc<dyn ImporterCallback> = self.ctx.clone();

		let relational = self.importer.relational.sync_usages(
			self.dataset_key,
			Arc::clone(&source),
			usages.clone(),
			None,
		);
		let written = relational.completion();
		let search = self.importer.search.sync_usages(
			self.dataset_key,
			source,
			usages,
			Some(written.clone()),
		);

		self.pending.push_critical(relational);
		self.pending.push_background(search);

		written
	}

	async fn await_critical(&mut self) -> Result<(), Error> {
		let awaited = self
			.pending
			.await_critical(self.interrupter)
			.await
			.map_err(|e| Error::from_drain(self.dataset_key, e))?;
		trace!(awaited, "Relational writes completed");
		Ok(())
	}

	/// Issues a single foreign key update per backend for every deferred key not held back.
	fn patch_foreign_keys(&mut self, hold: impl Fn(NodeId) -> bool) -> Result<(), Error> {
		let patches = self.ctx.ledger().flush(self.ctx.keys(), hold)?;

		if patches.is_empty() {
			return Ok(());
		}

		info!(count = patches.len(), "Updating deferred foreign keys");

		let relational = self.importer.relational.update_foreign_keys(patches.clone(), None);
		let search = self
			.importer
			.search
			.update_foreign_keys(patches, Some(relational.completion()));

		self.pending.push_critical(relational);
		self.pending.push_background(search);

		Ok(())
	}

	async fn expand_pro_parte(&mut self) -> Result<(), Error> {
		let nodes = mem::take(&mut self.pro_parte);
		if nodes.is_empty() {
			return Ok(());
		}

		info!(count = nodes.len(), "Syncing pro parte synonyms");
		let ctx = Arc::clone(&self.ctx);

		for group in nodes.chunks(self.importer.config.chunk_size.max(1)) {
			let mut records = ProParteGroup::read(&ctx, group)?;
			self.report.pro_parte += records.len();

			let primaries = self.submit_usages(mem::take(&mut records.primaries));
			let task_id = primaries.task_id();
			wait_for(
				primaries,
				task_id,
				"relational pro parte sync",
				self.dataset_key,
				self.interrupter,
			)
			.await?;

			let copies = records.copies(&ctx)?;
			if !copies.is_empty() {
				self.submit_usages(copies);
			}
		}

		// Keys pointing at pro parte synonyms were held back until now
		self.patch_foreign_keys(|_| false)
	}
}

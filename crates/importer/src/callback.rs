use crate::{
	error::Error,
	graph::GraphReader,
	keys::{self, ForeignKeyLedger, KeyKind, KeyTable},
	model::{
		Classification, HigherClassification, KeyRef, NameUsage, NodeId, ParsedName,
		TaxonomicStatus, UsageExtensions, UsageKey, UsageMetrics, VerbatimUsage,
	},
};

use clb_task_system::{BackgroundTasks, TaskHandle};

use std::sync::Arc;

use tracing::trace;
use uuid::Uuid;

/// Capabilities a backend gets from the run while it turns node ids into records.
pub trait ImporterCallback: Send + Sync + 'static {
	/// Builds the record of a node with every reference translated into usage keys.
	fn read_usage(&self, node: NodeId) -> Result<NameUsage, Error>;

	fn read_name(&self, node: NodeId) -> Option<ParsedName>;

	fn read_extensions(&self, node: NodeId) -> Option<UsageExtensions>;

	fn read_metrics(&self, node: NodeId) -> Option<UsageMetrics>;

	fn read_verbatim(&self, node: NodeId) -> Option<VerbatimUsage>;

	/// Keys of all taxa above the node, highest first.
	fn read_ancestor_keys(&self, node: NodeId) -> Result<Vec<UsageKey>, Error>;

	/// Whether the record must be inserted, otherwise it updates the record owning its key.
	fn is_insert(&self, usage: &NameUsage) -> bool;

	/// Reports the key just issued for a node, at most once per node.
	fn report_usage_key(&self, node: NodeId, key: UsageKey) -> Result<(), Error>;

	/// Hands over auxiliary work the run has to wait for before finishing.
	fn report_background_task(&self, handle: TaskHandle<Error>);

	fn usage_key(&self, node: NodeId) -> Option<UsageKey>;
}

/// State of a single import run, shared with every backend task of that run.
pub struct RunContext {
	dataset_key: Uuid,
	graph: Arc<dyn GraphReader>,
	keys: KeyTable,
	ledger: ForeignKeyLedger,
	max_existing_key: Option<UsageKey>,
	background: BackgroundTasks<Error>,
}

impl RunContext {
	/// `max_existing_key` is only given for datasets issuing their own keys, records owning a key up to it
	/// are updates.
	pub fn new(
		dataset_key: Uuid,
		graph: Arc<dyn GraphReader>,
		max_existing_key: Option<UsageKey>,
		background: BackgroundTasks<Error>,
	) -> Self {
		Self {
			dataset_key,
			graph,
			keys: KeyTable::new(),
			ledger: ForeignKeyLedger::new(),
			max_existing_key,
			background,
		}
	}

	#[must_use]
	pub const fn dataset_key(&self) -> Uuid {
		self.dataset_key
	}

	#[must_use]
	pub const fn keys(&self) -> &KeyTable {
		&self.keys
	}

	#[must_use]
	pub const fn ledger(&self) -> &ForeignKeyLedger {
		&self.ledger
	}

	#[must_use]
	pub fn graph(&self) -> &dyn GraphReader {
		self.graph.as_ref()
	}

	fn resolve(
		&self,
		origin: NodeId,
		target: Option<NodeId>,
		kind: KeyKind,
	) -> Result<Option<KeyRef>, Error> {
		keys::resolve(&self.keys, &self.ledger, origin, target, kind)
	}

	fn convert_classification(
		&self,
		origin: NodeId,
		higher: &HigherClassification,
	) -> Result<Classification, Error> {
		let mut classification = Classification {
			names: higher.names.clone(),
			..Default::default()
		};

		for (&rank, &target) in &higher.nodes {
			if let Some(key) = self.resolve(origin, Some(target), KeyKind::Classification(rank))? {
				classification.keys.insert(rank, key);
			}
		}

		Ok(classification)
	}

	/// Higher classification of the accepted taxon `source`, as seen from the record written for `origin`.
	pub(crate) fn classification_of(
		&self,
		origin: NodeId,
		source: NodeId,
	) -> Result<Classification, Error> {
		self.graph
			.read_facts(source)
			.map_or_else(
				|| Ok(Classification::default()),
				|facts| self.convert_classification(origin, &facts.classification),
			)
	}
}

impl ImporterCallback for RunContext {
	fn read_usage(&self, node: NodeId) -> Result<NameUsage, Error> {
		let raw = self.graph.read_usage(node).ok_or(Error::NodeNotFound(node))?;
		let synonym = self.graph.is_synonym(node);

		let (parent_key, accepted_key, classification_source) = if synonym {
			(
				None,
				self.resolve(node, raw.parent, KeyKind::Accepted)?,
				raw.parent,
			)
		} else {
			(self.resolve(node, raw.parent, KeyKind::Parent)?, None, Some(node))
		};

		let basionym_key = self.resolve(node, raw.basionym, KeyKind::Basionym)?;

		let classification = match classification_source {
			Some(source) => self.classification_of(node, source)?,
			None => Classification::default(),
		};

		let taxonomic_status = if self.graph.is_pro_parte(node) {
			TaxonomicStatus::ProParteSynonym
		} else {
			raw.taxonomic_status
		};

		Ok(NameUsage {
			key: raw.key,
			dataset_key: Some(self.dataset_key),
			taxon_id: raw.taxon_id,
			scientific_name: raw.scientific_name,
			canonical_name: raw.canonical_name,
			authorship: raw.authorship,
			rank: raw.rank,
			taxonomic_status,
			origin: raw.origin,
			synonym,
			parent_key,
			accepted_key,
			basionym_key,
			pro_parte_key: None,
			classification,
			remarks: raw.remarks,
			last_interpreted: None,
		})
	}

	fn read_name(&self, node: NodeId) -> Option<ParsedName> {
		self.graph.read_name(node)
	}

	fn read_extensions(&self, node: NodeId) -> Option<UsageExtensions> {
		self.graph.read_extensions(node)
	}

	fn read_metrics(&self, node: NodeId) -> Option<UsageMetrics> {
		self.graph.read_facts(node).map(|facts| facts.metrics)
	}

	fn read_verbatim(&self, node: NodeId) -> Option<VerbatimUsage> {
		self.graph.read_verbatim(node)
	}

	fn read_ancestor_keys(&self, node: NodeId) -> Result<Vec<UsageKey>, Error> {
		let mut ancestors = Vec::new();
		let mut current = self.graph.parent(node);

		while let Some(ancestor) = current {
			if ancestors.len() > self.graph.node_count() {
				break;
			}
			ancestors.push(self.keys.require(ancestor)?);
			current = self.graph.parent(ancestor);
		}

		ancestors.reverse();
		Ok(ancestors)
	}

	fn is_insert(&self, usage: &NameUsage) -> bool {
		match (usage.key, self.max_existing_key) {
			(Some(key), Some(max)) => key > max,
			_ => true,
		}
	}

	fn report_usage_key(&self, node: NodeId, key: UsageKey) -> Result<(), Error> {
		trace!(%node, key, "Usage key issued");
		self.keys.report(node, key)
	}

	fn report_background_task(&self, handle: TaskHandle<Error>) {
		self.background.push(handle);
	}

	fn usage_key(&self, node: NodeId) -> Option<UsageKey> {
		self.keys.get(node)
	}
}

use crate::{
	callback::ImporterCallback,
	error::Error,
	model::{NameUsage, NodeId, ParsedName, ProParteUsage, UsageForeignKeys, UsageKey, UsageMetrics},
	service::DatasetImportService,
};

use clb_task_system::{Completion, TaskHandle};

use std::{collections::BTreeSet, fmt, sync::Arc};

use async_channel as chan;
use dashmap::DashMap;
use futures::{future::BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::{spawn, sync::oneshot};
use tracing::{debug, error, trace};
use uuid::Uuid;

use super::{store::MemoryStore, RELATIONAL, SEARCH};

/// A search document, built from the relational row of a usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
	pub usage: NameUsage,
	/// Keys of all higher taxa, highest first
	pub higher_taxon_keys: Vec<UsageKey>,
	pub vernacular_names: Vec<String>,
	pub name: Option<ParsedName>,
	pub metrics: Option<UsageMetrics>,
}

impl IndexDocument {
	fn new(usage: NameUsage, higher_taxon_keys: Vec<UsageKey>) -> Self {
		Self {
			usage,
			higher_taxon_keys,
			vernacular_names: Vec::new(),
			name: None,
			metrics: None,
		}
	}
}

struct Job {
	work: BoxFuture<'static, Result<(), Error>>,
	done: oneshot::Sender<Result<(), Error>>,
}

struct IndexInner {
	documents: DashMap<UsageKey, IndexDocument>,
	store: MemoryStore,
}

/// Search index mirroring the rows of a [`MemoryStore`].
///
/// Documents are built from the rows read back from the store, so every write has to trail the relational
/// write of the same records. All writes go through a single worker, one after the other.
#[derive(Clone)]
pub struct MemoryIndex {
	inner: Arc<IndexInner>,
	jobs_tx: chan::Sender<Job>,
}

impl fmt::Debug for MemoryIndex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryIndex")
			.field("documents", &self.inner.documents.len())
			.field("queued", &self.jobs_tx.len())
			.finish_non_exhaustive()
	}
}

impl MemoryIndex {
	/// Starts the index worker on the current tokio runtime.
	#[must_use]
	pub fn spawn(store: MemoryStore) -> Self {
		let (jobs_tx, jobs_rx) = chan::unbounded::<Job>();

		spawn(async move {
			while let Ok(Job { work, done }) = jobs_rx.recv().await {
				if done.send(work.await).is_err() {
					trace!("Nobody waiting on index job");
				}
			}
			debug!("Search index worker stopped");
		});

		Self {
			inner: Arc::new(IndexInner {
				documents: DashMap::new(),
				store,
			}),
			jobs_tx,
		}
	}

	#[must_use]
	pub fn document(&self, key: UsageKey) -> Option<IndexDocument> {
		self.inner.documents.get(&key).map(|doc| doc.value().clone())
	}

	/// Documents of the dataset ordered by key.
	#[must_use]
	pub fn documents(&self, dataset_key: Uuid) -> Vec<IndexDocument> {
		let mut documents = self
			.inner
			.documents
			.iter()
			.filter(|doc| doc.usage.dataset_key == Some(dataset_key))
			.map(|doc| doc.value().clone())
			.collect::<Vec<_>>();
		documents.sort_by_key(|doc| doc.usage.key);
		documents
	}

	/// Seeds a document for a row of the store, as a previous run would have left it.
	pub fn seed(&self, usage: NameUsage) {
		if let Some(key) = usage.key {
			self.inner
				.documents
				.insert(key, IndexDocument::new(usage, Vec::new()));
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.documents.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.documents.is_empty()
	}

	fn submit<F>(&self, name: &'static str, after: Option<Completion<Error>>, work: F) -> TaskHandle<Error>
	where
		F: FnOnce(Arc<IndexInner>) -> Result<(), Error> + Send + 'static,
	{
		let inner = Arc::clone(&self.inner);
		let (done, done_rx) = oneshot::channel();

		let work = async move {
			if let Some(after) = after {
				after.await?;
			}
			work(inner)
		}
		.boxed();

		if self.jobs_tx.try_send(Job { work, done }).is_err() {
			error!(name, "Search index worker is gone");
			return TaskHandle::ready(name, Err(worker_gone()));
		}

		TaskHandle::spawn(name, async move { done_rx.await.map_err(|_| worker_gone())? })
	}
}

fn worker_gone() -> Error {
	Error::Backend {
		backend: SEARCH,
		reason: "index worker stopped".to_string(),
	}
}

impl IndexInner {
	fn row(&self, key: UsageKey) -> Result<NameUsage, Error> {
		self.store.usage(key).ok_or(Error::UsageNotFound {
			backend: RELATIONAL,
			usage_key: key,
		})
	}

	fn index(&self, doc: IndexDocument) {
		if let Some(key) = doc.usage.key {
			trace!(key, name = %doc.usage.scientific_name, "Indexing usage");
			self.documents.insert(key, doc);
		}
	}

	/// Keys above a row, following the parent links stored in the relational rows.
	fn stored_ancestor_keys(&self, usage: &NameUsage) -> Vec<UsageKey> {
		let mut ancestors = Vec::new();
		let mut current = usage.tree_parent_key().and_then(|key| key.key());

		while let Some(key) = current {
			if ancestors.contains(&key) {
				break;
			}
			ancestors.push(key);
			current = self
				.store
				.usage(key)
				.and_then(|row| row.tree_parent_key())
				.and_then(|key| key.key());
		}

		ancestors.reverse();
		ancestors
	}
}

impl DatasetImportService for MemoryIndex {
	fn name(&self) -> &'static str {
		SEARCH
	}

	fn sync(
		&self,
		dataset_key: Uuid,
		source: Arc<dyn ImporterCallback>,
		nodes: Vec<NodeId>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error> {
		self.submit("search sync", after, move |inner| {
			for &node in &nodes {
				let key = source.usage_key(node).ok_or(Error::UnresolvedNode(node))?;

				inner.index(IndexDocument {
					vernacular_names: source
						.read_extensions(node)
						.map(|extensions| {
							extensions
								.vernacular_names
								.into_iter()
								.map(|vernacular| vernacular.name)
								.collect()
						})
						.unwrap_or_default(),
					name: source.read_name(node),
					metrics: source.read_metrics(node),
					..IndexDocument::new(inner.row(key)?, source.read_ancestor_keys(node)?)
				});
			}

			debug!(%dataset_key, count = nodes.len(), "Indexed usages");
			Ok(())
		})
	}

	fn sync_usages(
		&self,
		dataset_key: Uuid,
		source: Arc<dyn ImporterCallback>,
		usages: Vec<ProParteUsage>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error> {
		self.submit("search pro parte sync", after, move |inner| {
			let nodes = usages.iter().map(|usage| usage.node).collect::<BTreeSet<_>>();

			for node in nodes {
				let key = source.usage_key(node).ok_or(Error::UnresolvedNode(node))?;
				for copy in inner.store.pro_parte_copies(key) {
					let higher_taxon_keys = inner.stored_ancestor_keys(&copy);
					inner.index(IndexDocument {
						name: source.read_name(node),
						..IndexDocument::new(copy, higher_taxon_keys)
					});
				}
			}

			debug!(%dataset_key, count = usages.len(), "Indexed pro parte usages");
			Ok(())
		})
	}

	fn update_foreign_keys(
		&self,
		foreign_keys: Vec<UsageForeignKeys>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error> {
		self.submit("search foreign keys", after, move |inner| {
			for patch in &foreign_keys {
				let usage = inner.row(patch.usage_key)?;
				match inner.documents.get_mut(&patch.usage_key) {
					Some(mut doc) => doc.usage = usage,
					None => {
						let higher_taxon_keys = inner.stored_ancestor_keys(&usage);
						inner.index(IndexDocument::new(usage, higher_taxon_keys));
					}
				}
			}
			Ok(())
		})
	}

	fn delete_usages(&self, dataset_key: Uuid, keys: Vec<UsageKey>) -> TaskHandle<Error> {
		self.submit("search delete", None, move |inner| {
			for key in &keys {
				inner.documents.remove(key);
			}
			debug!(%dataset_key, count = keys.len(), "Removed usages from index");
			Ok(())
		})
	}

	fn delete_dataset(&self, dataset_key: Uuid) -> TaskHandle<Error> {
		self.submit("search dataset delete", None, move |inner| {
			inner
				.documents
				.retain(|_, doc| doc.usage.dataset_key != Some(dataset_key));
			debug!(%dataset_key, "Removed dataset from index");
			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::model::KeyRef;

	use pretty_assertions::assert_eq;

	#[tokio::test]
	async fn writes_wait_for_their_dependency() {
		let store = MemoryStore::new();
		let index = MemoryIndex::spawn(store.clone());
		let dataset_key = Uuid::new_v4();

		let key = store.seed(NameUsage {
			dataset_key: Some(dataset_key),
			scientific_name: "Abies".to_string(),
			..Default::default()
		});

		let failed = TaskHandle::ready(
			"relational",
			Err(Error::Backend {
				backend: RELATIONAL,
				reason: "down".to_string(),
			}),
		);
		let patch = vec![UsageForeignKeys {
			usage_key: key,
			parent_key: None,
			basionym_key: None,
		}];

		assert!(matches!(
			index.update_foreign_keys(patch.clone(), Some(failed.completion())).await,
			Err(Error::Backend { backend: RELATIONAL, .. })
		));
		assert!(index.is_empty());

		index
			.update_foreign_keys(patch, Some(TaskHandle::done("relational").completion()))
			.await
			.expect("indexed");
		assert_eq!(index.documents(dataset_key).len(), 1);
	}

	#[tokio::test]
	async fn ancestors_follow_stored_parent_links() {
		let store = MemoryStore::new();
		let index = MemoryIndex::spawn(store.clone());

		let genus = store.seed(NameUsage::default());
		let species = store.seed(NameUsage {
			parent_key: Some(KeyRef::Key(genus)),
			..Default::default()
		});
		let synonym = store.seed(NameUsage {
			synonym: true,
			accepted_key: Some(KeyRef::Key(species)),
			..Default::default()
		});

		assert_eq!(
			index
				.inner
				.stored_ancestor_keys(&store.usage(synonym).expect("stored synonym")),
			vec![genus, species]
		);
	}
}

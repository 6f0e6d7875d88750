use crate::{
	callback::ImporterCallback,
	error::Error,
	model::{
		KeyRef, NameUsage, NodeId, ProParteUsage, UsageExtensions, UsageForeignKeys, UsageKey,
		UsageMetrics, VerbatimUsage,
	},
	service::{DatasetImportService, UsageService},
};

use clb_task_system::{Completion, TaskHandle};

use std::{
	fmt,
	sync::{
		atomic::{AtomicI32, AtomicUsize, Ordering},
		Arc, OnceLock,
	},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use super::RELATIONAL;

/// Source of the `last_interpreted` stamp written on every record.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct StoreInner {
	rows: DashMap<UsageKey, NameUsage>,
	extensions: DashMap<UsageKey, UsageExtensions>,
	metrics: DashMap<UsageKey, UsageMetrics>,
	verbatim: DashMap<UsageKey, VerbatimUsage>,
	next_key: AtomicI32,
	clock: Clock,
	failure: OnceLock<String>,
	foreign_key_updates: AtomicUsize,
}

/// Relational store keeping its rows in memory.
///
/// It issues keys from a sequence, stamps records with the time they were written and applies foreign key
/// patches as plain assignments.
#[derive(Clone)]
pub struct MemoryStore {
	inner: Arc<StoreInner>,
}

impl fmt::Debug for MemoryStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryStore")
			.field("rows", &self.inner.rows.len())
			.field("next_key", &self.inner.next_key)
			.finish_non_exhaustive()
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_clock(Arc::new(Utc::now))
	}
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_clock(clock: Clock) -> Self {
		Self {
			inner: Arc::new(StoreInner {
				rows: DashMap::new(),
				extensions: DashMap::new(),
				metrics: DashMap::new(),
				verbatim: DashMap::new(),
				next_key: AtomicI32::new(1),
				clock,
				failure: OnceLock::new(),
				foreign_key_updates: AtomicUsize::new(0),
			}),
		}
	}

	/// Makes every write submitted from now on fail with `reason`.
	pub fn fail_writes(&self, reason: impl Into<String>) {
		if self.inner.failure.set(reason.into()).is_err() {
			debug!("Relational store already failing");
		}
	}

	/// Stores a record as a previous run would have left it, keeping its `last_interpreted`.
	pub fn seed(&self, mut usage: NameUsage) -> UsageKey {
		let key = usage.key.unwrap_or_else(|| self.inner.next_key());
		self.inner.next_key.fetch_max(key.saturating_add(1), Ordering::Relaxed);
		usage.key = Some(key);
		usage.resolve_own_key(key);
		self.inner.rows.insert(key, usage);
		key
	}

	#[must_use]
	pub fn usage(&self, key: UsageKey) -> Option<NameUsage> {
		self.inner.rows.get(&key).map(|row| row.value().clone())
	}

	#[must_use]
	pub fn extensions(&self, key: UsageKey) -> Option<UsageExtensions> {
		self.inner.extensions.get(&key).map(|ext| ext.value().clone())
	}

	#[must_use]
	pub fn metrics(&self, key: UsageKey) -> Option<UsageMetrics> {
		self.inner.metrics.get(&key).map(|metrics| *metrics.value())
	}

	#[must_use]
	pub fn verbatim(&self, key: UsageKey) -> Option<VerbatimUsage> {
		self.inner.verbatim.get(&key).map(|verbatim| verbatim.value().clone())
	}

	/// Records of the dataset ordered by key.
	#[must_use]
	pub fn usages(&self, dataset_key: Uuid) -> Vec<NameUsage> {
		let mut usages = self
			.inner
			.rows
			.iter()
			.filter(|row| row.dataset_key == Some(dataset_key))
			.map(|row| row.value().clone())
			.collect::<Vec<_>>();
		usages.sort_by_key(|usage| usage.key);
		usages
	}

	/// All records carrying `key` as pro parte key, the record owning that key included.
	#[must_use]
	pub fn pro_parte_copies(&self, key: UsageKey) -> Vec<NameUsage> {
		let mut copies = self
			.inner
			.rows
			.iter()
			.filter(|row| row.pro_parte_key == Some(KeyRef::Key(key)))
			.map(|row| row.value().clone())
			.collect::<Vec<_>>();
		copies.sort_by_key(|usage| usage.key);
		copies
	}

	/// Number of foreign key update batches applied so far.
	#[must_use]
	pub fn foreign_key_updates(&self) -> usize {
		self.inner.foreign_key_updates.load(Ordering::Relaxed)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.rows.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.rows.is_empty()
	}
}

impl StoreInner {
	fn next_key(&self) -> UsageKey {
		self.next_key.fetch_add(1, Ordering::Relaxed)
	}

	fn check_failure(&self) -> Result<(), Error> {
		self.failure.get().map_or(Ok(()), |reason| {
			Err(Error::Backend {
				backend: RELATIONAL,
				reason: reason.clone(),
			})
		})
	}

	fn write(&self, mut usage: NameUsage, insert: bool) -> Result<UsageKey, Error> {
		let key = if insert {
			match usage.key {
				Some(key) => {
					self.next_key.fetch_max(key.saturating_add(1), Ordering::Relaxed);
					key
				}
				None => self.next_key(),
			}
		} else {
			let key = usage.key.ok_or_else(|| Error::Backend {
				backend: RELATIONAL,
				reason: format!("update of a record without key <name='{}'>", usage.scientific_name),
			})?;
			if !self.rows.contains_key(&key) {
				return Err(Error::UsageNotFound {
					backend: RELATIONAL,
					usage_key: key,
				});
			}
			key
		};

		usage.key = Some(key);
		usage.resolve_own_key(key);
		usage.last_interpreted = Some((self.clock)());

		trace!(key, insert, name = %usage.scientific_name, "Writing usage");
		self.rows.insert(key, usage);

		Ok(key)
	}

	/// Removes a record and everything attached to it, if it belongs to the dataset.
	fn remove(&self, dataset_key: Uuid, key: UsageKey) -> bool {
		let removed = self
			.rows
			.remove_if(&key, |_, row| row.dataset_key == Some(dataset_key))
			.is_some();

		if removed {
			self.extensions.remove(&key);
			self.metrics.remove(&key);
			self.verbatim.remove(&key);
		}

		removed
	}

	fn apply_foreign_keys(&self, foreign_keys: &[UsageForeignKeys]) -> Result<(), Error> {
		for patch in foreign_keys {
			let mut row = self
				.rows
				.get_mut(&patch.usage_key)
				.ok_or(Error::UsageNotFound {
					backend: RELATIONAL,
					usage_key: patch.usage_key,
				})?;

			if let Some(parent_key) = patch.parent_key {
				if row.synonym {
					row.accepted_key = Some(KeyRef::Key(parent_key));
				} else {
					row.parent_key = Some(KeyRef::Key(parent_key));
				}
			}
			if let Some(basionym_key) = patch.basionym_key {
				row.basionym_key = Some(KeyRef::Key(basionym_key));
			}
		}

		self.foreign_key_updates.fetch_add(1, Ordering::Relaxed);

		Ok(())
	}
}

impl DatasetImportService for MemoryStore {
	fn name(&self) -> &'static str {
		RELATIONAL
	}

	fn sync(
		&self,
		dataset_key: Uuid,
		source: Arc<dyn ImporterCallback>,
		nodes: Vec<NodeId>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error> {
		let inner = Arc::clone(&self.inner);

		TaskHandle::spawn("relational sync", async move {
			if let Some(after) = after {
				after.await?;
			}
			inner.check_failure()?;

			let mut extensions = Vec::new();
			for &node in &nodes {
				let usage = source.read_usage(node)?;
				let insert = source.is_insert(&usage);
				let key = inner.write(usage, insert)?;
				source.report_usage_key(node, key)?;

				if let Some(metrics) = source.read_metrics(node) {
					inner.metrics.insert(key, metrics);
				}
				if let Some(verbatim) = source.read_verbatim(node) {
					inner.verbatim.insert(key, verbatim);
				}
				if let Some(ext) = source.read_extensions(node) {
					extensions.push((key, ext));
				}
			}

			debug!(%dataset_key, count = nodes.len(), "Synced usages");

			if !extensions.is_empty() {
				let inner = Arc::clone(&inner);
				source.report_background_task(TaskHandle::spawn(
					"relational extensions",
					async move {
						let count = extensions.len();
						for (key, ext) in extensions {
							inner.extensions.insert(key, ext);
						}
						trace!(count, "Stored usage extensions");
						Ok(())
					},
				));
			}

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
		let inner = Arc::clone(&self.inner);

		TaskHandle::spawn("relational pro parte sync", async move {
			if let Some(after) = after {
				after.await?;
			}
			inner.check_failure()?;

			let count = usages.len();
			for ProParteUsage {
				node,
				usage,
				primary,
			} in usages
			{
				let insert = source.is_insert(&usage);
				let key = inner.write(usage, insert)?;
				if primary {
					source.report_usage_key(node, key)?;
				}
			}

			debug!(%dataset_key, count, "Synced pro parte usages");

			Ok(())
		})
	}

	fn update_foreign_keys(
		&self,
		foreign_keys: Vec<UsageForeignKeys>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error> {
		let inner = Arc::clone(&self.inner);

		TaskHandle::spawn("relational foreign keys", async move {
			if let Some(after) = after {
				after.await?;
			}
			inner.check_failure()?;
			inner.apply_foreign_keys(&foreign_keys)
		})
	}

	fn delete_usages(&self, dataset_key: Uuid, keys: Vec<UsageKey>) -> TaskHandle<Error> {
		let inner = Arc::clone(&self.inner);

		TaskHandle::spawn("relational delete", async move {
			inner.check_failure()?;
			let deleted = keys
				.iter()
				.filter(|&&key| inner.remove(dataset_key, key))
				.count();
			debug!(%dataset_key, deleted, "Deleted usages");
			Ok(())
		})
	}

	fn delete_dataset(&self, dataset_key: Uuid) -> TaskHandle<Error> {
		let inner = Arc::clone(&self.inner);

		TaskHandle::spawn("relational dataset delete", async move {
			inner.check_failure()?;
			let keys = inner
				.rows
				.iter()
				.filter(|row| row.dataset_key == Some(dataset_key))
				.map(|row| *row.key())
				.collect::<Vec<_>>();
			for &key in &keys {
				inner.remove(dataset_key, key);
			}
			debug!(%dataset_key, deleted = keys.len(), "Deleted dataset");
			Ok(())
		})
	}
}

#[async_trait]
impl UsageService for MemoryStore {
	async fn max_usage_key(&self, dataset_key: Uuid) -> Result<Option<UsageKey>, Error> {
		Ok(self
			.inner
			.rows
			.iter()
			.filter(|row| row.dataset_key == Some(dataset_key))
			.map(|row| *row.key())
			.max())
	}

	async fn get(&self, key: UsageKey) -> Result<Option<NameUsage>, Error> {
		Ok(self.usage(key))
	}

	#[instrument(skip(self), err)]
	async fn list_old_usages(
		&self,
		dataset_key: Uuid,
		before: DateTime<Utc>,
	) -> Result<Vec<UsageKey>, Error> {
		let mut keys = self
			.inner
			.rows
			.iter()
			.filter(|row| {
				row.dataset_key == Some(dataset_key)
					&& row.last_interpreted.map_or(true, |stamp| stamp < before)
			})
			.map(|row| *row.key())
			.collect::<Vec<_>>();
		keys.sort_unstable();
		Ok(keys)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	#[tokio::test]
	async fn foreign_key_patch_is_idempotent() {
		let store = MemoryStore::new();
		let dataset_key = Uuid::new_v4();
		let usage = |name: &str, synonym| NameUsage {
			dataset_key: Some(dataset_key),
			scientific_name: name.to_string(),
			synonym,
			..Default::default()
		};
		let accepted = store.seed(usage("Abies alba", false));
		let synonym = store.seed(usage("Abies pectinata", true));
		let basionym = store.seed(usage("Pinus picea", false));

		let patch = vec![UsageForeignKeys {
			usage_key: synonym,
			parent_key: Some(accepted),
			basionym_key: Some(basionym),
		}];

		store.update_foreign_keys(patch.clone(), None).await.expect("first patch");
		let once = store.usage(synonym);
		store.update_foreign_keys(patch, None).await.expect("second patch");

		assert_eq!(store.usage(synonym), once);
		let patched = once.expect("patched synonym");
		assert_eq!(patched.accepted_key, Some(KeyRef::Key(accepted)));
		assert_eq!(patched.parent_key, None);
		assert_eq!(patched.basionym_key, Some(KeyRef::Key(basionym)));
		assert_eq!(store.foreign_key_updates(), 2);
	}

	#[tokio::test]
	async fn update_of_unknown_key_fails() {
		let store = MemoryStore::new();

		assert!(matches!(
			store.inner.write(
				NameUsage {
					key: Some(42),
					..Default::default()
				},
				false
			),
			Err(Error::UsageNotFound { usage_key: 42, .. })
		));
	}

	#[tokio::test]
	async fn old_usages_are_strictly_older() {
		let now = Utc::now();
		let store = MemoryStore::with_clock(Arc::new(move || now));
		let dataset_key = Uuid::new_v4();
		let at = |stamp| NameUsage {
			dataset_key: Some(dataset_key),
			last_interpreted: Some(stamp),
			..Default::default()
		};
		let old = store.seed(at(now - chrono::Duration::seconds(10)));
		store.seed(at(now));
		store.seed(NameUsage {
			dataset_key: Some(Uuid::new_v4()),
			last_interpreted: Some(now - chrono::Duration::seconds(10)),
			..Default::default()
		});

		assert_eq!(
			store.list_old_usages(dataset_key, now).await.expect("listing"),
			vec![old]
		);
	}
}

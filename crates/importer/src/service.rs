use crate::{
	callback::ImporterCallback,
	error::Error,
	model::{NameUsage, NodeId, ProParteUsage, UsageForeignKeys, UsageKey},
};

use clb_task_system::{Completion, TaskHandle};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Write side of a downstream backend.
///
/// Every call submits the work right away and returns its handle. Work given an `after` completion only
/// starts once that completion resolved, and fails with its error if it did not succeed.
pub trait DatasetImportService: Send + Sync + 'static {
	fn name(&self) -> &'static str;

	/// Writes the records of `nodes`, in order, reporting every issued key through `source`.
	fn sync(
		&self,
		dataset_key: Uuid,
		source: Arc<dyn ImporterCallback>,
		nodes: Vec<NodeId>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error>;

	/// Writes records built outside of the graph walk, only keys of primary records are reported.
	fn sync_usages(
		&self,
		dataset_key: Uuid,
		source: Arc<dyn ImporterCallback>,
		usages: Vec<ProParteUsage>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error>;

	/// Sets the given foreign keys, leaving the ones not given untouched.
	fn update_foreign_keys(
		&self,
		foreign_keys: Vec<UsageForeignKeys>,
		after: Option<Completion<Error>>,
	) -> TaskHandle<Error>;

	fn delete_usages(&self, dataset_key: Uuid, keys: Vec<UsageKey>) -> TaskHandle<Error>;

	fn delete_dataset(&self, dataset_key: Uuid) -> TaskHandle<Error>;
}

/// Read side of the relational store.
#[async_trait]
pub trait UsageService: Send + Sync + 'static {
	/// Highest key currently stored for the dataset.
	async fn max_usage_key(&self, dataset_key: Uuid) -> Result<Option<UsageKey>, Error>;

	async fn get(&self, key: UsageKey) -> Result<Option<NameUsage>, Error>;

	/// Keys of the records of the dataset last interpreted strictly before `before`.
	async fn list_old_usages(
		&self,
		dataset_key: Uuid,
		before: DateTime<Utc>,
	) -> Result<Vec<UsageKey>, Error>;
}

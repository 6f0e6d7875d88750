use crate::{
	error::Error,
	importer::wait_handle,
	model::UsageKey,
	service::{DatasetImportService, UsageService},
};

use clb_task_system::Interrupter;

use std::time::Duration;

use chrono::TimeDelta;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Deletes the records of a dataset not written by the current run.
pub(crate) struct StaleReaper<'a> {
	pub(crate) dataset_key: Uuid,
	pub(crate) margin: Duration,
	pub(crate) usages: &'a dyn UsageService,
	pub(crate) relational: &'a dyn DatasetImportService,
	pub(crate) search: &'a dyn DatasetImportService,
	pub(crate) interrupter: &'a Interrupter,
}

impl StaleReaper<'_> {
	/// Deletes everything last interpreted before the first record of this run, minus the margin.
	///
	/// The stamp of the first record is read back from the store so all writers are judged by the same clock.
	#[instrument(skip(self), fields(dataset_key = %self.dataset_key), err)]
	pub(crate) async fn reap(&self, first_key: UsageKey) -> Result<usize, Error> {
		let first_usage_not_found = || Error::FirstUsageNotFound {
			dataset_key: self.dataset_key,
			usage_key: first_key,
		};

		let first_stamp = self
			.usages
			.get(first_key)
			.await?
			.and_then(|usage| usage.last_interpreted)
			.ok_or_else(first_usage_not_found)?;

		let Some(threshold) = TimeDelta::from_std(self.margin)
			.ok()
			.and_then(|margin| first_stamp.checked_sub_signed(margin))
		else {
			debug!(
				margin = ?self.margin,
				"Margin reaches beyond the representable time range, nothing to reap"
			);
			return Ok(0);
		};

		let stale = self
			.usages
			.list_old_usages(self.dataset_key, threshold)
			.await?;

		if stale.is_empty() {
			debug!(%threshold, "No stale usages");
			return Ok(0);
		}

		info!(count = stale.len(), %threshold, "Deleting stale usages");

		// The index goes first, a search hit must always have its row
		let (dataset_key, interrupter) = (self.dataset_key, self.interrupter);
		wait_handle(
			self.search.delete_usages(dataset_key, stale.clone()),
			dataset_key,
			interrupter,
		)
		.await?;
		wait_handle(
			self.relational.delete_usages(dataset_key, stale.clone()),
			dataset_key,
			interrupter,
		)
		.await?;

		Ok(stale.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::{backend::MemoryStore, model::NameUsage};

	use std::sync::Arc;

	use chrono::Utc;

	#[tokio::test]
	async fn unreadable_first_usage_is_fatal() {
		let store = MemoryStore::new();
		let interrupter = Interrupter::new();
		let dataset_key = Uuid::new_v4();
		let kept = store.seed(NameUsage {
			dataset_key: Some(dataset_key),
			last_interpreted: Some(Utc::now() - TimeDelta::hours(1)),
			..Default::default()
		});

		let reaper = StaleReaper {
			dataset_key,
			margin: Duration::from_secs(2),
			usages: &store,
			relational: &store,
			search: &store,
			interrupter: &interrupter,
		};

		assert!(matches!(
			reaper.reap(kept + 1).await,
			Err(Error::FirstUsageNotFound { usage_key, .. }) if usage_key == kept + 1
		));
		assert!(store.usage(kept).is_some());
	}

	#[tokio::test]
	async fn records_within_the_margin_survive() {
		let now = Utc::now();
		let store = MemoryStore::with_clock(Arc::new(move || now));
		let interrupter = Interrupter::new();
		let dataset_key = Uuid::new_v4();
		let at = |stamp| NameUsage {
			dataset_key: Some(dataset_key),
			last_interpreted: Some(stamp),
			..Default::default()
		};

		let first = store.seed(at(now));
		let old = store.seed(at(now - TimeDelta::minutes(5)));
		let recent = store.seed(at(now - TimeDelta::seconds(1)));

		let reaper = StaleReaper {
			dataset_key,
			margin: Duration::from_secs(2),
			usages: &store,
			relational: &store,
			search: &store,
			interrupter: &interrupter,
		};

		assert_eq!(reaper.reap(first).await.expect("reaped"), 1);
		assert!(store.usage(old).is_none());
		assert!(store.usage(recent).is_some());
		assert!(store.usage(first).is_some());
	}

	#[tokio::test]
	async fn failed_index_delete_keeps_relational_rows() {
		let now = Utc::now();
		let store = MemoryStore::with_clock(Arc::new(move || now));
		let search = MemoryStore::new();
		search.fail_writes("index offline");
		let interrupter = Interrupter::new();
		let dataset_key = Uuid::new_v4();
		let at = |stamp| NameUsage {
			dataset_key: Some(dataset_key),
			last_interpreted: Some(stamp),
			..Default::default()
		};

		let first = store.seed(at(now));
		let old = store.seed(at(now - TimeDelta::minutes(5)));

		let reaper = StaleReaper {
			dataset_key,
			margin: Duration::from_secs(2),
			usages: &store,
			relational: &store,
			search: &search,
			interrupter: &interrupter,
		};

		assert!(reaper.reap(first).await.is_err());
		assert!(store.usage(old).is_some());
		assert!(store.usage(first).is_some());
	}
}

use crate::model::{NodeId, Rank, UsageKey};

use clb_task_system::{DrainError, Interrupted, JoinFailure, TaskFailure, TaskId};

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

/// Everything that can bring down an import run.
///
/// None of these are recovered locally: a partially applied taxonomic sync is worse than a failed one.
/// The type is [`Clone`] because the outcome of a backend task is shared with every task depending on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
	// Consistency of the graph
	#[error(
		"higher classification reference not synced yet: <node='{node}', rank='{rank}', target='{target}'>"
	)]
	UnsyncedClassification {
		node: NodeId,
		rank: Rank,
		target: NodeId,
	},
	#[error("node has no usage key yet: <node='{0}'>")]
	UnresolvedNode(NodeId),
	#[error("node not found in graph: <node='{0}'>")]
	NodeNotFound(NodeId),
	#[error("usage key reported twice for node: <node='{node}', existing='{existing}', new='{new}'>")]
	DuplicateUsageKey {
		node: NodeId,
		existing: UsageKey,
		new: UsageKey,
	},

	// Run level failures
	#[error("no records imported for dataset <dataset_key='{0}'>, keeping all existing data")]
	EmptyImport(Uuid),
	#[error("first synced usage not found: <dataset_key='{dataset_key}', usage_key='{usage_key}'>")]
	FirstUsageNotFound {
		dataset_key: Uuid,
		usage_key: UsageKey,
	},
	#[error("import interrupted, data is likely to be inconsistent: <dataset_key='{0}'>")]
	Interrupted(Uuid),
	#[error("no normalized graph available for dataset: <dataset_key='{0}'>")]
	GraphNotFound(Uuid),

	// Backends
	#[error("backend task failed <id='{task_id}', name='{name}'>: {source}")]
	Task {
		task_id: TaskId,
		name: &'static str,
		#[source]
		source: Arc<Error>,
	},
	#[error(transparent)]
	Join(#[from] JoinFailure),
	#[error("{backend} failure: {reason}")]
	Backend {
		backend: &'static str,
		reason: String,
	},
	#[error("usage not found in {backend}: <usage_key='{usage_key}'>")]
	UsageNotFound {
		backend: &'static str,
		usage_key: UsageKey,
	},
}

impl Error {
	/// Unwraps the task layers a failure went through on its way up.
	#[must_use]
	pub fn root_cause(&self) -> &Self {
		match self {
			Self::Task { source, .. } => source.root_cause(),
			other => other,
		}
	}

	pub(crate) fn from_drain(dataset_key: Uuid, e: DrainError<Self>) -> Self {
		match e {
			DrainError::Failed(failure) => failure.into(),
			DrainError::Interrupted { .. } => Self::Interrupted(dataset_key),
		}
	}

	pub(crate) const fn from_interrupted(dataset_key: Uuid, _: Interrupted) -> Self {
		Self::Interrupted(dataset_key)
	}
}

impl From<TaskFailure<Self>> for Error {
	fn from(
		TaskFailure {
			task_id,
			name,
			source,
		}: TaskFailure<Self>,
	) -> Self {
		Self::Task {
			task_id,
			name,
			source: Arc::new(source),
		}
	}
}

/// Error loading or validating an [`ImporterConfig`](crate::ImporterConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config file: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config file: {0}")]
	Parse(#[from] serde_json::Error),
	#[error("invalid configuration: {0}")]
	Invalid(String),
}

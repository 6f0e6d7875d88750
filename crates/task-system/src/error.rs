use std::{error::Error, fmt};

use thiserror::Error;

use super::task::TaskId;

/// Bound for the error type carried by every task of a run.
///
/// It must be [`Clone`] since the outcome of a task is shared with all the [`Completion`](crate::Completion)s
/// taken from its handle, and it must be buildable from a [`JoinFailure`] so a panicking task still yields a
/// proper error to whoever is waiting on it.
pub trait RunError: Error + fmt::Debug + Clone + From<JoinFailure> + Send + Sync + 'static {}

impl<T: Error + fmt::Debug + Clone + From<JoinFailure> + Send + Sync + 'static> RunError for T {}

/// The spawned future of a task panicked or was aborted by the runtime.
#[derive(Debug, Clone, Error)]
#[error("task join error <id='{task_id}', name='{name}'>")]
pub struct JoinFailure {
	pub task_id: TaskId,
	pub name: &'static str,
}

/// A task in a [`PendingTasks`](crate::PendingTasks) queue finished with an error.
#[derive(Debug, Clone, Error)]
#[error("task failed <id='{task_id}', name='{name}'>: {source}")]
pub struct TaskFailure<E: RunError> {
	pub task_id: TaskId,
	pub name: &'static str,
	#[source]
	pub source: E,
}

#[derive(Debug, Clone, Error)]
pub enum DrainError<E: RunError> {
	#[error(transparent)]
	Failed(#[from] TaskFailure<E>),
	#[error("interrupted while waiting for {remaining} pending tasks")]
	Interrupted { remaining: usize },
}

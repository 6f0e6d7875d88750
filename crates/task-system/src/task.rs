use std::{
	fmt,
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};

use futures::{
	future::{BoxFuture, Shared},
	FutureExt,
};
use tokio::spawn;
use tracing::{error, trace, trace_span, Instrument};
use uuid::Uuid;

use super::error::{JoinFailure, RunError};

/// A unique identifier for a task using the [`uuid`](https://docs.rs/uuid) crate.
pub type TaskId = Uuid;

type SharedOutcome<E> = Shared<BoxFuture<'static, Result<(), E>>>;

/// Handle to work that was already submitted to the runtime.
///
/// Awaiting the handle yields the task outcome. Dropping it does not cancel the task, the work keeps
/// running until it finishes by itself.
#[must_use = "a `TaskHandle` should be awaited or pushed into a `PendingTasks` queue"]
pub struct TaskHandle<E: RunError> {
	id: TaskId,
	name: &'static str,
	outcome: SharedOutcome<E>,
}

impl<E: RunError> fmt::Debug for TaskHandle<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskHandle")
			.field("id", &self.id)
			.field("name", &self.name)
			.finish_non_exhaustive()
	}
}

impl<E: RunError> TaskHandle<E> {
	/// Spawns `fut` on the current tokio runtime.
	pub fn spawn<F>(name: &'static str, fut: F) -> Self
	where
		F: Future<Output = Result<(), E>> + Send + 'static,
	{
		let id = TaskId::new_v4();

		let join_handle = spawn(fut.instrument(trace_span!("task", task_id = %id, name)));

		let outcome = async move {
			match join_handle.await {
				Ok(res) => res,
				Err(e) => {
					error!(task_id = %id, name, ?e, "Task failed to join;");
					Err(JoinFailure { task_id: id, name }.into())
				}
			}
		}
		.boxed()
		.shared();

		trace!(task_id = %id, name, "Spawned task");

		Self { id, name, outcome }
	}

	/// A handle for work that already finished, used when a backend has nothing to do.
	pub fn ready(name: &'static str, res: Result<(), E>) -> Self {
		Self {
			id: TaskId::new_v4(),
			name,
			outcome: async move { res }.boxed().shared(),
		}
	}

	pub fn done(name: &'static str) -> Self {
		Self::ready(name, Ok(()))
	}

	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		self.id
	}

	#[must_use]
	pub const fn name(&self) -> &'static str {
		self.name
	}

	/// Whether the outcome is already known, without polling.
	#[must_use]
	pub fn is_finished(&self) -> bool {
		self.outcome.peek().is_some()
	}

	/// A cloneable future resolving to the same outcome as this handle, so dependent work can wait on it.
	#[must_use]
	pub fn completion(&self) -> Completion<E> {
		Completion {
			task_id: self.id,
			outcome: self.outcome.clone(),
		}
	}
}

impl<E: RunError> Future for TaskHandle<E> {
	type Output = Result<(), E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.outcome).poll(cx)
	}
}

/// Shared view of the outcome of a [`TaskHandle`].
#[derive(Clone)]
pub struct Completion<E: RunError> {
	task_id: TaskId,
	outcome: SharedOutcome<E>,
}

impl<E: RunError> fmt::Debug for Completion<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Completion")
			.field("task_id", &self.task_id)
			.finish_non_exhaustive()
	}
}

impl<E: RunError> Completion<E> {
	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		self.task_id
	}
}

impl<E: RunError> Future for Completion<E> {
	type Output = Result<(), E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.outcome).poll(cx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use thiserror::Error;

	#[derive(Debug, Clone, Error)]
	enum SampleError {
		#[error("boom")]
		Boom,
		#[error(transparent)]
		Join(#[from] JoinFailure),
	}

	const fn task_should_panic() -> bool {
		true
	}

	#[tokio::test]
	async fn completion_sees_the_same_outcome() {
		let handle = TaskHandle::<SampleError>::spawn("boom", async { Err(SampleError::Boom) });
		let first = handle.completion();
		let second = handle.completion();

		assert!(matches!(first.await, Err(SampleError::Boom)));
		assert!(matches!(second.await, Err(SampleError::Boom)));
		assert!(matches!(handle.await, Err(SampleError::Boom)));
	}

	#[tokio::test]
	async fn panicking_task_reports_join_failure() {
		let handle = TaskHandle::<SampleError>::spawn("panics", async {
			if task_should_panic() {
				panic!("task went wrong");
			}
			Ok(())
		});
		let task_id = handle.task_id();

		match handle.await {
			Err(SampleError::Join(JoinFailure { task_id: id, name })) => {
				assert_eq!(id, task_id);
				assert_eq!(name, "panics");
			}
			other => panic!("unexpected outcome: {other:?}"),
		}
	}

	#[tokio::test]
	async fn ready_handle_is_finished_once_polled() {
		let handle = TaskHandle::<SampleError>::done("noop");
		let completion = handle.completion();
		assert!(completion.await.is_ok());
		assert!(handle.is_finished());
	}
}

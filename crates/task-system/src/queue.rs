use std::collections::VecDeque;

use async_channel as chan;
use tracing::{debug, trace};

use super::{
	error::{DrainError, RunError, TaskFailure},
	interrupter::Interrupter,
	task::TaskHandle,
};

/// Sending side of the background queue, handed out to whoever needs to register auxiliary work
/// while a run is going on, possibly from other tasks.
#[derive(Debug, Clone)]
pub struct BackgroundTasks<E: RunError> {
	tx: chan::Sender<TaskHandle<E>>,
}

impl<E: RunError> BackgroundTasks<E> {
	pub fn push(&self, handle: TaskHandle<E>) {
		trace!(task_id = %handle.task_id(), name = handle.name(), "Registering background task");
		// The receiver lives as long as the owning `PendingTasks`, a closed channel means the run is gone
		// and nobody would await this task anyway
		if self.tx.try_send(handle).is_err() {
			debug!("Background queue already closed, task will run detached");
		}
	}
}

/// The two queues of outstanding work of a run.
///
/// Critical tasks are awaited at synchronization points of the run, background tasks are only drained
/// when the run finishes.
#[derive(Debug)]
pub struct PendingTasks<E: RunError> {
	critical: VecDeque<TaskHandle<E>>,
	background_tx: chan::Sender<TaskHandle<E>>,
	background_rx: chan::Receiver<TaskHandle<E>>,
}

impl<E: RunError> Default for PendingTasks<E> {
	fn default() -> Self {
		let (background_tx, background_rx) = chan::unbounded();

		Self {
			critical: VecDeque::new(),
			background_tx,
			background_rx,
		}
	}
}

impl<E: RunError> PendingTasks<E> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_critical(&mut self, handle: TaskHandle<E>) {
		self.critical.push_back(handle);
	}

	pub fn push_background(&self, handle: TaskHandle<E>) {
		self.background().push(handle);
	}

	#[must_use]
	pub fn background(&self) -> BackgroundTasks<E> {
		BackgroundTasks {
			tx: self.background_tx.clone(),
		}
	}

	#[must_use]
	pub fn critical_len(&self) -> usize {
		self.critical.len()
	}

	#[must_use]
	pub fn background_len(&self) -> usize {
		self.background_rx.len()
	}

	/// Awaits every critical task in submission order, returning how many were awaited.
	///
	/// Stops at the first failure; the tasks not yet awaited stay in the queue.
	pub async fn await_critical(&mut self, interrupter: &Interrupter) -> Result<usize, DrainError<E>> {
		let mut count = 0;

		while let Some(handle) = self.critical.pop_front() {
			count += 1;
			Self::await_one(handle, interrupter, || self.critical.len()).await?;
		}

		Ok(count)
	}

	/// Awaits every background task registered so far, including the ones registered while draining.
	pub async fn drain_background(&self, interrupter: &Interrupter) -> Result<usize, DrainError<E>> {
		let mut count = 0;

		while let Ok(handle) = self.background_rx.try_recv() {
			count += 1;
			Self::await_one(handle, interrupter, || self.background_rx.len()).await?;
		}

		Ok(count)
	}

	async fn await_one(
		handle: TaskHandle<E>,
		interrupter: &Interrupter,
		remaining: impl FnOnce() -> usize,
	) -> Result<(), DrainError<E>> {
		let (task_id, name) = (handle.task_id(), handle.name());

		match interrupter.guard(handle).await {
			Ok(Ok(())) => {
				trace!(%task_id, name, "Task completed");
				Ok(())
			}
			Ok(Err(source)) => Err(TaskFailure {
				task_id,
				name,
				source,
			}
			.into()),
			Err(_) => Err(DrainError::Interrupted {
				remaining: remaining() + 1,
			}),
		}
	}
}

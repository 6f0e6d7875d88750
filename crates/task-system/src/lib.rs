//!
//! # Task handles
//!
//! Small task layer used by the checklist importer. Work submitted to a backend is spawned on the
//! tokio runtime right away and the caller receives a [`TaskHandle`] for it. Handles can be awaited
//! once, while any number of [`Completion`]s taken from them can be awaited by dependent work.
//!
//! Handles are collected in [`PendingTasks`], which keeps two queues: the critical queue that must be
//! awaited before a run may go on, and the background queue that is only drained at the very end.
//!
//! ```
//! use clb_task_system::{Interrupter, JoinFailure, PendingTasks, TaskHandle};
//! use thiserror::Error;
//!
//! #[derive(Debug, Clone, Error)]
//! pub enum SampleError {
//!     #[error(transparent)]
//!     Join(#[from] JoinFailure),
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut pending = PendingTasks::<SampleError>::new();
//!
//!     let write = TaskHandle::spawn("write", async { Ok(()) });
//!     let mirror = TaskHandle::spawn("mirror", {
//!         let after = write.completion();
//!         async move { after.await }
//!     });
//!
//!     pending.push_critical(write);
//!     pending.push_background(mirror);
//!
//!     let interrupter = Interrupter::new();
//!     assert_eq!(pending.await_critical(&interrupter).await.ok(), Some(1));
//!     assert_eq!(pending.drain_background(&interrupter).await.ok(), Some(1));
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod error;
mod interrupter;
mod queue;
mod task;

pub use error::{DrainError, JoinFailure, RunError, TaskFailure};
pub use interrupter::{Interrupted, Interrupter};
pub use queue::{BackgroundTasks, PendingTasks};
pub use task::{Completion, TaskHandle, TaskId};

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, Error)]
#[error("waiting was interrupted")]
pub struct Interrupted;

/// Signals the coordinating side of a run that it must stop waiting.
///
/// Interruption is not a pause: whoever observes it is expected to give up the whole run.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
	token: CancellationToken,
}

impl Interrupter {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn interrupt(&self) {
		warn!("Interruption requested");
		self.token.cancel();
	}

	#[must_use]
	pub fn is_interrupted(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Waits for `fut` unless an interruption arrives first.
	pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
		tokio::select! {
			biased;
			() = self.token.cancelled() => Err(Interrupted),
			out = fut => Ok(out),
		}
	}
}

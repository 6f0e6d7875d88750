//! Importer configuration

use crate::error::ConfigError;

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::{uuid, Uuid};

/// Key of the GBIF backbone, the master reference dataset which issues its own usage keys.
pub const MASTER_DATASET_KEY: Uuid = uuid!("d7dddbf4-2cf0-4f39-9b2a-bb099caae36c");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
	/// Subtrees smaller than this stay in the batch currently being filled
	pub chunk_min_size: usize,

	/// Largest subtree synced as a single chunk, also the size of pro parte groups
	pub chunk_size: usize,

	/// Records last modified this long before the first write of a run are still kept
	pub reap_margin_secs: u64,

	/// Dataset whose keys are issued upfront, see [`MASTER_DATASET_KEY`]
	pub master_dataset_key: Uuid,

	/// Number of datasets imported concurrently by the importer service
	pub msg_pool_size: usize,
}

impl Default for ImporterConfig {
	fn default() -> Self {
		Self {
			chunk_min_size: 100,
			chunk_size: 10_000,
			reap_margin_secs: 2,
			master_dataset_key: MASTER_DATASET_KEY,
			msg_pool_size: 1,
		}
	}
}

impl ImporterConfig {
	/// Load configuration from a json file
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		info!(path = %path.display(), "Loading importer config");

		let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
		config.validate()?;

		Ok(config)
	}

	/// Load configuration from a json file, falling back to the defaults if the file doesn't exist
	pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		if path.exists() {
			Self::load(path)
		} else {
			warn!(path = %path.display(), "No importer config found, using defaults");
			Ok(Self::default())
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.chunk_size == 0 {
			return Err(ConfigError::Invalid("chunk_size must be positive".into()));
		}

		if self.chunk_min_size > self.chunk_size {
			return Err(ConfigError::Invalid(format!(
				"chunk_min_size ({}) exceeds chunk_size ({})",
				self.chunk_min_size, self.chunk_size
			)));
		}

		if self.msg_pool_size == 0 {
			return Err(ConfigError::Invalid("msg_pool_size must be positive".into()));
		}

		Ok(())
	}

	#[must_use]
	pub const fn reap_margin(&self) -> Duration {
		Duration::from_secs(self.reap_margin_secs)
	}

	#[must_use]
	pub fn is_master(&self, dataset_key: Uuid) -> bool {
		dataset_key == self.master_dataset_key
	}
}

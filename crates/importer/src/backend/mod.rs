//! In-memory backends, used to dry-run imports and in tests.

use crate::{config::ImporterConfig, importer::Importer};

use std::sync::Arc;

mod index;
mod store;

pub use index::{IndexDocument, MemoryIndex};
pub use store::{Clock, MemoryStore};

pub(crate) const RELATIONAL: &str = "relational store";
pub(crate) const SEARCH: &str = "search index";

/// Wires an importer to `store` and a freshly spawned index mirroring it.
///
/// Must be called from within a tokio runtime, the index worker is spawned on it.
#[must_use]
pub fn in_memory(config: ImporterConfig, store: &MemoryStore) -> (Importer, MemoryIndex) {
	let index = MemoryIndex::spawn(store.clone());

	let importer = Importer::new(
		config,
		Arc::new(store.clone()),
		Arc::new(index.clone()),
		Arc::new(store.clone()),
	);

	(importer, index)
}

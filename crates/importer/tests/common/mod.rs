#![allow(dead_code)]

use clb_importer::{
	backend::{Clock, MemoryIndex, MemoryStore},
	graph::GraphBuilder,
	model::{KeyRef, NameUsage, NodeId, Rank, UsageKey},
};

use std::sync::{
	atomic::{AtomicI64, Ordering},
	Arc,
};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

/// Node ids of a small conifer family.
///
/// ```text
/// Pinaceae
/// ├── Abies
/// │   ├── Abies alba
/// │   │   └── Abies pectinata (synonym)
/// │   └── Abies nigra
/// └── Picea
///     └── Picea abies
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Pinaceae {
	pub family: NodeId,
	pub abies: NodeId,
	pub alba: NodeId,
	pub pectinata: NodeId,
	pub nigra: NodeId,
	pub picea: NodeId,
	pub picea_abies: NodeId,
}

impl Pinaceae {
	pub const LEN: usize = 7;

	pub fn add_to(builder: &mut GraphBuilder) -> Self {
		let family = builder.accepted("Pinaceae", Rank::Family, None);
		let abies = builder.accepted("Abies", Rank::Genus, Some(family));
		let alba = builder.accepted("Abies alba", Rank::Species, Some(abies));
		let pectinata = builder.synonym("Abies pectinata", alba);
		let nigra = builder.accepted("Abies nigra", Rank::Species, Some(abies));
		let picea = builder.accepted("Picea", Rank::Genus, Some(family));
		let picea_abies = builder.accepted("Picea abies", Rank::Species, Some(picea));

		Self {
			family,
			abies,
			alba,
			pectinata,
			nigra,
			picea,
			picea_abies,
		}
	}

	pub fn all(&self) -> [NodeId; Self::LEN] {
		[
			self.family,
			self.abies,
			self.alba,
			self.pectinata,
			self.nigra,
			self.picea,
			self.picea_abies,
		]
	}
}

/// Clock only moving when told to.
#[derive(Debug, Clone)]
pub struct TestClock {
	base: DateTime<Utc>,
	offset_secs: Arc<AtomicI64>,
}

impl TestClock {
	pub fn new() -> Self {
		Self {
			base: Utc::now(),
			offset_secs: Arc::new(AtomicI64::new(0)),
		}
	}

	pub fn now(&self) -> DateTime<Utc> {
		self.base + TimeDelta::seconds(self.offset_secs.load(Ordering::SeqCst))
	}

	pub fn advance(&self, secs: i64) {
		self.offset_secs.fetch_add(secs, Ordering::SeqCst);
	}

	pub fn clock(&self) -> Clock {
		let this = self.clone();
		Arc::new(move || this.now())
	}
}

/// The single record of the dataset carrying `name`.
pub fn by_name(store: &MemoryStore, dataset_key: Uuid, name: &str) -> NameUsage {
	let mut found = store
		.usages(dataset_key)
		.into_iter()
		.filter(|usage| usage.scientific_name == name)
		.collect::<Vec<_>>();
	assert_eq!(found.len(), 1, "expected a single record named {name}");
	found.remove(0)
}

pub fn key_of(store: &MemoryStore, dataset_key: Uuid, name: &str) -> UsageKey {
	by_name(store, dataset_key, name)
		.key
		.expect("stored records have a key")
}

pub fn key_ref(store: &MemoryStore, dataset_key: Uuid, name: &str) -> Option<KeyRef> {
	Some(KeyRef::Key(key_of(store, dataset_key, name)))
}

/// Records of a previous run, in both the store and the index.
pub fn seed_previous_run(
	store: &MemoryStore,
	index: &MemoryIndex,
	dataset_key: Uuid,
	names: &[&str],
	last_interpreted: DateTime<Utc>,
) -> Vec<UsageKey> {
	names
		.iter()
		.map(|name| {
			let key = store.seed(NameUsage {
				dataset_key: Some(dataset_key),
				scientific_name: (*name).to_string(),
				last_interpreted: Some(last_interpreted),
				..Default::default()
			});
			if let Some(usage) = store.usage(key) {
				index.seed(usage);
			}
			key
		})
		.collect()
}

/// Whether the index holds exactly the rows of the store for the dataset.
pub fn assert_index_mirrors_store(store: &MemoryStore, index: &MemoryIndex, dataset_key: Uuid) {
	let indexed = index
		.documents(dataset_key)
		.into_iter()
		.map(|doc| doc.usage)
		.collect::<Vec<_>>();

	pretty_assertions::assert_eq!(indexed, store.usages(dataset_key));
}

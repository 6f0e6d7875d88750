use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{KeyRef, NodeId, Origin, Rank, TaxonomicStatus, UsageKey};

/// A name usage as written to the relational store and mirrored into the search index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameUsage {
	pub key: Option<UsageKey>,
	pub dataset_key: Option<Uuid>,
	/// Identifier given by the data publisher, the natural key of a record inside its dataset
	pub taxon_id: Option<String>,
	pub scientific_name: String,
	pub canonical_name: Option<String>,
	pub authorship: Option<String>,
	pub rank: Option<Rank>,
	pub taxonomic_status: TaxonomicStatus,
	pub origin: Origin,
	pub synonym: bool,
	pub parent_key: Option<KeyRef>,
	pub accepted_key: Option<KeyRef>,
	pub basionym_key: Option<KeyRef>,
	/// Key of the record all pro parte copies of a synonym were cloned from
	pub pro_parte_key: Option<KeyRef>,
	pub classification: Classification,
	pub remarks: Option<String>,
	pub last_interpreted: Option<DateTime<Utc>>,
}

impl NameUsage {
	/// Swaps every [`KeyRef::Own`] with the key just issued for this record.
	pub fn resolve_own_key(&mut self, own: UsageKey) {
		let resolve = |key: &mut Option<KeyRef>| {
			if let Some(key_ref) = key {
				*key_ref = KeyRef::Key(key_ref.or_own(own));
			}
		};

		resolve(&mut self.parent_key);
		resolve(&mut self.accepted_key);
		resolve(&mut self.basionym_key);
		resolve(&mut self.pro_parte_key);

		for key_ref in self.classification.keys.values_mut() {
			*key_ref = KeyRef::Key(key_ref.or_own(own));
		}
	}

	/// The key of the usage this one hangs from in the tree: the accepted usage for synonyms, the parent otherwise.
	#[must_use]
	pub fn tree_parent_key(&self) -> Option<KeyRef> {
		if self.synonym {
			self.accepted_key
		} else {
			self.parent_key
		}
	}
}

/// Denormalized higher classification as stored on a usage record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
	pub names: BTreeMap<Rank, String>,
	pub keys: BTreeMap<Rank, KeyRef>,
}

/// Higher classification as stored in the graph, pointing at the nodes of each rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HigherClassification {
	pub names: BTreeMap<Rank, String>,
	pub nodes: BTreeMap<Rank, NodeId>,
}

/// Usage data of a graph node, with every reference still expressed as a node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawUsage {
	/// Only set when syncing the master dataset, which issues its keys upfront
	pub key: Option<UsageKey>,
	pub taxon_id: Option<String>,
	pub scientific_name: String,
	pub canonical_name: Option<String>,
	pub authorship: Option<String>,
	pub rank: Option<Rank>,
	pub taxonomic_status: TaxonomicStatus,
	pub origin: Origin,
	/// Parent taxon for accepted nodes, primary accepted taxon for synonyms
	pub parent: Option<NodeId>,
	pub basionym: Option<NodeId>,
	pub remarks: Option<String>,
}

/// Facts computed by the normalizer for a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageFacts {
	pub classification: HigherClassification,
	pub metrics: UsageMetrics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageMetrics {
	pub num_children: u32,
	pub num_synonyms: u32,
	pub num_descendants: u32,
	pub num_species: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedName {
	pub scientific_name: String,
	pub canonical_name: Option<String>,
	pub genus_or_above: Option<String>,
	pub specific_epithet: Option<String>,
	pub infra_specific_epithet: Option<String>,
	pub authorship: Option<String>,
	pub year: Option<String>,
	pub rank: Option<Rank>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageExtensions {
	pub vernacular_names: Vec<VernacularName>,
	pub distributions: Vec<Distribution>,
	pub descriptions: Vec<String>,
	pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VernacularName {
	pub name: String,
	pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
	pub area: String,
	pub status: Option<String>,
}

/// Verbatim terms of the source record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerbatimUsage {
	pub fields: BTreeMap<String, String>,
}

/// An outgoing pro parte relation of a synonym towards one of its additional accepted taxa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProParteEdge {
	pub accepted: NodeId,
	/// Key issued upfront for this copy of the synonym, master dataset only
	#[serde(default)]
	pub usage_key: Option<UsageKey>,
}

/// Foreign keys patched after all records of a run got their keys.
///
/// For synonyms `parent_key` holds the accepted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageForeignKeys {
	pub usage_key: UsageKey,
	pub parent_key: Option<UsageKey>,
	pub basionym_key: Option<UsageKey>,
}

/// One record of a pro parte synonym, written apart from the walk once every accepted taxon has its key.
#[derive(Debug, Clone, PartialEq)]
pub struct ProParteUsage {
	pub node: NodeId,
	pub usage: NameUsage,
	/// The record attached to the primary accepted taxon, its key becomes the key of the node
	pub primary: bool,
}

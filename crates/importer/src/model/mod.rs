//! Records flowing from the graph into the downstream stores.

use std::fmt;

use serde::{Deserialize, Serialize};

mod usage;
mod vocab;

pub use usage::{
	Classification, Distribution, HigherClassification, NameUsage, ParsedName, ProParteEdge,
	ProParteUsage, RawUsage, UsageExtensions, UsageFacts, UsageForeignKeys, UsageMetrics,
	VerbatimUsage, VernacularName,
};
pub use vocab::{Origin, Rank, TaxonomicStatus};

/// Durable key issued by the relational store.
pub type UsageKey = i32;

/// Handle of a node inside the graph of a single run.
///
/// It is an index into the graph arena and carries no meaning once the run is over, only [`UsageKey`]s
/// survive across runs.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
	#[must_use]
	pub const fn new(index: u32) -> Self {
		Self(index)
	}

	#[must_use]
	pub const fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A resolved foreign key of a usage record.
///
/// `Own` stands for the key the relational store is about to generate for the very record being
/// written, so a record can point at itself within a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRef {
	Key(UsageKey),
	Own,
}

impl KeyRef {
	#[must_use]
	pub const fn key(self) -> Option<UsageKey> {
		match self {
			Self::Key(key) => Some(key),
			Self::Own => None,
		}
	}

	/// Replaces `Own` with the key just issued for the record.
	#[must_use]
	pub const fn or_own(self, own: UsageKey) -> UsageKey {
		match self {
			Self::Key(key) => key,
			Self::Own => own,
		}
	}
}

impl From<UsageKey> for KeyRef {
	fn from(key: UsageKey) -> Self {
		Self::Key(key)
	}
}

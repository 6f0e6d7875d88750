//! Node id to usage key resolution, shared by every batch of a run.

use crate::{
	error::Error,
	model::{KeyRef, NodeId, Rank, UsageForeignKeys, UsageKey},
};

use std::sync::OnceLock;

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, trace};

/// Kind of a foreign key shaped reference between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
	Parent,
	/// Resolved exactly like [`KeyKind::Parent`], synonyms hang from their accepted taxon
	Accepted,
	Basionym,
	Classification(Rank),
}

/// Write-once mapping from graph nodes to the keys issued for them by the relational store.
#[derive(Debug, Default)]
pub struct KeyTable {
	keys: DashMap<NodeId, UsageKey>,
	first: OnceLock<(NodeId, UsageKey)>,
}

impl KeyTable {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Records the key issued for `node`, the first report of a run is latched.
	pub fn report(&self, node: NodeId, key: UsageKey) -> Result<(), Error> {
		match self.keys.entry(node) {
			Entry::Occupied(entry) => Err(Error::DuplicateUsageKey {
				node,
				existing: *entry.get(),
				new: key,
			}),
			Entry::Vacant(entry) => {
				entry.insert(key);
				if self.first.set((node, key)).is_ok() {
					debug!(%node, key, "First usage key of the run");
				}
				Ok(())
			}
		}
	}

	#[must_use]
	pub fn get(&self, node: NodeId) -> Option<UsageKey> {
		self.keys.get(&node).map(|key| *key)
	}

	/// Lookup of a node that must have been synced already.
	pub fn require(&self, node: NodeId) -> Result<UsageKey, Error> {
		self.get(node).ok_or(Error::UnresolvedNode(node))
	}

	#[must_use]
	pub fn first(&self) -> Option<(NodeId, UsageKey)> {
		self.first.get().copied()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PendingKeys {
	parent: Option<NodeId>,
	basionym: Option<NodeId>,
}

/// Foreign keys that could not be resolved when their record was written, keyed by the writing node.
#[derive(Debug, Default)]
pub struct ForeignKeyLedger {
	entries: DashMap<NodeId, PendingKeys>,
}

impl ForeignKeyLedger {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn defer(&self, origin: NodeId, apply: impl FnOnce(&mut PendingKeys)) {
		apply(&mut self.entries.entry(origin).or_default());
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Translates the entries through `table` and removes them from the ledger.
	///
	/// Entries for which `hold` returns true on the origin or on any target are left in place, they are
	/// flushed by a later call. Every other reference must resolve.
	pub fn flush(
		&self,
		table: &KeyTable,
		hold: impl Fn(NodeId) -> bool,
	) -> Result<Vec<UsageForeignKeys>, Error> {
		let mut ready = Vec::new();

		for entry in &self.entries {
			let (origin, pending) = (*entry.key(), *entry.value());
			let held = hold(origin)
				|| pending.parent.is_some_and(&hold)
				|| pending.basionym.is_some_and(&hold);
			if !held {
				ready.push((origin, pending));
			}
		}

		let mut patches = Vec::with_capacity(ready.len());
		for (origin, pending) in ready {
			patches.push(UsageForeignKeys {
				usage_key: table.require(origin)?,
				parent_key: pending.parent.map(|node| table.require(node)).transpose()?,
				basionym_key: pending.basionym.map(|node| table.require(node)).transpose()?,
			});
			self.entries.remove(&origin);
		}

		debug!(
			patched = patches.len(),
			held = self.entries.len(),
			"Flushed deferred foreign keys"
		);

		Ok(patches)
	}
}

/// Resolves a reference of `origin` towards `target` into a key of the record being written.
///
/// References to nodes without a key yet are deferred into the `ledger`, except classification ones which
/// must always point at ancestors synced before.
pub fn resolve(
	table: &KeyTable,
	ledger: &ForeignKeyLedger,
	origin: NodeId,
	target: Option<NodeId>,
	kind: KeyKind,
) -> Result<Option<KeyRef>, Error> {
	let Some(target) = target else {
		return Ok(None);
	};

	if let Some(key) = table.get(target) {
		return Ok(Some(KeyRef::Key(key)));
	}

	if target == origin {
		return Ok(Some(KeyRef::Own));
	}

	trace!(%origin, %target, ?kind, "Reference to a node without key");

	match kind {
		KeyKind::Classification(rank) => {
			return Err(Error::UnsyncedClassification {
				node: origin,
				rank,
				target,
			})
		}
		KeyKind::Parent | KeyKind::Accepted => {
			ledger.defer(origin, |pending| pending.parent = Some(target));
		}
		KeyKind::Basionym => ledger.defer(origin, |pending| pending.basionym = Some(target)),
	}

	Ok(None)
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::sync::Arc;

	use pretty_assertions::assert_eq;

	#[test]
	fn table_is_write_once() {
		let table = KeyTable::new();
		let node = NodeId::new(3);

		table.report(node, 10).expect("first report");

		assert!(matches!(
			table.report(node, 11),
			Err(Error::DuplicateUsageKey {
				existing: 10,
				new: 11,
				..
			})
		));
		assert_eq!(table.get(node), Some(10));
		assert_eq!(table.first(), Some((node, 10)));
	}

	#[test]
	fn concurrent_reports_keep_a_single_key_per_node() {
		let table = Arc::new(KeyTable::new());

		let handles = (0_i32..4)
			.map(|worker| {
				let table = Arc::clone(&table);
				std::thread::spawn(move || {
					(0_u16..100)
						.filter(|i| {
							table
								.report(NodeId::new(u32::from(*i)), worker * 1000 + i32::from(*i))
								.is_ok()
						})
						.count()
				})
			})
			.collect::<Vec<_>>();

		let accepted = handles
			.into_iter()
			.map(|handle| handle.join().expect("reporting thread"))
			.sum::<usize>();

		assert_eq!(accepted, 100);
		assert_eq!(table.len(), 100);
	}

	#[test]
	fn resolution_order() {
		let table = KeyTable::new();
		let ledger = ForeignKeyLedger::new();
		let (origin, synced, later) = (NodeId::new(1), NodeId::new(0), NodeId::new(2));
		table.report(synced, 7).expect("report");

		assert_eq!(resolve(&table, &ledger, origin, None, KeyKind::Parent).ok(), Some(None));
		assert_eq!(
			resolve(&table, &ledger, origin, Some(synced), KeyKind::Classification(Rank::Genus)).ok(),
			Some(Some(KeyRef::Key(7)))
		);
		assert_eq!(
			resolve(&table, &ledger, origin, Some(origin), KeyKind::Basionym).ok(),
			Some(Some(KeyRef::Own))
		);
		assert_eq!(
			resolve(&table, &ledger, origin, Some(origin), KeyKind::Classification(Rank::Genus)).ok(),
			Some(Some(KeyRef::Own))
		);
		assert!(matches!(
			resolve(&table, &ledger, origin, Some(later), KeyKind::Classification(Rank::Genus)),
			Err(Error::UnsyncedClassification { target, .. }) if target == later
		));
		assert!(ledger.is_empty());

		assert_eq!(
			resolve(&table, &ledger, origin, Some(later), KeyKind::Basionym).ok(),
			Some(None)
		);
		assert_eq!(ledger.len(), 1);
	}

	#[test]
	fn flush_requires_every_target() {
		let table = KeyTable::new();
		let ledger = ForeignKeyLedger::new();
		let (origin, basionym) = (NodeId::new(0), NodeId::new(1));
		table.report(origin, 1).expect("report");

		resolve(&table, &ledger, origin, Some(basionym), KeyKind::Basionym).expect("deferred");

		assert!(matches!(
			ledger.flush(&table, |_| false),
			Err(Error::UnresolvedNode(node)) if node == basionym
		));

		table.report(basionym, 2).expect("report");
		assert_eq!(
			ledger.flush(&table, |_| false).expect("resolved"),
			vec![UsageForeignKeys {
				usage_key: 1,
				parent_key: None,
				basionym_key: Some(2),
			}]
		);
		assert!(ledger.is_empty());
	}

	#[test]
	fn held_entries_survive_a_flush() {
		let table = KeyTable::new();
		let ledger = ForeignKeyLedger::new();
		let (origin, pro_parte) = (NodeId::new(0), NodeId::new(1));
		table.report(origin, 1).expect("report");

		resolve(&table, &ledger, origin, Some(pro_parte), KeyKind::Basionym).expect("deferred");

		assert_eq!(ledger.flush(&table, |node| node == pro_parte).expect("held"), vec![]);
		assert_eq!(ledger.len(), 1);
	}
}

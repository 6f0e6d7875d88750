//! Records of synonyms belonging to several accepted taxa.
//!
//! Such a synonym gets one record per accepted taxon. The record attached to its primary accepted taxon is
//! written first and owns the key of the node, every other copy points back at it through its pro parte key.

use crate::{
	callback::{ImporterCallback, RunContext},
	error::Error,
	model::{KeyRef, NameUsage, NodeId, Origin, ProParteUsage, TaxonomicStatus, UsageKey},
};

use tracing::trace;

/// Records of one group of pro parte synonyms, split by the phase they are written in.
#[derive(Debug, Default)]
pub(crate) struct ProParteGroup {
	pub(crate) primaries: Vec<ProParteUsage>,
	copies: Vec<ProParteUsage>,
}

impl ProParteGroup {
	/// Builds every record of the given synonyms, all their accepted taxa must have a key already.
	pub(crate) fn read(ctx: &RunContext, nodes: &[NodeId]) -> Result<Self, Error> {
		let mut group = Self::default();

		for &node in nodes {
			let raw = ctx.graph().read_usage(node).ok_or(Error::NodeNotFound(node))?;
			let mut template = ctx.read_usage(node)?;
			template.taxonomic_status = TaxonomicStatus::ProParteSynonym;
			template.parent_key = None;

			let primary = raw.parent.ok_or(Error::NodeNotFound(node))?;
			let mut accepted_taxa = vec![(primary, raw.key)];
			accepted_taxa.extend(
				ctx.graph()
					.pro_parte_edges(node)
					.into_iter()
					.filter(|edge| edge.accepted != primary)
					.map(|edge| (edge.accepted, edge.usage_key)),
			);

			for (position, (accepted, key)) in accepted_taxa.into_iter().enumerate() {
				let usage = NameUsage {
					key,
					accepted_key: Some(KeyRef::Key(ctx.keys().require(accepted)?)),
					classification: ctx.classification_of(node, accepted)?,
					..template.clone()
				};

				trace!(%node, %accepted, position, "Pro parte record");

				if position == 0 {
					group.primaries.push(ProParteUsage {
						node,
						usage: NameUsage {
							pro_parte_key: Some(KeyRef::Own),
							..usage
						},
						primary: true,
					});
				} else {
					group.copies.push(ProParteUsage {
						node,
						usage: NameUsage {
							taxon_id: None,
							origin: Origin::ProParte,
							..usage
						},
						primary: false,
					});
				}
			}
		}

		Ok(group)
	}

	/// The copies, pointing at the records written for the primary accepted taxa.
	///
	/// Basionyms are resolved again, the primaries of the group may have issued their keys meanwhile.
	pub(crate) fn copies(self, ctx: &RunContext) -> Result<Vec<ProParteUsage>, Error> {
		self.copies
			.into_iter()
			.map(|mut copy| {
				let primary_key: UsageKey = ctx
					.usage_key(copy.node)
					.ok_or(Error::UnresolvedNode(copy.node))?;
				copy.usage.pro_parte_key = Some(KeyRef::Key(primary_key));

				if let Some(basionym_key) = ctx
					.graph()
					.read_usage(copy.node)
					.and_then(|raw| raw.basionym)
					.and_then(|basionym| ctx.keys().get(basionym))
				{
					copy.usage.basionym_key = Some(KeyRef::Key(basionym_key));
				}

				Ok(copy)
			})
			.collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.primaries.len() + self.copies.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::{graph::GraphBuilder, model::Rank};

	use clb_task_system::PendingTasks;

	use std::sync::Arc;

	use pretty_assertions::assert_eq;
	use uuid::Uuid;

	#[test]
	fn one_record_per_accepted_taxon() {
		let mut builder = GraphBuilder::new();
		let genus = builder.accepted("Abies", Rank::Genus, None);
		let alba = builder.accepted("Abies alba", Rank::Species, Some(genus));
		let nigra = builder.accepted("Abies nigra", Rank::Species, Some(genus));
		let synonym = builder.synonym("Abies vulgaris", alba);
		builder.pro_parte(synonym, alba).pro_parte(synonym, nigra);
		let graph = builder.build().expect("valid graph");

		let ctx = RunContext::new(
			Uuid::new_v4(),
			Arc::new(graph),
			None,
			PendingTasks::new().background(),
		);
		for (node, key) in [(genus, 1), (alba, 2), (nigra, 3)] {
			ctx.report_usage_key(node, key).expect("report");
		}

		let group = ProParteGroup::read(&ctx, &[synonym]).expect("readable group");
		assert_eq!(group.len(), 2);
		assert_eq!(group.primaries.len(), 1);

		let primary = &group.primaries[0].usage;
		assert_eq!(primary.accepted_key, Some(KeyRef::Key(2)));
		assert_eq!(primary.pro_parte_key, Some(KeyRef::Own));
		assert_eq!(primary.taxonomic_status, TaxonomicStatus::ProParteSynonym);

		assert!(matches!(
			ProParteGroup::read(&ctx, &[synonym]).and_then(|group| group.copies(&ctx)),
			Err(Error::UnresolvedNode(node)) if node == synonym
		));

		ctx.report_usage_key(synonym, 4).expect("report");
		let copies = group.copies(&ctx).expect("primary synced");
		assert_eq!(copies.len(), 1);
		let copy = &copies[0].usage;
		assert_eq!(copy.accepted_key, Some(KeyRef::Key(3)));
		assert_eq!(copy.pro_parte_key, Some(KeyRef::Key(4)));
		assert_eq!(copy.origin, Origin::ProParte);
		assert_eq!(copy.taxon_id, None);
		assert_eq!(
			copy.classification.keys.get(&Rank::Species),
			Some(&KeyRef::Key(3))
		);
	}
}

use crate::model::{
	HigherClassification, NodeId, ParsedName, ProParteEdge, Rank, RawUsage, TaxonomicStatus,
	UsageExtensions, UsageFacts, UsageKey, UsageMetrics, VerbatimUsage,
};

use std::{
	cmp::Ordering,
	sync::atomic::{AtomicBool, Ordering as AtomicOrdering},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::GraphReader;

#[derive(Debug, Error)]
pub enum GraphError {
	#[error("reference to a missing node: <node='{node}', target='{target}'>")]
	DanglingReference { node: NodeId, target: NodeId },
	#[error("synonym without an accepted taxon: <node='{0}'>")]
	OrphanSynonym(NodeId),
	#[error("accepted node with a synonym as parent: <node='{node}', parent='{parent}'>")]
	SynonymParent { node: NodeId, parent: NodeId },
	#[error("node not reachable from any root, the tree has a cycle: <node='{0}'>")]
	Unreachable(NodeId),
	#[error("failed to parse graph dump: {0}")]
	Parse(#[from] serde_json::Error),
	#[error("graph too large to address with node ids: <nodes='{0}'>")]
	TooLarge(usize),
}

/// A node of a [`MemoryGraph`] as stored in a graph dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphNode {
	#[serde(flatten)]
	pub usage: RawUsage,
	pub synonym: bool,
	pub pro_parte: Vec<ProParteEdge>,
	pub facts: Option<UsageFacts>,
	pub name: Option<ParsedName>,
	pub extensions: Option<UsageExtensions>,
	pub verbatim: Option<VerbatimUsage>,
}

/// Arena backed graph, node ids are positions in the arena.
#[derive(Debug, Default)]
pub struct MemoryGraph {
	nodes: Vec<GraphNode>,
	roots: Vec<NodeId>,
	children: Vec<Vec<NodeId>>,
	synonyms: Vec<Vec<NodeId>>,
	closed: AtomicBool,
}

impl MemoryGraph {
	pub fn from_nodes(nodes: Vec<GraphNode>) -> Result<Self, GraphError> {
		let count = u32::try_from(nodes.len()).map_err(|_| GraphError::TooLarge(nodes.len()))?;
		let ids = (0..count).map(NodeId::new);

		let check = |node: NodeId, target: NodeId| {
			if target.index() < nodes.len() {
				Ok(target)
			} else {
				Err(GraphError::DanglingReference { node, target })
			}
		};

		let mut roots = Vec::new();
		let mut children = vec![Vec::new(); nodes.len()];
		let mut synonyms = vec![Vec::new(); nodes.len()];

		for (id, node) in ids.zip(&nodes) {
			if let Some(basionym) = node.usage.basionym {
				check(id, basionym)?;
			}
			for edge in &node.pro_parte {
				check(id, edge.accepted)?;
			}
			if let Some(facts) = &node.facts {
				for target in facts.classification.nodes.values() {
					check(id, *target)?;
				}
			}

			match (node.synonym, node.usage.parent) {
				(true, Some(accepted)) => synonyms[check(id, accepted)?.index()].push(id),
				(true, None) => return Err(GraphError::OrphanSynonym(id)),
				(false, Some(parent)) => {
					if nodes[check(id, parent)?.index()].synonym {
						return Err(GraphError::SynonymParent { node: id, parent });
					}
					children[parent.index()].push(id);
				}
				(false, None) => roots.push(id),
			}
		}

		let by_rank_and_name = |a: &NodeId, b: &NodeId| {
			taxonomic_order(&nodes[a.index()].usage, &nodes[b.index()].usage)
		};
		roots.sort_by(by_rank_and_name);
		for ids in children.iter_mut().chain(synonyms.iter_mut()) {
			ids.sort_by(by_rank_and_name);
		}

		let graph = Self {
			nodes,
			roots,
			children,
			synonyms,
			closed: AtomicBool::new(false),
		};
		graph.check_reachability()?;

		debug!(
			nodes = graph.nodes.len(),
			roots = graph.roots.len(),
			"Loaded graph in memory"
		);

		Ok(graph)
	}

	pub fn from_json(json: &str) -> Result<Self, GraphError> {
		Self::from_nodes(serde_json::from_str(json)?)
	}

	pub fn to_json(&self) -> Result<String, GraphError> {
		serde_json::to_string_pretty(&self.nodes).map_err(Into::into)
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.closed.load(AtomicOrdering::Acquire)
	}

	fn node(&self, node: NodeId) -> Option<&GraphNode> {
		self.nodes.get(node.index())
	}

	fn check_reachability(&self) -> Result<(), GraphError> {
		let mut seen = vec![false; self.nodes.len()];
		let mut stack = self.roots.clone();

		while let Some(id) = stack.pop() {
			seen[id.index()] = true;
			for &synonym in &self.synonyms[id.index()] {
				seen[synonym.index()] = true;
			}
			stack.extend_from_slice(&self.children[id.index()]);
		}

		match seen.iter().position(|seen| !seen) {
			Some(index) => {
				// The arena size was checked to fit an u32 on construction
				#[allow(clippy::cast_possible_truncation)]
				let id = NodeId::new(index as u32);
				Err(GraphError::Unreachable(id))
			}
			None => Ok(()),
		}
	}
}

fn taxonomic_order(a: &RawUsage, b: &RawUsage) -> Ordering {
	match (a.rank, b.rank) {
		(Some(a_rank), Some(b_rank)) => a_rank.cmp(&b_rank),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	}
	.then_with(|| a.scientific_name.cmp(&b.scientific_name))
}

impl GraphReader for MemoryGraph {
	fn node_count(&self) -> usize {
		self.nodes.len()
	}

	fn roots(&self) -> Vec<NodeId> {
		self.roots.clone()
	}

	fn children(&self, node: NodeId) -> Vec<NodeId> {
		self.children.get(node.index()).cloned().unwrap_or_default()
	}

	fn synonyms(&self, node: NodeId) -> Vec<NodeId> {
		self.synonyms.get(node.index()).cloned().unwrap_or_default()
	}

	fn pro_parte_edges(&self, node: NodeId) -> Vec<ProParteEdge> {
		self.node(node)
			.map(|node| node.pro_parte.clone())
			.unwrap_or_default()
	}

	fn is_synonym(&self, node: NodeId) -> bool {
		self.node(node).is_some_and(|node| node.synonym)
	}

	fn read_usage(&self, node: NodeId) -> Option<RawUsage> {
		self.node(node).map(|node| node.usage.clone())
	}

	fn read_facts(&self, node: NodeId) -> Option<UsageFacts> {
		self.node(node).and_then(|node| node.facts.clone())
	}

	fn read_name(&self, node: NodeId) -> Option<ParsedName> {
		self.node(node).and_then(|node| node.name.clone())
	}

	fn read_extensions(&self, node: NodeId) -> Option<UsageExtensions> {
		self.node(node).and_then(|node| node.extensions.clone())
	}

	fn read_verbatim(&self, node: NodeId) -> Option<VerbatimUsage> {
		self.node(node).and_then(|node| node.verbatim.clone())
	}

	fn is_pro_parte(&self, node: NodeId) -> bool {
		self.node(node).is_some_and(|node| {
			node.pro_parte
				.iter()
				.any(|edge| Some(edge.accepted) != node.usage.parent)
		})
	}

	fn close(&self) {
		debug!("Closing in memory graph");
		self.closed.store(true, AtomicOrdering::Release);
	}
}

/// Builds a [`MemoryGraph`] the way the normalizer would leave it, denormalizing the higher classification
/// and the metrics of accepted nodes from the parent links.
#[derive(Debug, Default)]
pub struct GraphBuilder {
	nodes: Vec<GraphNode>,
	classification_overrides: Vec<(NodeId, Rank, NodeId)>,
}

impl GraphBuilder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn push(&mut self, node: GraphNode) -> NodeId {
		#[allow(clippy::cast_possible_truncation)]
		let id = NodeId::new(self.nodes.len() as u32);
		self.nodes.push(node);
		id
	}

	pub fn accepted(&mut self, name: &str, rank: Rank, parent: Option<NodeId>) -> NodeId {
		self.push(GraphNode {
			usage: RawUsage {
				taxon_id: Some(format!("t{}", self.nodes.len())),
				scientific_name: name.to_string(),
				canonical_name: Some(name.to_string()),
				rank: Some(rank),
				parent,
				..Default::default()
			},
			name: Some(ParsedName {
				scientific_name: name.to_string(),
				canonical_name: Some(name.to_string()),
				rank: Some(rank),
				..Default::default()
			}),
			..Default::default()
		})
	}

	pub fn synonym(&mut self, name: &str, accepted: NodeId) -> NodeId {
		let rank = self.nodes[accepted.index()].usage.rank;
		self.push(GraphNode {
			usage: RawUsage {
				taxon_id: Some(format!("t{}", self.nodes.len())),
				scientific_name: name.to_string(),
				canonical_name: Some(name.to_string()),
				rank,
				taxonomic_status: TaxonomicStatus::Synonym,
				parent: Some(accepted),
				..Default::default()
			},
			synonym: true,
			..Default::default()
		})
	}

	pub fn basionym(&mut self, node: NodeId, basionym: NodeId) -> &mut Self {
		self.nodes[node.index()].usage.basionym = Some(basionym);
		self
	}

	pub fn pro_parte(&mut self, synonym: NodeId, accepted: NodeId) -> &mut Self {
		self.nodes[synonym.index()].pro_parte.push(ProParteEdge {
			accepted,
			usage_key: None,
		});
		self
	}

	/// Gives the node a key issued upfront, as the master dataset does.
	pub fn usage_key(&mut self, node: NodeId, key: UsageKey) -> &mut Self {
		self.nodes[node.index()].usage.key = Some(key);
		self
	}

	/// Points a classification rank of `node` at any other node, replacing the denormalized one.
	pub fn classification(&mut self, node: NodeId, rank: Rank, target: NodeId) -> &mut Self {
		self.classification_overrides.push((node, rank, target));
		self
	}

	pub fn node_mut(&mut self, node: NodeId) -> &mut GraphNode {
		&mut self.nodes[node.index()]
	}

	pub fn build(mut self) -> Result<MemoryGraph, GraphError> {
		for index in 0..self.nodes.len() {
			if self.nodes[index].synonym {
				continue;
			}
			let facts = self.denormalize(index);
			self.nodes[index].facts = Some(facts);
		}

		for (node, rank, target) in self.classification_overrides {
			let name = self
				.nodes
				.get(target.index())
				.map(|target| target.usage.scientific_name.clone())
				.unwrap_or_default();
			let facts = self.nodes[node.index()].facts.get_or_insert_with(Default::default);
			facts.classification.nodes.insert(rank, target);
			facts.classification.names.insert(rank, name);
		}

		MemoryGraph::from_nodes(self.nodes)
	}

	fn denormalize(&self, index: usize) -> UsageFacts {
		let mut classification = HigherClassification::default();
		let mut current = Some(index);
		let mut depth = 0;

		while let Some(i) = current {
			let usage = &self.nodes[i].usage;
			if let Some(rank) = usage.rank.filter(|rank| Rank::DWC_RANKS.contains(rank)) {
				#[allow(clippy::cast_possible_truncation)]
				let id = NodeId::new(i as u32);
				classification.nodes.entry(rank).or_insert(id);
				classification
					.names
					.entry(rank)
					.or_insert_with(|| usage.scientific_name.clone());
			}
			current = usage.parent.map(NodeId::index);
			depth += 1;
			if depth > self.nodes.len() {
				break;
			}
		}

		let child_indexes = |parent: usize| {
			self.nodes.iter().enumerate().filter(move |(_, node)| {
				!node.synonym && node.usage.parent.map(NodeId::index) == Some(parent)
			})
		};

		let mut metrics = UsageMetrics::default();
		let mut stack = vec![index];
		while let Some(i) = stack.pop() {
			for (child, node) in child_indexes(i) {
				if i == index {
					metrics.num_children += 1;
				}
				metrics.num_descendants += 1;
				if node.usage.rank == Some(Rank::Species) {
					metrics.num_species += 1;
				}
				stack.push(child);
			}
		}
		#[allow(clippy::cast_possible_truncation)]
		let num_synonyms = self
			.nodes
			.iter()
			.filter(|node| node.synonym && node.usage.parent.map(NodeId::index) == Some(index))
			.count() as u32;
		metrics.num_synonyms = num_synonyms;

		UsageFacts {
			classification,
			metrics,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn children_follow_rank_and_name() {
		let mut builder = GraphBuilder::new();
		let kingdom = builder.accepted("Animalia", Rank::Kingdom, None);
		let b = builder.accepted("Bfamily", Rank::Family, Some(kingdom));
		let a = builder.accepted("Afamily", Rank::Family, Some(kingdom));
		let order = builder.accepted("Zorder", Rank::Order, Some(kingdom));
		let graph = builder.build().expect("valid graph");

		assert_eq!(graph.roots(), vec![kingdom]);
		assert_eq!(graph.children(kingdom), vec![order, a, b]);
	}

	#[test]
	fn classification_is_denormalized_from_parents() {
		let mut builder = GraphBuilder::new();
		let kingdom = builder.accepted("Plantae", Rank::Kingdom, None);
		let genus = builder.accepted("Abies", Rank::Genus, Some(kingdom));
		let species = builder.accepted("Abies alba", Rank::Species, Some(genus));
		let graph = builder.build().expect("valid graph");

		let facts = graph.read_facts(species).expect("facts of accepted node");
		assert_eq!(facts.classification.nodes.get(&Rank::Kingdom), Some(&kingdom));
		assert_eq!(facts.classification.nodes.get(&Rank::Genus), Some(&genus));
		assert_eq!(facts.classification.nodes.get(&Rank::Species), Some(&species));
		assert_eq!(
			graph.read_facts(kingdom).map(|facts| facts.metrics.num_descendants),
			Some(2)
		);
	}

	#[test]
	fn synonym_as_parent_is_rejected() {
		let mut builder = GraphBuilder::new();
		let genus = builder.accepted("Abies", Rank::Genus, None);
		let synonym = builder.synonym("Abia", genus);
		builder.accepted("Abies alba", Rank::Species, Some(synonym));

		assert!(matches!(
			builder.build(),
			Err(GraphError::SynonymParent { parent, .. }) if parent == synonym
		));
	}

	#[test]
	fn dump_round_trips_through_json() {
		let mut builder = GraphBuilder::new();
		let genus = builder.accepted("Abies", Rank::Genus, None);
		let synonym = builder.synonym("Abia", genus);
		let graph = builder.build().expect("valid graph");

		let reloaded = MemoryGraph::from_json(&graph.to_json().expect("serializable"))
			.expect("valid dump");

		assert_eq!(reloaded.synonyms(genus), vec![synonym]);
		assert!(reloaded.is_synonym(synonym));
	}
}

//! Splitting of the taxonomic walk into a main spine and subtree chunks.

use crate::{config::ImporterConfig, graph::GraphReader, model::NodeId};

use tracing::debug;

/// What the walk found at the next position of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStep {
	/// A node belonging to the batch currently being filled
	Node(NodeId),
	/// Root of a subtree to be synced on its own, the walk does not descend into it
	Chunk(NodeId),
	/// A synonym with several accepted taxa, expanded once the walk is over
	ProParte(NodeId),
}

/// All nodes of a chunk, in taxonomic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
	pub root: NodeId,
	pub nodes: Vec<NodeId>,
	pub pro_parte: Vec<NodeId>,
}

/// The complete partition of a graph, as the importer would submit it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
	pub batches: Vec<Vec<NodeId>>,
	pub chunks: Vec<Chunk>,
	pub pro_parte: Vec<NodeId>,
}

/// Decides which subtrees get synced as separate chunks.
///
/// The size of a subtree counts its root, every accepted descendant and their synonyms, pro parte
/// synonyms excluded. Subtrees below `min_size` stay with the batch being filled, subtrees up to
/// `max_size` become chunks. Larger subtrees are walked further so that their big children become chunks,
/// unless none of their children reaches `min_size`, in which case they form a single oversized chunk.
#[derive(Debug)]
pub struct ChunkPlanner<'g, G: GraphReader + ?Sized> {
	graph: &'g G,
	min_size: usize,
	max_size: usize,
	sizes: Vec<usize>,
	splittable: Vec<bool>,
}

impl<'g, G: GraphReader + ?Sized> ChunkPlanner<'g, G> {
	pub fn new(graph: &'g G, min_size: usize, max_size: usize) -> Self {
		let mut order = Vec::with_capacity(graph.node_count());
		let mut stack = graph.roots();
		while let Some(node) = stack.pop() {
			order.push(node);
			stack.extend(graph.children(node));
		}

		let mut sizes = vec![0; graph.node_count()];
		let mut splittable = vec![false; graph.node_count()];

		// Children come after their parent in `order`
		for &node in order.iter().rev() {
			let synonyms = graph
				.synonyms(node)
				.into_iter()
				.filter(|synonym| !graph.is_pro_parte(*synonym))
				.count();

			let mut size = 1 + synonyms;
			for child in graph.children(node) {
				size += sizes[child.index()];
				splittable[node.index()] |= sizes[child.index()] >= min_size;
			}
			sizes[node.index()] = size;
		}

		debug!(
			nodes = order.len(),
			min_size,
			max_size,
			"Computed subtree sizes"
		);

		Self {
			graph,
			min_size,
			max_size,
			sizes,
			splittable,
		}
	}

	pub fn from_config(graph: &'g G, config: &ImporterConfig) -> Self {
		Self::new(graph, config.chunk_min_size, config.chunk_size)
	}

	#[must_use]
	pub fn subtree_size(&self, node: NodeId) -> usize {
		self.sizes.get(node.index()).copied().unwrap_or_default()
	}

	#[must_use]
	pub fn is_chunk(&self, node: NodeId) -> bool {
		let size = self.subtree_size(node);
		size >= self.min_size
			&& (size <= self.max_size || !self.splittable.get(node.index()).copied().unwrap_or_default())
	}

	/// Taxonomic walk over all roots: a node, its synonyms, then its children.
	#[must_use]
	pub fn walk(&self) -> Walk<'_, 'g, G> {
		let mut stack = self.graph.roots();
		stack.reverse();

		Walk {
			planner: self,
			stack,
		}
	}

	/// Reads every node of the subtree rooted at `root`.
	#[must_use]
	pub fn read_chunk(&self, root: NodeId) -> Chunk {
		let mut chunk = Chunk {
			root,
			nodes: Vec::with_capacity(self.subtree_size(root)),
			pro_parte: Vec::new(),
		};

		let mut stack = vec![root];
		while let Some(node) = stack.pop() {
			chunk.nodes.push(node);
			for synonym in self.graph.synonyms(node) {
				if self.graph.is_pro_parte(synonym) {
					chunk.pro_parte.push(synonym);
				} else {
					chunk.nodes.push(synonym);
				}
			}
			stack.extend(self.graph.children(node).into_iter().rev());
		}

		chunk
	}

	/// Computes the whole partition without syncing anything.
	#[must_use]
	pub fn plan(&self) -> Plan {
		let mut plan = Plan::default();
		let mut batch = Vec::new();

		for step in self.walk() {
			match step {
				WalkStep::Node(node) => batch.push(node),
				WalkStep::ProParte(node) => plan.pro_parte.push(node),
				WalkStep::Chunk(root) => {
					if !batch.is_empty() {
						plan.batches.push(std::mem::take(&mut batch));
					}
					let chunk = self.read_chunk(root);
					plan.pro_parte.extend_from_slice(&chunk.pro_parte);
					plan.chunks.push(chunk);
				}
			}
		}

		if !batch.is_empty() {
			plan.batches.push(batch);
		}

		plan
	}
}

#[derive(Debug)]
pub struct Walk<'p, 'g, G: GraphReader + ?Sized> {
	planner: &'p ChunkPlanner<'g, G>,
	stack: Vec<NodeId>,
}

impl<G: GraphReader + ?Sized> Iterator for Walk<'_, '_, G> {
	type Item = WalkStep;

	fn next(&mut self) -> Option<Self::Item> {
		let node = self.stack.pop()?;
		let graph = self.planner.graph;

		if graph.is_synonym(node) {
			return Some(if graph.is_pro_parte(node) {
				WalkStep::ProParte(node)
			} else {
				WalkStep::Node(node)
			});
		}

		if self.planner.is_chunk(node) {
			return Some(WalkStep::Chunk(node));
		}

		self.stack.extend(graph.children(node).into_iter().rev());
		self.stack.extend(graph.synonyms(node).into_iter().rev());

		Some(WalkStep::Node(node))
	}
}

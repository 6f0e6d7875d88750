//! Read access to the normalized checklist graph.

use crate::model::{
	NodeId, ParsedName, ProParteEdge, RawUsage, UsageExtensions, UsageFacts, VerbatimUsage,
};

mod memory;

pub use memory::{GraphBuilder, GraphError, GraphNode, MemoryGraph};

/// Read-only view over the graph built by the normalizer for one dataset.
///
/// Ordered accessors return nodes in taxonomic order, parents always come before their children.
pub trait GraphReader: Send + Sync + 'static {
	fn node_count(&self) -> usize;

	/// Accepted nodes without a parent.
	fn roots(&self) -> Vec<NodeId>;

	/// Accepted children of an accepted node.
	fn children(&self, node: NodeId) -> Vec<NodeId>;

	/// Synonyms whose primary accepted taxon is `node`, pro parte relations are not followed.
	fn synonyms(&self, node: NodeId) -> Vec<NodeId>;

	/// Additional accepted taxa of a pro parte synonym.
	fn pro_parte_edges(&self, node: NodeId) -> Vec<ProParteEdge>;

	fn is_synonym(&self, node: NodeId) -> bool;

	fn read_usage(&self, node: NodeId) -> Option<RawUsage>;

	fn read_facts(&self, node: NodeId) -> Option<UsageFacts>;

	fn read_name(&self, node: NodeId) -> Option<ParsedName>;

	fn read_extensions(&self, node: NodeId) -> Option<UsageExtensions>;

	fn read_verbatim(&self, node: NodeId) -> Option<VerbatimUsage>;

	/// Whether the synonym is also attached to accepted taxa other than its primary one.
	fn is_pro_parte(&self, node: NodeId) -> bool {
		let primary = self.parent(node);
		self.pro_parte_edges(node)
			.iter()
			.any(|edge| Some(edge.accepted) != primary)
	}

	/// Parent of an accepted node or primary accepted taxon of a synonym.
	fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.read_usage(node).and_then(|usage| usage.parent)
	}

	/// Releases whatever the reader holds on the underlying store, called once a run is done with it.
	fn close(&self) {}
}

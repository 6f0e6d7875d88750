mod args;

pub use args::PlanArgs;

use crate::context::{load_graph, Context};

use clb_importer::{
	chunking::ChunkPlanner,
	graph::{GraphReader, MemoryGraph},
	model::NodeId,
};

use anyhow::Result;
use itertools::Itertools;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PlanOutput {
	nodes: usize,
	batches: Vec<PartOutput>,
	chunks: Vec<PartOutput>,
	pro_parte: Vec<NodeId>,
}

#[derive(Debug, Serialize)]
struct PartOutput {
	root: Option<String>,
	size: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	nodes: Option<Vec<NodeId>>,
}

impl PartOutput {
	fn new(graph: &MemoryGraph, root: Option<NodeId>, nodes: Vec<NodeId>, list: bool) -> Self {
		Self {
			root: root
				.and_then(|root| graph.read_usage(root))
				.map(|usage| usage.scientific_name),
			size: nodes.len(),
			nodes: list.then_some(nodes),
		}
	}

	fn print(&self, label: &str) {
		let root = self.root.as_deref().unwrap_or("main");
		println!("  {label} {root}: {} usages", self.size);
		if let Some(nodes) = &self.nodes {
			println!("    {}", nodes.iter().join(" "));
		}
	}
}

pub async fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
	let graph = load_graph(&args.graph).await?;

	let plan = ChunkPlanner::from_config(&graph, &ctx.config).plan();

	let output = PlanOutput {
		nodes: graph.node_count(),
		batches: plan
			.batches
			.into_iter()
			.map(|batch| PartOutput::new(&graph, None, batch, args.nodes))
			.collect(),
		chunks: plan
			.chunks
			.into_iter()
			.map(|chunk| PartOutput::new(&graph, Some(chunk.root), chunk.nodes, args.nodes))
			.collect(),
		pro_parte: plan.pro_parte,
	};

	ctx.print(&output, |output| {
		println!(
			"{} nodes, chunk sizes {}..={}",
			output.nodes, ctx.config.chunk_min_size, ctx.config.chunk_size
		);
		for batch in &output.batches {
			batch.print("batch");
		}
		for chunk in &output.chunks {
			chunk.print("chunk");
		}
		if !output.pro_parte.is_empty() {
			println!("  pro parte synonyms: {}", output.pro_parte.iter().join(", "));
		}
	})
}

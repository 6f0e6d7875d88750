use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
	/// Graph dump, as written by the normalizer
	pub graph: PathBuf,

	/// List every node of the batches and chunks instead of their sizes
	#[arg(long, default_value_t = false)]
	pub nodes: bool,
}

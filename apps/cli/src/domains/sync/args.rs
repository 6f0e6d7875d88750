use clap::Args;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
	/// Graph dump, as written by the normalizer
	pub graph: PathBuf,

	/// Dataset the graph belongs to, a random one when missing
	#[arg(long)]
	pub dataset_key: Option<Uuid>,

	/// Import the same dump several times, each run reaping the records of the previous one
	#[arg(long, default_value_t = 1)]
	pub runs: usize,
}

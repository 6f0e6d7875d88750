use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	/// Directory of graph dumps, each named after its dataset key (`<uuid>.json`)
	pub dir: PathBuf,
}

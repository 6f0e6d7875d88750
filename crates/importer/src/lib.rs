//!
//! # Checklist importer
//!
//! Projects the normalized taxonomic graph of a dataset into the relational store, which issues the durable
//! usage keys, and into the search index mirroring it. The tree is walked once, top down, so that parents and
//! higher classification are always written before the records pointing at them. References that cannot be
//! resolved while writing are patched once the walk is over, pro parte synonyms get one record per accepted
//! taxon and records of previous runs are reaped at the very end.
//!

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod backend;
pub mod chunking;
pub mod graph;
pub mod keys;
pub mod listener;
pub mod model;

mod callback;
mod config;
mod error;
mod importer;
mod pro_parte;
mod reaper;
mod service;

pub use callback::{ImporterCallback, RunContext};
pub use config::{ImporterConfig, MASTER_DATASET_KEY};
pub use error::{ConfigError, Error};
pub use importer::{ImportReport, ImportState, Importer};
pub use service::{DatasetImportService, UsageService};

pub use clb_task_system::Interrupter;

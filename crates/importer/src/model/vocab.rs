use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
	Serialize,
	Deserialize,
	Display,
	EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Rank {
	Kingdom,
	Phylum,
	Class,
	Order,
	Family,
	Genus,
	Subgenus,
	Species,
	Subspecies,
	Variety,
	Form,
	Unranked,
}

impl Rank {
	/// The ranks of the denormalized Darwin Core classification, highest first.
	pub const DWC_RANKS: [Self; 8] = [
		Self::Kingdom,
		Self::Phylum,
		Self::Class,
		Self::Order,
		Self::Family,
		Self::Genus,
		Self::Subgenus,
		Self::Species,
	];
}

#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaxonomicStatus {
	#[default]
	Accepted,
	Doubtful,
	Synonym,
	HeterotypicSynonym,
	HomotypicSynonym,
	ProParteSynonym,
	Misapplied,
}

impl TaxonomicStatus {
	#[must_use]
	pub const fn is_synonym(self) -> bool {
		!matches!(self, Self::Accepted | Self::Doubtful)
	}
}

#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Origin {
	#[default]
	Source,
	DenormedClassification,
	VerbatimAccepted,
	VerbatimBasionym,
	ProParte,
	Autonym,
	ImplicitName,
	MissingAccepted,
	Other,
}

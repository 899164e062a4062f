//! Core record types.
//!
//! Every artifact exchanged between stages deserializes into one of these
//! types. Taxa never carry a stored parent: use [`Taxon::parent_id`], which
//! derives it from the id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids;

/// Transform class tag marking a transform that yields a different part.
pub const PART_CHANGING_CLASS: &str = "part_changing";

/// Biological kingdom, encoded as the second segment of a taxon id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kingdom {
    /// `tx:p:*`
    Plant,
    /// `tx:f:*`
    Fungus,
    /// `tx:a:*`
    Animal,
}

const PLANT_RANKS: &[&str] = &[
    "kingdom", "phylum", "class", "order", "family", "subfamily", "tribe", "genus", "species",
    "subspecies", "variety", "cultivar", "group",
];

const FUNGUS_RANKS: &[&str] = &[
    "kingdom", "phylum", "class", "order", "family", "genus", "species", "strain",
];

const ANIMAL_RANKS: &[&str] = &[
    "kingdom", "phylum", "class", "order", "family", "subfamily", "genus", "species",
    "subspecies", "breed",
];

impl Kingdom {
    /// Resolves a kingdom from its id code (`p`, `f`, `a`).
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "p" => Some(Self::Plant),
            "f" => Some(Self::Fungus),
            "a" => Some(Self::Animal),
            _ => None,
        }
    }

    /// Resolves the kingdom of a taxon id, or `None` for the root.
    #[must_use]
    pub fn of_id(id: &str) -> Option<Self> {
        ids::kingdom_code(id).and_then(Self::from_code)
    }

    /// Returns the id code of this kingdom.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Plant => "p",
            Self::Fungus => "f",
            Self::Animal => "a",
        }
    }

    /// Returns the lowercase name used in policy keys and part kinds.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plant => "plant",
            Self::Fungus => "fungus",
            Self::Animal => "animal",
        }
    }

    /// Returns the controlled rank vocabulary of this kingdom.
    #[must_use]
    pub fn ranks(self) -> &'static [&'static str] {
        match self {
            Self::Plant => PLANT_RANKS,
            Self::Fungus => FUNGUS_RANKS,
            Self::Animal => ANIMAL_RANKS,
        }
    }

    /// Returns true if `rank` is in this kingdom's vocabulary.
    #[must_use]
    pub fn allows_rank(self, rank: &str) -> bool {
        self.ranks().contains(&rank)
    }
}

/// A node of the biological taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    /// Colon-delimited path id (`tx:p:malus:domestica`).
    pub id: String,
    /// Rank from the kingdom's controlled vocabulary.
    pub rank: String,
    /// Common display name.
    pub display_name: String,
    /// Scientific name.
    pub latin_name: String,
    /// Alternative names used for search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    /// Optional external cross-reference id (e.g. an NCBI taxid).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xref: Option<String>,
}

impl Taxon {
    /// Returns the derived parent id, or `None` for the root.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        ids::parent_of(&self.id)
    }

    /// Returns the kingdom, or `None` for the root.
    #[must_use]
    pub fn kingdom(&self) -> Option<Kingdom> {
        Kingdom::of_id(&self.id)
    }

    /// Returns the hierarchical depth of this taxon.
    #[must_use]
    pub fn depth(&self) -> usize {
        ids::depth(&self.id)
    }
}

/// Kingdom tag of a part, or `derived` for parts produced from another part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    /// A plant organ.
    Plant,
    /// A fungal structure.
    Fungus,
    /// An animal tissue or product.
    Animal,
    /// Derived from another part (flour from grain).
    Derived,
}

impl PartKind {
    /// Returns the lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plant => "plant",
            Self::Fungus => "fungus",
            Self::Animal => "animal",
            Self::Derived => "derived",
        }
    }
}

/// A structural part of a taxon (fruit, muscle, milk, flour).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Part id (`part:fruit`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Kingdom tag or `derived`.
    pub kind: PartKind,
    /// Free-form grouping (`organ`, `tissue`, `product`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Parent part for derived parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Explicit taxon-prefix allow-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<Vec<String>>,
    /// Alternative names used for search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    /// Transform path that introduces this part from its parent (promotion).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proto_path: Vec<PathStep>,
}

impl Part {
    /// Returns true if this part is introduced by a part-changing transform path.
    #[must_use]
    pub fn is_promotion(&self) -> bool {
        !self.proto_path.is_empty()
    }
}

/// Value kind of a transform parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// One of a closed list of string values.
    Enum,
    /// A numeric value, eligible for bucketing.
    Number,
    /// A boolean flag.
    Boolean,
}

/// Schema of one transform parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter key.
    pub key: String,
    /// Value kind.
    pub kind: ParamKind,
    /// Allowed values for `enum` parameters.
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Whether this parameter participates in the identity signature.
    #[serde(default)]
    pub identity_param: bool,
    /// Unit label for numeric parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A processing step definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Transform id (`tf:cure`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Class tag (`cooking`, `preservation`, `part_changing`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Whether this step changes compositional identity.
    #[serde(default)]
    pub identity: bool,
    /// Position in the canonical processing sequence.
    pub order: i64,
    /// Parameter schema.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
    /// Alternative names used for search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Transform {
    /// Returns the schema of parameter `key`, if declared.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.key == key)
    }

    /// Returns true if this transform is tagged part-changing.
    #[must_use]
    pub fn is_part_changing(&self) -> bool {
        self.class.as_deref() == Some(PART_CHANGING_CLASS)
    }
}

/// One step of a transform path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// Transform id.
    #[serde(alias = "transform_id")]
    pub id: String,
    /// Parameter values keyed by parameter key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl PathStep {
    /// Creates a step without parameters.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter value.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// A (taxon, part) pairing: the part is structurally present on the taxon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubstrateEdge {
    /// Taxon id.
    pub taxon_id: String,
    /// Part id.
    pub part_id: String,
}

impl SubstrateEdge {
    /// Creates an edge.
    #[must_use]
    pub fn new(taxon_id: impl Into<String>, part_id: impl Into<String>) -> Self {
        Self {
            taxon_id: taxon_id.into(),
            part_id: part_id.into(),
        }
    }

    /// Returns the composite TP id of this edge.
    #[must_use]
    pub fn tp_id(&self) -> String {
        ids::tp_id(&self.taxon_id, &self.part_id)
    }
}

/// One row of `tmp/tp_index.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpIndexRow {
    /// Composite `taxon|part` id.
    pub id: String,
    /// Taxon id.
    pub taxon_id: String,
    /// Part id.
    pub part_id: String,
    /// Kingdom of the taxon.
    pub kingdom: Kingdom,
    /// Rank of the taxon.
    pub rank: String,
}

/// Where a TPT candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Hand-curated; authoritative on collision.
    #[default]
    Seed,
    /// Produced by family expansion.
    Generated,
}

impl Provenance {
    /// Returns the lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Generated => "generated",
        }
    }
}

/// A TPT before canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TptCandidate {
    /// Taxon id.
    pub taxon_id: String,
    /// Part id.
    pub part_id: String,
    /// Family tag, if known.
    #[serde(default, alias = "family_hint", skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Ordered transform path as authored.
    #[serde(default)]
    pub path: Vec<PathStep>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Alternative names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Seed or generated.
    #[serde(default)]
    pub provenance: Provenance,
}

impl TptCandidate {
    /// Creates a bare candidate.
    #[must_use]
    pub fn new(
        taxon_id: impl Into<String>,
        part_id: impl Into<String>,
        path: Vec<PathStep>,
        provenance: Provenance,
    ) -> Self {
        Self {
            taxon_id: taxon_id.into(),
            part_id: part_id.into(),
            family: None,
            path,
            name: None,
            synonyms: Vec::new(),
            notes: None,
            provenance,
        }
    }

    /// Returns the composite TP id of this candidate's substrate.
    #[must_use]
    pub fn tp_id(&self) -> String {
        ids::tp_id(&self.taxon_id, &self.part_id)
    }
}

/// A deduplicated, content-addressed TPT node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTpt {
    /// `taxon|part|suffix`.
    pub id: String,
    /// Taxon id.
    pub taxon_id: String,
    /// Part id.
    pub part_id: String,
    /// Family tag (`unknown` when unresolved).
    pub family: String,
    /// Display name.
    pub name: String,
    /// Alternative names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Canonical identity steps (identity transforms only, ordered, bucketed).
    pub identity: Vec<PathStep>,
    /// Full SHA-256 of the canonical signature encoding.
    pub identity_hash: String,
    /// Full provenance path of the surviving record (known transforms only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathStep>,
    /// Provenance of the surviving record.
    pub provenance: Provenance,
}

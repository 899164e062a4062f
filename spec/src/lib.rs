//! Taxograph record kinds encoded as typed Rust data.
//!
//! The `taxograph-spec` crate defines every record that crosses a stage
//! boundary in the taxograph compiler (taxa, parts, transforms, substrate
//! edges, TPT candidates and canonical TPTs) plus the read-only rule
//! records, the boolean condition language used by flag and cuisine rules,
//! and the canonical encoding that content-addressed TPT ids are hashed from.
//!
//! No stage touches an untyped map: every artifact is read through
//! [`io`] into one of these types and written back out the same way.
//!
//! # Entry Point
//!
//! ```
//! use taxograph_spec::ids;
//!
//! assert_eq!(ids::parent_of("tx:p:malus:domestica"), Some("tx:p:malus"));
//! assert!(ids::matches_prefix("tx:p:malus:domestica", "tx:p:malus"));
//! assert!(!ids::matches_prefix("tx:p:malusx", "tx:p:malus"));
//! ```
//!
//! # Canonical encoding
//!
//! ```
//! use serde_json::json;
//! use taxograph_spec::serializer::canonical;
//!
//! let text = canonical::encode(&json!({"b": 1, "a": [true, "x"]}));
//! assert_eq!(text, r#"{"a":[true,"x"],"b":1}"#);
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc
)]
#![warn(missing_docs)]

pub mod condition;
pub mod ids;
pub mod io;
pub mod layout;
pub mod model;
pub mod registry;
pub mod rules;
pub mod serializer;

pub use condition::{CompareOp, Condition, ConditionError, ParamTest};
pub use model::{
    CanonicalTpt, Kingdom, ParamKind, ParamSpec, Part, PartKind, PathStep, Provenance,
    SubstrateEdge, Taxon, TpIndexRow, Transform, TptCandidate, PART_CHANGING_CLASS,
};
pub use registry::{TransformRegistry, TransformsCanon};
pub use rules::RuleBook;

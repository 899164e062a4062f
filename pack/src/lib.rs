//! Graph/search packer for taxograph builds.
//!
//! Materializes the compiled taxonomy, parts, transforms, substrate edges
//! and canonical TPTs into one SQLite database: ancestor closure tables for
//! taxa and parts, named Taxon+Part nodes, exploded identity steps with a
//! `(taxon, part, transform)` aggregate, rule-evaluated flags and cuisine
//! tags, and a single FTS5 index over all three entity kinds.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use taxograph_pack::{pack, PackInputs};
//! use taxograph_spec::{RuleBook, TransformRegistry};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = TransformRegistry::default();
//! let rules = RuleBook::default();
//! let inputs = PackInputs {
//!     taxa: &[],
//!     parts: &[],
//!     registry: &registry,
//!     edges: &[],
//!     tpts: &[],
//!     rules: &rules,
//!     docs: &[],
//! };
//! let stats = pack(inputs, Path::new("build/database/graph.db"))?;
//! println!("{} search rows", stats.search_rows);
//! # Ok(())
//! # }
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc
)]
#![warn(missing_docs)]

pub mod closure;
pub mod conditions;
pub mod consistency;
pub mod names;
pub mod schema;
pub mod search;
pub mod writer;

pub use writer::{database_files, pack, PackInputs, PackStats};

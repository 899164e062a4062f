//! Serializers for taxograph records.
//!
//! - **Canonical** ([`canonical`]): the language-independent encoding that
//!   TPT identity signatures are hashed from
//! - **Artifacts** ([`crate::io`]): pretty JSON and JSONL stage artifacts

pub mod canonical;

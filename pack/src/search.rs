//! Rows of the unified search index.
//!
//! Taxa, TP nodes and TPTs share one external-content table. Each row carries
//! a synonym bag: the aliases of everything the entity is built from, merged,
//! deduplicated case-insensitively and joined with single spaces.

use std::collections::HashSet;

/// Entity kind stored in `search_content.entity_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A taxon node.
    Taxon,
    /// A Taxon+Part node.
    Tp,
    /// A Taxon+Part+Transform node.
    Tpt,
}

impl EntityKind {
    /// Returns the stored tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Taxon => "taxon",
            Self::Tp => "tp",
            Self::Tpt => "tpt",
        }
    }
}

/// One `search_content` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRow {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id.
    pub entity_id: String,
    /// Name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Space-joined synonym bag.
    pub synonyms: String,
    /// Taxon the entity belongs to.
    pub taxon_id: Option<String>,
    /// Part the entity belongs to.
    pub part_id: Option<String>,
}

/// Merges alias lists into one synonym bag.
///
/// Terms are trimmed, empty terms dropped, and later duplicates (ignoring
/// case) removed; first spelling wins.
#[must_use]
pub fn synonym_bag<'a, I>(terms: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut out: Vec<&str> = Vec::new();
    for term in terms {
        let term = term.trim();
        if !term.is_empty() && seen.insert(term.to_lowercase()) {
            out.push(term);
        }
    }
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_dedups_case_insensitively_and_keeps_order() {
        let bag = synonym_bag(["Apple", " pomme ", "", "apple", "Malus domestica", "POMME"]);
        assert_eq!(bag, "Apple pomme Malus domestica");
    }

    #[test]
    fn empty_bag_is_empty_string() {
        assert_eq!(synonym_bag(std::iter::empty()), "");
        assert_eq!(EntityKind::Tpt.as_str(), "tpt");
    }
}

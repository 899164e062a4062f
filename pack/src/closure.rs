//! Ancestor closure tables.
//!
//! Every node gets one row per ancestor including itself at depth 0, so a
//! node with a parent chain of length N has exactly N+1 rows.

use taxograph_compiler::forest::Forest;

/// One `(descendant, ancestor, depth)` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureRow<'a> {
    /// Descendant id.
    pub descendant: &'a str,
    /// Ancestor id (the descendant itself at depth 0).
    pub ancestor: &'a str,
    /// Distance from descendant to ancestor.
    pub depth: usize,
}

/// Returns the closure rows of every node in the forest.
#[must_use]
pub fn closure_rows(forest: &Forest) -> Vec<ClosureRow<'_>> {
    (0..forest.len())
        .flat_map(|idx| {
            forest.closure(idx).into_iter().map(move |(ancestor, depth)| ClosureRow {
                descendant: forest.id(idx),
                ancestor: forest.id(ancestor),
                depth,
            })
        })
        .collect()
}

/// Returns node indices ordered so that every parent precedes its children.
#[must_use]
pub fn parent_first_order(forest: &Forest) -> Vec<usize> {
    let mut out = Vec::with_capacity(forest.len());
    for root in (0..forest.len()).filter(|&i| forest.parent(i).is_none()) {
        out.push(root);
        out.extend(forest.descendants(root));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_of_n_has_n_plus_one_rows() {
        let forest = Forest::build([
            ("part:flour", Some("part:grain")),
            ("part:grain", None),
            ("part:dough", Some("part:flour")),
        ])
        .expect("forest");
        let rows = closure_rows(&forest);
        assert_eq!(rows.len(), 1 + 2 + 3);
        let dough: Vec<_> = rows
            .iter()
            .filter(|r| r.descendant == "part:dough")
            .collect();
        assert_eq!(dough.len(), 3);
        assert!(dough.iter().any(|r| r.ancestor == "part:grain" && r.depth == 2));

        let order: Vec<&str> = parent_first_order(&forest)
            .into_iter()
            .map(|i| forest.id(i))
            .collect();
        assert_eq!(order, vec!["part:grain", "part:flour", "part:dough"]);
    }
}

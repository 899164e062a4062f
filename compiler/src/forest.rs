//! Arena-backed hierarchy with integer node indices.
//!
//! Built once per stage from `(id, parent_id)` pairs so that parent and child
//! lookups are O(1) instead of prefix scans over the whole id set.

use std::collections::HashMap;

use thiserror::Error;

/// Structural error found while building a [`Forest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForestError {
    /// Two nodes share an id.
    #[error("duplicate node id `{0}`")]
    Duplicate(String),
    /// A node names a parent that is not in the forest.
    #[error("node `{id}` references unknown parent `{parent}`")]
    UnknownParent {
        /// Child id.
        id: String,
        /// Missing parent id.
        parent: String,
    },
    /// Following parents from this node never reaches a root.
    #[error("parent cycle through `{0}`")]
    Cycle(String),
}

/// A set of trees over string ids.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
}

impl Forest {
    /// Builds a forest from `(id, parent)` pairs. Children keep input order.
    ///
    /// # Errors
    ///
    /// Returns a [`ForestError`] on duplicate ids, dangling parents, or cycles.
    pub fn build<I, S, P>(nodes: I) -> Result<Self, ForestError>
    where
        I: IntoIterator<Item = (S, Option<P>)>,
        S: Into<String>,
        P: Into<String>,
    {
        let mut forest = Self::default();
        let mut pending: Vec<Option<String>> = Vec::new();
        for (id, parent) in nodes {
            let id = id.into();
            if forest.index.contains_key(&id) {
                return Err(ForestError::Duplicate(id));
            }
            forest.index.insert(id.clone(), forest.ids.len());
            forest.ids.push(id);
            pending.push(parent.map(Into::into));
        }
        forest.parent = vec![None; forest.ids.len()];
        forest.children = vec![Vec::new(); forest.ids.len()];
        for (idx, parent) in pending.into_iter().enumerate() {
            let Some(parent) = parent else { continue };
            let Some(&pidx) = forest.index.get(&parent) else {
                return Err(ForestError::UnknownParent {
                    id: forest.ids[idx].clone(),
                    parent,
                });
            };
            forest.parent[idx] = Some(pidx);
            forest.children[pidx].push(idx);
        }
        forest.check_acyclic()?;
        Ok(forest)
    }

    fn check_acyclic(&self) -> Result<(), ForestError> {
        // 0 = unvisited, 1 = on current walk, 2 = known to reach a root
        let mut state = vec![0u8; self.ids.len()];
        for start in 0..self.ids.len() {
            let mut walk = Vec::new();
            let mut cursor = Some(start);
            while let Some(node) = cursor {
                match state[node] {
                    2 => break,
                    1 => return Err(ForestError::Cycle(self.ids[node].clone())),
                    _ => {}
                }
                state[node] = 1;
                walk.push(node);
                cursor = self.parent[node];
            }
            for node in walk {
                state[node] = 2;
            }
        }
        Ok(())
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the forest has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the index of `id`.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns the id at `idx`.
    #[must_use]
    pub fn id(&self, idx: usize) -> &str {
        &self.ids[idx]
    }

    /// Returns the parent index of `idx`.
    #[must_use]
    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.parent[idx]
    }

    /// Returns the child indices of `idx`.
    #[must_use]
    pub fn children(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    /// Iterates strict ancestors of `idx`, nearest first.
    pub fn ancestors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.parent[idx], move |&n| self.parent[n])
    }

    /// Returns the strict descendants of `idx` in depth-first preorder.
    #[must_use]
    pub fn descendants(&self, idx: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.children[idx].iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children[node].iter().rev().copied());
        }
        out
    }

    /// Returns `(ancestor, depth)` pairs for `idx`, starting with itself at depth 0.
    #[must_use]
    pub fn closure(&self, idx: usize) -> Vec<(usize, usize)> {
        std::iter::once(idx)
            .chain(self.ancestors(idx))
            .enumerate()
            .map(|(depth, node)| (node, depth))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Forest {
        Forest::build([
            ("tx", None),
            ("tx:p", Some("tx")),
            ("tx:p:malus", Some("tx:p")),
            ("tx:p:malus:domestica", Some("tx:p:malus")),
            ("tx:p:prunus", Some("tx:p")),
        ])
        .expect("forest builds")
    }

    #[test]
    fn children_and_ancestors() {
        let f = chain();
        let p = f.index_of("tx:p").expect("tx:p");
        let names: Vec<&str> = f.children(p).iter().map(|&c| f.id(c)).collect();
        assert_eq!(names, vec!["tx:p:malus", "tx:p:prunus"]);
        let leaf = f.index_of("tx:p:malus:domestica").expect("leaf");
        let up: Vec<&str> = f.ancestors(leaf).map(|a| f.id(a)).collect();
        assert_eq!(up, vec!["tx:p:malus", "tx:p", "tx"]);
    }

    #[test]
    fn descendants_are_preorder() {
        let f = chain();
        let p = f.index_of("tx:p").expect("tx:p");
        let names: Vec<&str> = f.descendants(p).iter().map(|&c| f.id(c)).collect();
        assert_eq!(
            names,
            vec!["tx:p:malus", "tx:p:malus:domestica", "tx:p:prunus"]
        );
    }

    #[test]
    fn closure_has_chain_length_plus_one_rows() {
        let f = chain();
        let leaf = f.index_of("tx:p:malus:domestica").expect("leaf");
        let rows = f.closure(leaf);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], (leaf, 0));
        assert_eq!(f.id(rows[3].0), "tx");
        assert_eq!(rows[3].1, 3);
    }

    #[test]
    fn rejects_cycles_and_dangling_parents() {
        let cycle = Forest::build([("a", Some("b")), ("b", Some("a"))]);
        assert!(matches!(cycle, Err(ForestError::Cycle(_))));
        let dangling = Forest::build([("a", Some("zz"))]);
        assert!(matches!(dangling, Err(ForestError::UnknownParent { .. })));
        let dup = Forest::build([("a", None::<&str>), ("a", None)]);
        assert_eq!(dup.err(), Some(ForestError::Duplicate("a".into())));
    }
}

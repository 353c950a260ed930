//! Layer 2: Node paths
//!
//! Index: position selector (collection index, dictionary key, or none)
//! PathStep / NodePath: member, index, and item-id steps from the asset root

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::ItemId;
use crate::value::Scalar;

/// Position selector inside an indexed node. `Empty` selects "no index"
/// (member content).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Index {
    Empty,
    Seq(usize),
    Key(Scalar),
}

impl Index {
    pub const EMPTY: Index = Index::Empty;

    pub fn is_empty(&self) -> bool {
        matches!(self, Index::Empty)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Empty => Ok(()),
            Index::Seq(i) => write!(f, "[{i}]"),
            Index::Key(k) => write!(f, "{{{k}}}"),
        }
    }
}

/// One step of a node path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathStep {
    /// Named member of an object.
    Member(String),
    /// Positional selector (collection index or dictionary key).
    Index(Index),
    /// Stable item identity; converted to the current index on resolution.
    Item(ItemId),
}

/// Ordered list of steps rooted at the asset's root node.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(Vec<PathStep>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn push(&mut self, step: PathStep) {
        self.0.push(step);
    }

    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.0.push(PathStep::Member(name.into()));
        self
    }

    pub fn indexed(mut self, index: Index) -> Self {
        self.0.push(PathStep::Index(index));
        self
    }

    pub fn item(mut self, id: ItemId) -> Self {
        self.0.push(PathStep::Item(id));
        self
    }

    /// Path without its last step; root stays root.
    pub fn parent(&self) -> Self {
        let mut steps = self.0.clone();
        steps.pop();
        Self(steps)
    }

    pub fn last(&self) -> Option<&PathStep> {
        self.0.last()
    }
}

impl From<Vec<PathStep>> for NodePath {
    fn from(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for step in &self.0 {
            match step {
                PathStep::Member(name) => write!(f, ".{name}")?,
                PathStep::Index(index) => write!(f, "{index}")?,
                PathStep::Item(id) => write!(f, "({id})")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_each_step_kind() {
        let id = ItemId::fresh();
        let path = NodePath::root()
            .child("parts")
            .item(id)
            .child("color")
            .indexed(Index::Seq(2))
            .indexed(Index::Key(Scalar::from("k1")));
        assert_eq!(path.to_string(), format!("$.parts({id}).color[2]{{k1}}"));
        assert_eq!(NodePath::root().to_string(), "$");
    }

    #[test]
    fn parent_drops_last_step() {
        let path = NodePath::root().child("a").child("b");
        assert_eq!(path.parent(), NodePath::root().child("a"));
        assert_eq!(NodePath::root().parent(), NodePath::root());
    }

    #[test]
    fn serde_roundtrip() {
        let path = NodePath::root().child("items").indexed(Index::Seq(0));
        let json = serde_json::to_string(&path).unwrap();
        let back: NodePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn empty_index_is_empty() {
        assert!(Index::EMPTY.is_empty());
        assert!(!Index::Seq(0).is_empty());
    }
}

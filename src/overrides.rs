//! Layer 4: Override state
//!
//! Content override per node; item/key override sets and deleted-item sets
//! per identifiable collection/dictionary node.
//!
//! INVARIANT: a node with `can_override == false` never leaves `Base`.
//! INVARIANT: per node, `deleted ∩ live_ids = ∅` (an id is live, deleted,
//! or unknown).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ident::{ItemId, NodeId};

/// Origin of a node's content relative to its base.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OverrideKind {
    /// Inherited; reconciliation keeps it equal to the base.
    #[default]
    Base,
    /// Locally authored; reconciliation must not touch it.
    New,
    /// Reserved.
    Sealed,
}

impl OverrideKind {
    pub fn is_overridden(&self) -> bool {
        !matches!(self, OverrideKind::Base)
    }
}

/// Per-graph override bookkeeping. Storage is sparse: absent entries mean
/// `Base` / empty set.
#[derive(Clone, Debug, Default)]
pub struct OverrideStore {
    content: BTreeMap<NodeId, OverrideKind>,
    items: BTreeMap<NodeId, BTreeSet<ItemId>>,
    keys: BTreeMap<NodeId, BTreeSet<ItemId>>,
    deleted: BTreeMap<NodeId, BTreeSet<ItemId>>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, node: NodeId) -> OverrideKind {
        self.content.get(&node).copied().unwrap_or_default()
    }

    pub fn set_content(&mut self, node: NodeId, kind: OverrideKind) {
        if kind.is_overridden() {
            self.content.insert(node, kind);
        } else {
            self.content.remove(&node);
        }
    }

    pub fn item_overridden(&self, node: NodeId, id: ItemId) -> bool {
        self.items.get(&node).is_some_and(|set| set.contains(&id))
    }

    pub fn set_item_override(&mut self, node: NodeId, id: ItemId) {
        self.items.entry(node).or_default().insert(id);
    }

    pub fn clear_item_override(&mut self, node: NodeId, id: ItemId) {
        if let Some(set) = self.items.get_mut(&node) {
            set.remove(&id);
            if set.is_empty() {
                self.items.remove(&node);
            }
        }
    }

    pub fn item_overrides(&self, node: NodeId) -> impl Iterator<Item = ItemId> + '_ {
        self.items.get(&node).into_iter().flatten().copied()
    }

    pub fn key_overridden(&self, node: NodeId, id: ItemId) -> bool {
        self.keys.get(&node).is_some_and(|set| set.contains(&id))
    }

    pub fn set_key_override(&mut self, node: NodeId, id: ItemId) {
        self.keys.entry(node).or_default().insert(id);
    }

    pub fn clear_key_override(&mut self, node: NodeId, id: ItemId) {
        if let Some(set) = self.keys.get_mut(&node) {
            set.remove(&id);
            if set.is_empty() {
                self.keys.remove(&node);
            }
        }
    }

    pub fn key_overrides(&self, node: NodeId) -> impl Iterator<Item = ItemId> + '_ {
        self.keys.get(&node).into_iter().flatten().copied()
    }

    pub fn is_deleted(&self, node: NodeId, id: ItemId) -> bool {
        self.deleted.get(&node).is_some_and(|set| set.contains(&id))
    }

    pub fn mark_deleted(&mut self, node: NodeId, id: ItemId) {
        self.deleted.entry(node).or_default().insert(id);
    }

    pub fn unmark_deleted(&mut self, node: NodeId, id: ItemId) {
        if let Some(set) = self.deleted.get_mut(&node) {
            set.remove(&id);
            if set.is_empty() {
                self.deleted.remove(&node);
            }
        }
    }

    pub fn deleted_items(&self, node: NodeId) -> BTreeSet<ItemId> {
        self.deleted.get(&node).cloned().unwrap_or_default()
    }

    /// Drop all bookkeeping for a node that left the graph.
    pub fn forget_node(&mut self, node: NodeId) {
        self.content.remove(&node);
        self.items.remove(&node);
        self.keys.remove(&node);
        self.deleted.remove(&node);
    }

    /// Clear every override bit. Deleted-item sets stay: a deletion is an
    /// override of membership tracked separately and cleared by explicit
    /// `unmark_deleted` during reconciliation.
    pub fn clear_overrides(&mut self) {
        self.content.clear();
        self.items.clear();
        self.keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.items.is_empty()
            && self.keys.is_empty()
            && self.deleted.is_empty()
    }

    pub fn nodes_with_content_override(&self) -> impl Iterator<Item = (NodeId, OverrideKind)> + '_ {
        self.content.iter().map(|(node, kind)| (*node, *kind))
    }

    pub fn nodes_with_item_overrides(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.items.keys().chain(self.keys.keys()).copied()
    }
}

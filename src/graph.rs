//! Layer 10: Asset property graph
//!
//! Owns one asset's node graph, override store, base links, and change
//! journal. All mutation goes through this type: every public op records
//! paired pre/post events and stamps override state, with stamping
//! suppressed while `updating_from_base` or `resetting_override` is set.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::error::GraphError;
use crate::event::{ChangeKind, GraphEvent};
use crate::ident::{AssetId, ItemId, NodeId, ObjectId};
use crate::metadata::{
    AssetItem, AssetMetadata, DeletedItemsEntry, FormatVersion, NodeOverride,
    ObjectReferenceEntry, OverrideEntry, OverrideScope,
};
use crate::node::{NodeGraph, NodeKind, Resolved, Slot};
use crate::overrides::{OverrideKind, OverrideStore};
use crate::path::Index;
use crate::value::{Scalar, Value};

/// One asset's property graph.
#[derive(Debug)]
pub struct AssetPropertyGraph {
    pub(crate) asset: AssetId,
    pub(crate) nodes: NodeGraph,
    pub(crate) overrides: OverrideStore,
    pub(crate) base: Option<AssetId>,
    /// Derived node → counterpart node in the base graph.
    pub(crate) base_links: BTreeMap<NodeId, NodeId>,
    /// Base-side identifiable object → derived-side counterpart.
    pub(crate) registry: BTreeMap<ObjectId, ObjectId>,
    pub(crate) events: Vec<GraphEvent>,
    pub(crate) updating_from_base: bool,
    pub(crate) resetting_override: bool,
}

impl AssetPropertyGraph {
    /// Build the graph for a loaded asset item and apply its metadata
    /// blob, if any.
    pub fn build(item: &AssetItem) -> Result<Self, GraphError> {
        let mut graph = Self {
            asset: item.id,
            nodes: NodeGraph::build(&item.root),
            overrides: OverrideStore::new(),
            base: item.base,
            base_links: BTreeMap::new(),
            registry: BTreeMap::new(),
            events: Vec::new(),
            updating_from_base: false,
            resetting_override: false,
        };
        if let Some(blob) = item.metadata_blob()? {
            graph.apply_metadata(&blob)?;
        }
        Ok(graph)
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    pub fn root(&self) -> NodeId {
        self.nodes.root()
    }

    pub fn base(&self) -> Option<AssetId> {
        self.base
    }

    pub fn nodes(&self) -> &NodeGraph {
        &self.nodes
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    /// Drain the change journal.
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn events_len(&self) -> usize {
        self.events.len()
    }

    pub fn is_updating_from_base(&self) -> bool {
        self.updating_from_base
    }

    /// Derived node's counterpart in the base graph, if linked.
    pub fn base_link(&self, node: NodeId) -> Option<NodeId> {
        self.base_links.get(&node).copied()
    }

    /// Base-side object id → derived-side counterpart.
    pub fn resolve_base_to_derived(&self, base_object: ObjectId) -> Option<ObjectId> {
        self.registry.get(&base_object).copied()
    }

    /// Drop every base link and registry entry. Idempotent; must run
    /// before the base graph is dropped or replaced.
    pub fn clear_all_base_links(&mut self) {
        self.base_links.clear();
        self.registry.clear();
    }

    pub(crate) fn set_base(&mut self, base: Option<AssetId>) {
        self.base = base;
    }

    /// Re-emit the asset document from the graph.
    pub fn emit(&self) -> Option<crate::value::ObjectValue> {
        self.nodes.emit()
    }

    pub fn retrieve(&self, node: NodeId, index: &Index) -> Option<Value> {
        self.nodes.retrieve(node, index)
    }

    // ---- mutation -----------------------------------------------------

    fn stamping_suppressed(&self) -> bool {
        self.updating_from_base || self.resetting_override
    }

    /// Set a member's value (`Index::Empty`) or an item's value.
    pub fn update(&mut self, node: NodeId, index: &Index, value: Value) -> Result<(), GraphError> {
        if index.is_empty() {
            self.update_member(node, value)
        } else {
            self.update_item(node, index, value)
        }
    }

    fn update_member(&mut self, node: NodeId, value: Value) -> Result<(), GraphError> {
        let member = self
            .nodes
            .member(node)
            .ok_or(GraphError::UnknownNode(node))?;
        let can_override = member.can_override;
        let old = self
            .nodes
            .retrieve(node, &Index::Empty)
            .ok_or(GraphError::UnknownNode(node))?;
        self.events.push(GraphEvent::Changing {
            node,
            old: old.clone(),
        });

        let detached = self.nodes.set_member(node, &value)?;
        self.forget_nodes(&detached.removed_nodes);

        let prev_override = self.overrides.content(node);
        if !self.stamping_suppressed() && can_override {
            self.overrides.set_content(node, OverrideKind::New);
        }
        let new_override = self.overrides.content(node);
        self.events.push(GraphEvent::Changed {
            node,
            old,
            new: value,
            prev_override,
            new_override,
        });
        Ok(())
    }

    fn update_item(&mut self, node: NodeId, index: &Index, value: Value) -> Result<(), GraphError> {
        let old = self.nodes.retrieve(node, index);
        self.events.push(GraphEvent::ItemChanging {
            node,
            change: ChangeKind::CollectionUpdate,
            index: index.clone(),
            old,
        });

        let detached = match index {
            Index::Seq(pos) => self.nodes.collection_set(node, *pos, &value)?,
            Index::Key(key) => {
                let key = key.clone();
                self.nodes.dictionary_set(node, &key, &value)?
            }
            Index::Empty => return Err(GraphError::OutOfRange { node }),
        };
        self.forget_nodes(&detached.removed_nodes);

        let item_id = detached.item_id;
        let prev_override = self.item_override_kind(node, item_id);
        if !self.stamping_suppressed() && !item_id.is_empty() {
            self.overrides.set_item_override(node, item_id);
        }
        let new_override = self.item_override_kind(node, item_id);
        self.events.push(GraphEvent::ItemChanged {
            node,
            change: ChangeKind::CollectionUpdate,
            index: index.clone(),
            new: Some(value),
            prev_override,
            new_override,
            item_id,
        });
        Ok(())
    }

    /// Insert an item; for identifiable nodes a fresh id is generated.
    pub fn add(&mut self, node: NodeId, index: &Index, value: Value) -> Result<ItemId, GraphError> {
        self.insert_item(node, index, value, None)
    }

    /// Insert an item carrying an externally chosen id. Identical to
    /// [`Self::add`] otherwise; used by reconciliation and undo.
    pub fn restore(
        &mut self,
        node: NodeId,
        index: &Index,
        value: Value,
        item_id: ItemId,
    ) -> Result<(), GraphError> {
        self.insert_item(node, index, value, Some(item_id))?;
        Ok(())
    }

    fn insert_item(
        &mut self,
        node: NodeId,
        index: &Index,
        value: Value,
        item_id: Option<ItemId>,
    ) -> Result<ItemId, GraphError> {
        self.events.push(GraphEvent::ItemChanging {
            node,
            change: ChangeKind::CollectionAdd,
            index: index.clone(),
            old: None,
        });

        let assigned = match index {
            Index::Seq(pos) => self.nodes.collection_insert(node, *pos, &value, item_id)?,
            Index::Key(key) => {
                let key = key.clone();
                self.nodes.dictionary_insert(node, &key, &value, item_id)?
            }
            Index::Empty => return Err(GraphError::OutOfRange { node }),
        };

        // A restored id is live again; its overriding deletion, if any, is
        // spent.
        if !assigned.is_empty() {
            self.overrides.unmark_deleted(node, assigned);
        }

        let prev_override = self.item_override_kind(node, assigned);
        if !self.stamping_suppressed() && !assigned.is_empty() {
            self.overrides.set_item_override(node, assigned);
        }
        let new_override = self.item_override_kind(node, assigned);
        self.events.push(GraphEvent::ItemChanged {
            node,
            change: ChangeKind::CollectionAdd,
            index: index.clone(),
            new: Some(value),
            prev_override,
            new_override,
            item_id: assigned,
        });
        Ok(assigned)
    }

    /// Remove an item. A local removal of an inherited entry is an
    /// overriding deletion; removals on behalf of the base just drop it.
    pub fn remove(&mut self, node: NodeId, index: &Index) -> Result<Value, GraphError> {
        let old = self.nodes.retrieve(node, index);
        self.events.push(GraphEvent::ItemChanging {
            node,
            change: ChangeKind::CollectionRemove,
            index: index.clone(),
            old,
        });

        let detached = match index {
            Index::Seq(pos) => self.nodes.collection_remove(node, *pos)?,
            Index::Key(key) => {
                let key = key.clone();
                self.nodes.dictionary_remove(node, &key)?
            }
            Index::Empty => return Err(GraphError::OutOfRange { node }),
        };
        self.forget_nodes(&detached.removed_nodes);

        let item_id = detached.item_id;
        let prev_override = self.item_override_kind(node, item_id);
        if !item_id.is_empty() {
            self.overrides.clear_item_override(node, item_id);
            self.overrides.clear_key_override(node, item_id);
            if self.base.is_some() && !self.stamping_suppressed() {
                self.overrides.mark_deleted(node, item_id);
            }
        }
        let new_override = self.item_override_kind(node, item_id);
        self.events.push(GraphEvent::ItemChanged {
            node,
            change: ChangeKind::CollectionRemove,
            index: index.clone(),
            new: None,
            prev_override,
            new_override,
            item_id,
        });
        Ok(detached.value)
    }

    /// Move a dictionary entry to a new key, preserving its item id. A
    /// local move overrides the key; a base-driven move keeps it inherited.
    pub fn move_key(&mut self, node: NodeId, from: &Scalar, to: &Scalar) -> Result<(), GraphError> {
        let dict = self
            .nodes
            .dictionary(node)
            .ok_or(GraphError::UnknownNode(node))?;
        if dict.entries.contains_key(to) {
            return Err(GraphError::DuplicateKey { node });
        }
        let old = self.nodes.retrieve(node, &Index::Key(from.clone()));
        self.events.push(GraphEvent::ItemChanging {
            node,
            change: ChangeKind::CollectionUpdate,
            index: Index::Key(from.clone()),
            old: old.clone(),
        });

        let item_id = self.nodes.dictionary_move(node, from, to)?;

        let prev_override = self.key_override_kind(node, item_id);
        if !self.stamping_suppressed() && !item_id.is_empty() {
            self.overrides.set_key_override(node, item_id);
        }
        let new_override = self.key_override_kind(node, item_id);
        self.events.push(GraphEvent::ItemChanged {
            node,
            change: ChangeKind::CollectionUpdate,
            index: Index::Key(to.clone()),
            new: old,
            prev_override,
            new_override,
            item_id,
        });
        Ok(())
    }

    fn item_override_kind(&self, node: NodeId, id: ItemId) -> OverrideKind {
        if !id.is_empty() && self.overrides.item_overridden(node, id) {
            OverrideKind::New
        } else {
            OverrideKind::Base
        }
    }

    fn key_override_kind(&self, node: NodeId, id: ItemId) -> OverrideKind {
        if !id.is_empty() && self.overrides.key_overridden(node, id) {
            OverrideKind::New
        } else {
            OverrideKind::Base
        }
    }

    fn forget_nodes(&mut self, removed: &[NodeId]) {
        for node in removed {
            self.overrides.forget_node(*node);
            self.base_links.remove(node);
        }
    }

    // ---- override management ------------------------------------------

    /// Clear override bits on a node (or a single item of it) and every
    /// descendant. The caller reconciles afterwards to restore inherited
    /// content.
    pub fn reset_override(&mut self, node: NodeId, index: &Index) -> Result<(), GraphError> {
        if !self.nodes.contains(node) {
            return Err(GraphError::UnknownNode(node));
        }
        self.resetting_override = true;
        if index.is_empty() {
            self.reset_subtree(node);
        } else if let Some(id) = self.nodes.item_id_at(node, index) {
            self.overrides.clear_item_override(node, id);
            self.overrides.clear_key_override(node, id);
            self.overrides.unmark_deleted(node, id);
            if let Some(target) = self.nodes.indexed_target(node, index) {
                self.reset_subtree(target);
            }
        }
        self.resetting_override = false;
        Ok(())
    }

    fn reset_subtree(&mut self, node: NodeId) {
        self.overrides.set_content(node, OverrideKind::Base);
        for id in self.overrides.item_overrides(node).collect::<Vec<_>>() {
            self.overrides.clear_item_override(node, id);
        }
        for id in self.overrides.key_overrides(node).collect::<Vec<_>>() {
            self.overrides.clear_key_override(node, id);
        }
        for id in self.overrides.deleted_items(node) {
            self.overrides.unmark_deleted(node, id);
        }
        let children = self.nodes.structural_children(node);
        for child in children {
            self.reset_subtree(child);
        }
    }

    /// Snapshot every override bit as path-keyed entries, then clear them.
    /// Deleted-item sets are untouched: a deletion override is membership
    /// state, cleared only by reconciliation or `reset_override`.
    pub fn clear_all_overrides(&mut self) -> Vec<NodeOverride> {
        let snapshot = self.override_entries();
        self.overrides.clear_overrides();
        snapshot
    }

    /// Re-apply entries produced by [`Self::clear_all_overrides`].
    /// Unresolvable paths are dropped with a warning.
    pub fn restore_overrides(&mut self, entries: &[NodeOverride]) -> Result<(), GraphError> {
        for entry in entries {
            self.apply_override_entry(entry)?;
        }
        Ok(())
    }

    // ---- metadata -----------------------------------------------------

    /// Produce the metadata blob: override entries, object-reference
    /// entries, and deleted-item sets, sorted by path.
    pub fn generate_metadata(&self) -> AssetMetadata {
        let mut overrides = self.override_entries();
        overrides.sort_by(|a, b| (&a.path, a.scope).cmp(&(&b.path, b.scope)));

        let mut object_references = Vec::new();
        for node in self.nodes.node_ids() {
            let Some(n) = self.nodes.node(node) else {
                continue;
            };
            match &n.kind {
                NodeKind::Member(member) => {
                    if let Slot::ObjectRef(object) = member.slot {
                        if let Some(path) = self.nodes.path_of(node, &Index::Empty) {
                            object_references.push(ObjectReferenceEntry { path, id: object });
                        }
                    }
                }
                NodeKind::Collection(col) => {
                    for (pos, slot) in col.items.iter().enumerate() {
                        if let Slot::ObjectRef(object) = slot {
                            if let Some(path) = self.nodes.path_of(node, &Index::Seq(pos)) {
                                object_references.push(ObjectReferenceEntry { path, id: *object });
                            }
                        }
                    }
                }
                NodeKind::Dictionary(dict) => {
                    for (key, slot) in &dict.entries {
                        if let Slot::ObjectRef(object) = slot {
                            if let Some(path) =
                                self.nodes.path_of(node, &Index::Key(key.clone()))
                            {
                                object_references.push(ObjectReferenceEntry { path, id: *object });
                            }
                        }
                    }
                }
                NodeKind::Object(_) => {}
            }
        }
        object_references.sort_by(|a, b| a.path.cmp(&b.path));

        let mut deleted_items = Vec::new();
        for node in self.nodes.node_ids() {
            let ids = self.overrides.deleted_items(node);
            if ids.is_empty() {
                continue;
            }
            if let Some(path) = self.nodes.path_of(node, &Index::Empty) {
                deleted_items.push(DeletedItemsEntry { path, ids });
            }
        }
        deleted_items.sort_by(|a, b| a.path.cmp(&b.path));

        AssetMetadata {
            format_version: FormatVersion::CURRENT,
            overrides,
            object_references,
            deleted_items,
        }
    }

    /// Override entries only (no object references); the walk behind both
    /// `generate_metadata` and editor override listings.
    pub fn override_entries(&self) -> Vec<OverrideEntry> {
        let mut entries = Vec::new();
        for (node, kind) in self.overrides.nodes_with_content_override() {
            let Some(path) = self.nodes.path_of(node, &Index::Empty) else {
                continue;
            };
            entries.push(OverrideEntry {
                path,
                state: kind,
                scope: OverrideScope::Content,
            });
        }
        let indexed: BTreeSet<NodeId> = self.overrides.nodes_with_item_overrides().collect();
        for node in indexed {
            for id in self.overrides.item_overrides(node).collect::<Vec<_>>() {
                let Some(index) = self.nodes.index_of_item(node, id) else {
                    continue;
                };
                let Some(path) = self.nodes.path_of(node, &index) else {
                    continue;
                };
                entries.push(OverrideEntry {
                    path,
                    state: OverrideKind::New,
                    scope: OverrideScope::Item,
                });
            }
            for id in self.overrides.key_overrides(node).collect::<Vec<_>>() {
                let Some(index) = self.nodes.index_of_item(node, id) else {
                    continue;
                };
                let Some(path) = self.nodes.path_of(node, &index) else {
                    continue;
                };
                entries.push(OverrideEntry {
                    path,
                    state: OverrideKind::New,
                    scope: OverrideScope::Key,
                });
            }
        }
        entries
    }

    /// Generate the blob and attach it to the asset item's side-channel.
    pub fn prepare_for_save(&self, item: &mut AssetItem) -> Result<AssetMetadata, GraphError> {
        if item.id != self.asset {
            return Err(GraphError::UnknownAsset(item.id));
        }
        let blob = self.generate_metadata();
        item.attach_metadata(&blob)?;
        item.base = self.base;
        if let Some(root) = self.emit() {
            item.root = root;
        }
        Ok(blob)
    }

    /// Apply a loaded blob: override bits, object-reference slots, and
    /// deleted-item sets. Unreachable paths are dropped with a warning;
    /// kind mismatches abort.
    pub fn apply_metadata(&mut self, blob: &AssetMetadata) -> Result<(), GraphError> {
        for entry in &blob.overrides {
            self.apply_override_entry(entry)?;
        }
        for entry in &blob.object_references {
            let Some(resolved) = self.nodes.resolve(&entry.path)? else {
                warn!(path = %entry.path, "dropping unreachable object-reference entry");
                continue;
            };
            self.apply_object_reference(&resolved, entry.id)?;
        }
        for entry in &blob.deleted_items {
            let Some(resolved) = self.nodes.resolve(&entry.path)? else {
                warn!(path = %entry.path, "dropping unreachable deleted-items entry");
                continue;
            };
            let Some(node) = self.indexed_node_of(&resolved) else {
                warn!(path = %entry.path, "deleted-items entry does not name an indexed node");
                continue;
            };
            for id in &entry.ids {
                self.overrides.mark_deleted(node, *id);
            }
        }
        Ok(())
    }

    fn apply_override_entry(&mut self, entry: &OverrideEntry) -> Result<(), GraphError> {
        let Some(resolved) = self.nodes.resolve(&entry.path)? else {
            warn!(path = %entry.path, "dropping unreachable override entry");
            return Ok(());
        };
        if resolved.resolved_on_index {
            let Some(id) = self.nodes.item_id_at(resolved.node, &resolved.index) else {
                warn!(path = %entry.path, "override entry targets a non-identifiable item");
                return Ok(());
            };
            if entry.state.is_overridden() {
                match entry.scope {
                    OverrideScope::Key => self.overrides.set_key_override(resolved.node, id),
                    _ => self.overrides.set_item_override(resolved.node, id),
                }
            }
        } else {
            let can_override = self
                .nodes
                .member(resolved.node)
                .map(|m| m.can_override)
                .unwrap_or(true);
            if !can_override && entry.state.is_overridden() {
                warn!(path = %entry.path, "dropping override on a non-overridable member");
                return Ok(());
            }
            self.overrides.set_content(resolved.node, entry.state);
        }
        Ok(())
    }

    fn apply_object_reference(
        &mut self,
        resolved: &Resolved,
        object: ObjectId,
    ) -> Result<(), GraphError> {
        // Rewrites go through the raw node layer: loading metadata is not
        // a user mutation and records no events.
        if resolved.resolved_on_index {
            let value = Value::ObjectRef(object);
            let detached = match &resolved.index {
                Index::Seq(pos) => self.nodes.collection_set(resolved.node, *pos, &value)?,
                Index::Key(key) => {
                    let key = key.clone();
                    self.nodes.dictionary_set(resolved.node, &key, &value)?
                }
                Index::Empty => return Ok(()),
            };
            self.forget_nodes(&detached.removed_nodes);
        } else {
            let detached = self.nodes.set_member(resolved.node, &Value::ObjectRef(object))?;
            self.forget_nodes(&detached.removed_nodes);
        }
        Ok(())
    }

    fn indexed_node_of(&self, resolved: &Resolved) -> Option<NodeId> {
        let node = self.nodes.node(resolved.node)?;
        match &node.kind {
            NodeKind::Collection(_) | NodeKind::Dictionary(_) => Some(resolved.node),
            NodeKind::Member(_) => self.nodes.member_target(resolved.node).filter(|target| {
                matches!(
                    self.nodes.node(*target).map(|n| &n.kind),
                    Some(NodeKind::Collection(_)) | Some(NodeKind::Dictionary(_))
                )
            }),
            NodeKind::Object(_) => None,
        }
    }

    // ---- invariants ---------------------------------------------------

    /// Debugging aid: verify the structural invariants the engine
    /// maintains (non-overridable members stay `Base`, live ids are
    /// unique and non-empty, deleted sets are disjoint from live ids).
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        for node in self.nodes.node_ids() {
            if let Some(member) = self.nodes.member(node) {
                if !member.can_override && self.overrides.content(node).is_overridden() {
                    return Err(GraphError::InvariantViolation {
                        node,
                        reason: "non-overridable member left Base",
                    });
                }
            }
            if self.nodes.is_identifiable(node) {
                let live = self.nodes.live_ids(node);
                let mut seen = BTreeSet::new();
                for id in &live {
                    if id.is_empty() || !seen.insert(*id) {
                        return Err(GraphError::CorruptedIdMap { node });
                    }
                }
                for id in self.overrides.deleted_items(node) {
                    if seen.contains(&id) {
                        return Err(GraphError::InvariantViolation {
                            node,
                            reason: "deleted set intersects live ids",
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{CollectionValue, ObjectValue};

    fn build(root: ObjectValue) -> AssetPropertyGraph {
        AssetPropertyGraph::build(&AssetItem::new(root)).unwrap()
    }

    fn sample() -> AssetPropertyGraph {
        build(
            ObjectValue::new("Entity")
                .with_member("color", "red")
                .with_locked_member("kind", "static")
                .with_member(
                    "tags",
                    Value::Collection(CollectionValue::identifiable(vec![
                        Value::from("a"),
                        Value::from("b"),
                    ])),
                ),
        )
    }

    fn tags_node(graph: &AssetPropertyGraph) -> NodeId {
        let member = graph.nodes().child(graph.root(), "tags").unwrap();
        graph.nodes().member_target(member).unwrap()
    }

    #[test]
    fn local_update_stamps_new_override() {
        let mut graph = sample();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        graph.update(color, &Index::Empty, Value::from("blue")).unwrap();
        assert_eq!(graph.overrides().content(color), OverrideKind::New);
    }

    #[test]
    fn locked_members_never_leave_base() {
        let mut graph = sample();
        let kind = graph.nodes().child(graph.root(), "kind").unwrap();
        graph.update(kind, &Index::Empty, Value::from("animated")).unwrap();
        assert_eq!(graph.overrides().content(kind), OverrideKind::Base);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn removal_marks_deleted_only_with_a_base() {
        let mut graph = sample();
        let tags = tags_node(&graph);
        let id = graph.nodes().item_id_at(tags, &Index::Seq(0)).unwrap();
        graph.remove(tags, &Index::Seq(0)).unwrap();
        // No base: the entry is just gone.
        assert!(!graph.overrides().is_deleted(tags, id));

        let mut graph = sample();
        graph.set_base(Some(AssetId::fresh()));
        let tags = tags_node(&graph);
        let id = graph.nodes().item_id_at(tags, &Index::Seq(0)).unwrap();
        graph.remove(tags, &Index::Seq(0)).unwrap();
        assert!(graph.overrides().is_deleted(tags, id));
        graph.check_invariants().unwrap();
    }

    #[test]
    fn restore_revives_a_deleted_id() {
        let mut graph = sample();
        graph.set_base(Some(AssetId::fresh()));
        let tags = tags_node(&graph);
        let id = graph.nodes().item_id_at(tags, &Index::Seq(0)).unwrap();
        let value = graph.remove(tags, &Index::Seq(0)).unwrap();
        assert!(graph.overrides().is_deleted(tags, id));

        graph.restore(tags, &Index::Seq(0), value, id).unwrap();
        assert!(!graph.overrides().is_deleted(tags, id));
        assert_eq!(graph.nodes().item_id_at(tags, &Index::Seq(0)), Some(id));
        graph.check_invariants().unwrap();
    }

    #[test]
    fn reset_override_clears_subtree_bits() {
        let mut graph = sample();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        let tags = tags_node(&graph);
        graph.update(color, &Index::Empty, Value::from("blue")).unwrap();
        let id = graph.nodes().item_id_at(tags, &Index::Seq(0)).unwrap();
        graph.update(tags, &Index::Seq(0), Value::from("x")).unwrap();
        assert!(graph.overrides().item_overridden(tags, id));

        graph.reset_override(graph.root(), &Index::Empty).unwrap();
        assert_eq!(graph.overrides().content(color), OverrideKind::Base);
        assert!(!graph.overrides().item_overridden(tags, id));
    }

    #[test]
    fn metadata_walk_round_trips_override_bits() {
        let mut graph = sample();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        let tags = tags_node(&graph);
        graph.update(color, &Index::Empty, Value::from("blue")).unwrap();
        graph.update(tags, &Index::Seq(1), Value::from("y")).unwrap();

        let blob = graph.generate_metadata();
        assert_eq!(blob.overrides.len(), 2);

        let mut item = AssetItem::with_id(graph.asset(), graph.emit().unwrap());
        item.attach_metadata(&blob).unwrap();
        let reloaded = AssetPropertyGraph::build(&item).unwrap();
        assert_eq!(reloaded.generate_metadata(), blob);
    }

    #[test]
    fn take_events_drains_the_journal() {
        let mut graph = sample();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        graph.update(color, &Index::Empty, Value::from("blue")).unwrap();
        assert_eq!(graph.take_events().len(), 2);
        assert!(graph.take_events().is_empty());
    }
}

//! Layer 3: Node graph
//!
//! Tagged-variant nodes over an asset value tree, stored in a per-graph
//! arena (`BTreeMap<NodeId, Node>` for deterministic iteration).
//!
//! Structural links own their subtrees and are arena ids; object
//! references resolve through the identifiable-object index and never own.
//! The structural tree is acyclic, so walks that follow only structural
//! links terminate without a visited set; reference navigation is a single
//! index lookup and cannot recurse.

use std::collections::BTreeMap;

use crate::error::{GraphError, KindMismatch};
use crate::ident::{ItemId, NodeId, ObjectId};
use crate::path::{Index, NodePath, PathStep};
use crate::value::{
    CollectionValue, ContentRef, DictionaryValue, MemberValue, ObjectValue, Scalar, Value,
};

/// Payload of a member or item: an owned terminal value or a structural
/// link to a child node.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    Scalar(Scalar),
    Content(ContentRef),
    /// Pointer-by-id; resolved through the graph's object index.
    ObjectRef(ObjectId),
    /// Owning link to an `Object`, `Collection`, or `Dictionary` node.
    Node(NodeId),
}

impl Slot {
    pub fn is_structural(&self) -> bool {
        matches!(self, Slot::Node(_))
    }
}

/// A named field of an owning object.
#[derive(Clone, Debug)]
pub struct MemberNode {
    pub name: String,
    pub declared_type: Option<String>,
    pub can_override: bool,
    pub slot: Slot,
}

impl MemberNode {
    /// The member's value is a reference into the graph rather than an
    /// owned terminal value.
    pub fn is_reference(&self) -> bool {
        self.slot.is_structural()
    }

    /// The member's value is a pointer to an identifiable object addressed
    /// by id, not structural containment.
    pub fn is_object_reference(&self) -> bool {
        matches!(self.slot, Slot::ObjectRef(_))
    }
}

/// A structural value with named children.
#[derive(Clone, Debug)]
pub struct ObjectNode {
    pub object_id: ObjectId,
    pub type_name: Option<String>,
    pub identifiable: bool,
    pub children: BTreeMap<String, NodeId>,
}

/// Ordered sequence of items; identifiable iff `ids` is present.
#[derive(Clone, Debug)]
pub struct CollectionNode {
    pub items: Vec<Slot>,
    pub ids: Option<Vec<ItemId>>,
}

/// Unordered key→value mapping; identifiable iff `ids` is present.
#[derive(Clone, Debug)]
pub struct DictionaryNode {
    pub entries: BTreeMap<Scalar, Slot>,
    pub ids: Option<BTreeMap<Scalar, ItemId>>,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Member(MemberNode),
    Object(ObjectNode),
    Collection(CollectionNode),
    Dictionary(DictionaryNode),
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Member(_) => "member",
            NodeKind::Object(_) => "object",
            NodeKind::Collection(_) => "collection",
            NodeKind::Dictionary(_) => "dictionary",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// Result of resolving a `NodePath`.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub node: NodeId,
    pub index: Index,
    /// The final step selected an item or key rather than member content.
    pub resolved_on_index: bool,
}

/// Outcome of a structural removal: the detached value and the arena ids
/// that left the graph with it.
#[derive(Clone, Debug)]
pub struct Detached {
    pub value: Value,
    pub item_id: ItemId,
    pub removed_nodes: Vec<NodeId>,
}

/// One asset's node arena.
#[derive(Clone, Debug)]
pub struct NodeGraph {
    nodes: BTreeMap<NodeId, Node>,
    objects: BTreeMap<ObjectId, NodeId>,
    root: NodeId,
    next: u64,
}

impl NodeGraph {
    /// Materialize the graph for a loaded asset root.
    pub fn build(root: &ObjectValue) -> Self {
        let mut graph = Self {
            nodes: BTreeMap::new(),
            objects: BTreeMap::new(),
            root: NodeId(0),
            next: 0,
        };
        graph.root = graph.add_object(None, root);
        graph
    }

    fn alloc(&mut self) -> NodeId {
        self.next += 1;
        NodeId(self.next)
    }

    fn add_object(&mut self, parent: Option<NodeId>, obj: &ObjectValue) -> NodeId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node {
                id,
                parent,
                kind: NodeKind::Object(ObjectNode {
                    object_id: obj.id,
                    type_name: obj.type_name.clone(),
                    identifiable: obj.identifiable,
                    children: BTreeMap::new(),
                }),
            },
        );
        if obj.identifiable {
            self.objects.insert(obj.id, id);
        }
        for (name, member) in &obj.members {
            let member_id = self.add_member(id, name, member);
            if let NodeKind::Object(node) = &mut self
                .nodes
                .get_mut(&id)
                .expect("object node just inserted")
                .kind
            {
                node.children.insert(name.clone(), member_id);
            }
        }
        id
    }

    fn add_member(&mut self, parent: NodeId, name: &str, member: &MemberValue) -> NodeId {
        let id = self.alloc();
        let declared_type = match &member.value {
            Value::Object(obj) => obj.type_name.clone(),
            other => Some(other.kind_name().to_string()),
        };
        self.nodes.insert(
            id,
            Node {
                id,
                parent: Some(parent),
                kind: NodeKind::Member(MemberNode {
                    name: name.to_string(),
                    declared_type,
                    can_override: member.can_override,
                    slot: Slot::Scalar(Scalar::Bool(false)),
                }),
            },
        );
        let slot = self.value_to_slot(id, &member.value);
        if let NodeKind::Member(node) = &mut self
            .nodes
            .get_mut(&id)
            .expect("member node just inserted")
            .kind
        {
            node.slot = slot;
        }
        id
    }

    fn add_collection(&mut self, parent: Option<NodeId>, col: &CollectionValue) -> NodeId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node {
                id,
                parent,
                kind: NodeKind::Collection(CollectionNode {
                    items: Vec::new(),
                    ids: col.ids.clone(),
                }),
            },
        );
        let items: Vec<Slot> = col
            .items
            .iter()
            .map(|item| self.value_to_slot(id, item))
            .collect();
        if let NodeKind::Collection(node) = &mut self
            .nodes
            .get_mut(&id)
            .expect("collection node just inserted")
            .kind
        {
            node.items = items;
        }
        id
    }

    fn add_dictionary(&mut self, parent: Option<NodeId>, dict: &DictionaryValue) -> NodeId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node {
                id,
                parent,
                kind: NodeKind::Dictionary(DictionaryNode {
                    entries: BTreeMap::new(),
                    ids: dict.ids.clone(),
                }),
            },
        );
        let entries: BTreeMap<Scalar, Slot> = dict
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), self.value_to_slot(id, value)))
            .collect();
        if let NodeKind::Dictionary(node) = &mut self
            .nodes
            .get_mut(&id)
            .expect("dictionary node just inserted")
            .kind
        {
            node.entries = entries;
        }
        id
    }

    fn value_to_slot(&mut self, parent: NodeId, value: &Value) -> Slot {
        match value {
            Value::Scalar(s) => Slot::Scalar(s.clone()),
            Value::Content(c) => Slot::Content(c.clone()),
            Value::ObjectRef(o) => Slot::ObjectRef(*o),
            Value::Object(obj) => Slot::Node(self.add_object(Some(parent), obj)),
            Value::Collection(col) => Slot::Node(self.add_collection(Some(parent), col)),
            Value::Dictionary(dict) => Slot::Node(self.add_dictionary(Some(parent), dict)),
        }
    }

    // ---- accessors ----------------------------------------------------

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Arena id of an identifiable object's node.
    pub fn object_node(&self, object: ObjectId) -> Option<NodeId> {
        self.objects.get(&object).copied()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn member(&self, id: NodeId) -> Option<&MemberNode> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Member(m) => Some(m),
            _ => None,
        }
    }

    pub fn object(&self, id: NodeId) -> Option<&ObjectNode> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn collection(&self, id: NodeId) -> Option<&CollectionNode> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn dictionary(&self, id: NodeId) -> Option<&DictionaryNode> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    fn member_mut(&mut self, id: NodeId) -> Result<&mut MemberNode, GraphError> {
        match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Member(m)) => Ok(m),
            _ => Err(GraphError::UnknownNode(id)),
        }
    }

    fn collection_mut(&mut self, id: NodeId) -> Result<&mut CollectionNode, GraphError> {
        match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Collection(c)) => Ok(c),
            _ => Err(GraphError::UnknownNode(id)),
        }
    }

    fn dictionary_mut(&mut self, id: NodeId) -> Result<&mut DictionaryNode, GraphError> {
        match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Dictionary(d)) => Ok(d),
            _ => Err(GraphError::UnknownNode(id)),
        }
    }

    // ---- navigation ---------------------------------------------------

    /// Named child of an object-like node, following a reference member to
    /// its target object first.
    pub fn child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        let obj = self.deref_object(node).ok().flatten()?;
        self.object(obj)?.children.get(name).copied()
    }

    /// Target node of a reference member (structural target or resolved
    /// object reference).
    pub fn member_target(&self, node: NodeId) -> Option<NodeId> {
        match &self.member(node)?.slot {
            Slot::Node(target) => Some(*target),
            Slot::ObjectRef(object) => self.object_node(*object),
            _ => None,
        }
    }

    /// Child node stored at an index of an indexed node, following object
    /// references.
    pub fn indexed_target(&self, node: NodeId, index: &Index) -> Option<NodeId> {
        match self.item_slot(node, index)? {
            Slot::Node(target) => Some(*target),
            Slot::ObjectRef(object) => self.object_node(*object),
            _ => None,
        }
    }

    /// Follow `node` to the object it denotes: an object node itself, a
    /// member's structural object target, or a member's resolved object
    /// reference. `Ok(None)` when a reference does not resolve.
    fn deref_object(&self, node: NodeId) -> Result<Option<NodeId>, GraphError> {
        let n = self.nodes.get(&node).ok_or(GraphError::UnknownNode(node))?;
        match &n.kind {
            NodeKind::Object(_) => Ok(Some(node)),
            NodeKind::Member(m) => match &m.slot {
                Slot::Node(target) => match self.nodes.get(target).map(|t| &t.kind) {
                    Some(NodeKind::Object(_)) => Ok(Some(*target)),
                    Some(other) => Err(self.mismatch(node, "object", other.kind_name())),
                    None => Ok(None),
                },
                Slot::ObjectRef(object) => Ok(self.object_node(*object)),
                Slot::Scalar(_) | Slot::Content(_) => {
                    Err(self.mismatch(node, "object", "scalar member"))
                }
            },
            other => Err(self.mismatch(node, "object", other.kind_name())),
        }
    }

    /// Follow `node` to the indexed node it denotes (collection or
    /// dictionary, possibly through a member).
    fn deref_indexed(&self, node: NodeId) -> Result<Option<NodeId>, GraphError> {
        let n = self.nodes.get(&node).ok_or(GraphError::UnknownNode(node))?;
        match &n.kind {
            NodeKind::Collection(_) | NodeKind::Dictionary(_) => Ok(Some(node)),
            NodeKind::Member(m) => match &m.slot {
                Slot::Node(target) => match self.nodes.get(target).map(|t| &t.kind) {
                    Some(NodeKind::Collection(_)) | Some(NodeKind::Dictionary(_)) => {
                        Ok(Some(*target))
                    }
                    Some(other) => Err(self.mismatch(node, "indexed node", other.kind_name())),
                    None => Ok(None),
                },
                _ => Err(self.mismatch(node, "indexed node", "terminal member")),
            },
            other => Err(self.mismatch(node, "indexed node", other.kind_name())),
        }
    }

    fn mismatch(&self, node: NodeId, expected: &'static str, found: &'static str) -> GraphError {
        KindMismatch {
            path: self.path_of(node, &Index::Empty).unwrap_or_default(),
            step: 0,
            expected,
            found,
        }
        .into()
    }

    // ---- id maps ------------------------------------------------------

    pub fn is_identifiable(&self, node: NodeId) -> bool {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Collection(c)) => c.ids.is_some(),
            Some(NodeKind::Dictionary(d)) => d.ids.is_some(),
            Some(NodeKind::Object(o)) => o.identifiable,
            _ => false,
        }
    }

    /// Live item ids of an identifiable indexed node: collections in item
    /// order, dictionaries in key order.
    pub fn live_ids(&self, node: NodeId) -> Vec<ItemId> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Collection(c)) => c.ids.clone().unwrap_or_default(),
            Some(NodeKind::Dictionary(d)) => d
                .ids
                .as_ref()
                .map(|ids| ids.values().copied().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn item_id_at(&self, node: NodeId, index: &Index) -> Option<ItemId> {
        match (self.nodes.get(&node).map(|n| &n.kind), index) {
            (Some(NodeKind::Collection(c)), Index::Seq(i)) => {
                c.ids.as_ref().and_then(|ids| ids.get(*i)).copied()
            }
            (Some(NodeKind::Dictionary(d)), Index::Key(k)) => {
                d.ids.as_ref().and_then(|ids| ids.get(k)).copied()
            }
            _ => None,
        }
    }

    /// Current index of a live item id. First occurrence wins for corrupt
    /// maps carrying duplicates.
    pub fn index_of_item(&self, node: NodeId, id: ItemId) -> Option<Index> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Collection(c)) => c
                .ids
                .as_ref()
                .and_then(|ids| ids.iter().position(|candidate| *candidate == id))
                .map(Index::Seq),
            Some(NodeKind::Dictionary(d)) => d.ids.as_ref().and_then(|ids| {
                ids.iter()
                    .find(|(_, candidate)| **candidate == id)
                    .map(|(key, _)| Index::Key(key.clone()))
            }),
            _ => None,
        }
    }

    pub fn item_slot(&self, node: NodeId, index: &Index) -> Option<&Slot> {
        match (self.nodes.get(&node).map(|n| &n.kind), index) {
            (Some(NodeKind::Collection(c)), Index::Seq(i)) => c.items.get(*i),
            (Some(NodeKind::Dictionary(d)), Index::Key(k)) => d.entries.get(k),
            _ => None,
        }
    }

    fn index_exists(&self, node: NodeId, index: &Index) -> bool {
        self.item_slot(node, index).is_some()
    }

    // ---- values -------------------------------------------------------

    /// Value at a node: member content for `Index::Empty`, item value
    /// otherwise. Structural subtrees are materialized.
    pub fn retrieve(&self, node: NodeId, index: &Index) -> Option<Value> {
        if index.is_empty() {
            let slot = match self.nodes.get(&node).map(|n| &n.kind)? {
                NodeKind::Member(m) => &m.slot,
                // Direct retrieval of a structured node materializes it.
                NodeKind::Object(_) | NodeKind::Collection(_) | NodeKind::Dictionary(_) => {
                    return self.emit_node(node);
                }
            };
            self.slot_to_value(slot)
        } else {
            self.item_slot(node, index)
                .and_then(|slot| self.slot_to_value(slot))
        }
    }

    pub fn slot_to_value(&self, slot: &Slot) -> Option<Value> {
        match slot {
            Slot::Scalar(s) => Some(Value::Scalar(s.clone())),
            Slot::Content(c) => Some(Value::Content(c.clone())),
            Slot::ObjectRef(o) => Some(Value::ObjectRef(*o)),
            Slot::Node(n) => self.emit_node(*n),
        }
    }

    fn emit_node(&self, node: NodeId) -> Option<Value> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Object(_) => self.emit_object(node).map(Value::Object),
            NodeKind::Collection(c) => {
                let items = c
                    .items
                    .iter()
                    .map(|slot| self.slot_to_value(slot))
                    .collect::<Option<Vec<_>>>()?;
                Some(Value::Collection(CollectionValue {
                    items,
                    ids: c.ids.clone(),
                }))
            }
            NodeKind::Dictionary(d) => {
                let entries = d
                    .entries
                    .iter()
                    .map(|(key, slot)| Some((key.clone(), self.slot_to_value(slot)?)))
                    .collect::<Option<BTreeMap<_, _>>>()?;
                Some(Value::Dictionary(DictionaryValue {
                    entries,
                    ids: d.ids.clone(),
                }))
            }
            NodeKind::Member(m) => self.slot_to_value(&m.slot),
        }
    }

    /// Re-emit the whole document.
    pub fn emit(&self) -> Option<ObjectValue> {
        self.emit_object(self.root)
    }

    fn emit_object(&self, node: NodeId) -> Option<ObjectValue> {
        let obj = self.object(node)?;
        let mut members = BTreeMap::new();
        for (name, member_id) in &obj.children {
            let member = self.member(*member_id)?;
            members.insert(
                name.clone(),
                MemberValue {
                    value: self.slot_to_value(&member.slot)?,
                    can_override: member.can_override,
                },
            );
        }
        Some(ObjectValue {
            id: obj.object_id,
            type_name: obj.type_name.clone(),
            identifiable: obj.identifiable,
            members,
        })
    }

    // ---- mutation -----------------------------------------------------

    /// Replace a member's value; returns the previous value and the arena
    /// ids detached with it.
    pub fn set_member(&mut self, node: NodeId, value: &Value) -> Result<Detached, GraphError> {
        self.member_mut(node)?;
        let new_slot = self.value_to_slot(node, value);
        let member = self.member_mut(node).expect("member checked above");
        let old_slot = std::mem::replace(&mut member.slot, new_slot);
        self.detach_slot(old_slot, ItemId::EMPTY)
    }

    /// Insert into a collection at `pos`. For identifiable collections the
    /// entry id is `id` when given, otherwise fresh.
    pub fn collection_insert(
        &mut self,
        node: NodeId,
        pos: usize,
        value: &Value,
        id: Option<ItemId>,
    ) -> Result<ItemId, GraphError> {
        if id.is_some_and(|id| id.is_empty()) {
            return Err(GraphError::CorruptedIdMap { node });
        }
        let col = self.collection_mut(node)?;
        if pos > col.items.len() {
            return Err(GraphError::OutOfRange { node });
        }
        let slot = self.value_to_slot(node, value);
        let col = self.collection_mut(node).expect("collection checked above");
        col.items.insert(pos, slot);
        let assigned = match col.ids.as_mut() {
            Some(ids) => {
                let assigned = id.unwrap_or_else(ItemId::fresh);
                ids.insert(pos, assigned);
                assigned
            }
            None => ItemId::EMPTY,
        };
        Ok(assigned)
    }

    pub fn collection_remove(&mut self, node: NodeId, pos: usize) -> Result<Detached, GraphError> {
        let col = self.collection_mut(node)?;
        if pos >= col.items.len() {
            return Err(GraphError::OutOfRange { node });
        }
        let slot = col.items.remove(pos);
        let id = match col.ids.as_mut() {
            Some(ids) => ids.remove(pos),
            None => ItemId::EMPTY,
        };
        self.detach_slot(slot, id)
    }

    /// Replace the item at `pos` in place; the item id is untouched.
    pub fn collection_set(
        &mut self,
        node: NodeId,
        pos: usize,
        value: &Value,
    ) -> Result<Detached, GraphError> {
        {
            let col = self.collection_mut(node)?;
            if pos >= col.items.len() {
                return Err(GraphError::OutOfRange { node });
            }
        }
        let new_slot = self.value_to_slot(node, value);
        let col = self.collection_mut(node).expect("collection checked above");
        let old_slot = std::mem::replace(&mut col.items[pos], new_slot);
        let id = col
            .ids
            .as_ref()
            .and_then(|ids| ids.get(pos))
            .copied()
            .unwrap_or(ItemId::EMPTY);
        self.detach_slot(old_slot, id)
    }

    /// Insert into a dictionary at a free key.
    pub fn dictionary_insert(
        &mut self,
        node: NodeId,
        key: &Scalar,
        value: &Value,
        id: Option<ItemId>,
    ) -> Result<ItemId, GraphError> {
        if id.is_some_and(|id| id.is_empty()) {
            return Err(GraphError::CorruptedIdMap { node });
        }
        let dict = self.dictionary_mut(node)?;
        if dict.entries.contains_key(key) {
            return Err(GraphError::DuplicateKey { node });
        }
        let slot = self.value_to_slot(node, value);
        let dict = self.dictionary_mut(node).expect("dictionary checked above");
        dict.entries.insert(key.clone(), slot);
        let assigned = match dict.ids.as_mut() {
            Some(ids) => {
                let assigned = id.unwrap_or_else(ItemId::fresh);
                ids.insert(key.clone(), assigned);
                assigned
            }
            None => ItemId::EMPTY,
        };
        Ok(assigned)
    }

    pub fn dictionary_remove(&mut self, node: NodeId, key: &Scalar) -> Result<Detached, GraphError> {
        let dict = self.dictionary_mut(node)?;
        let Some(slot) = dict.entries.remove(key) else {
            return Err(GraphError::OutOfRange { node });
        };
        let id = dict
            .ids
            .as_mut()
            .and_then(|ids| ids.remove(key))
            .unwrap_or(ItemId::EMPTY);
        self.detach_slot(slot, id)
    }

    /// Replace a dictionary entry's value in place; key and id untouched.
    pub fn dictionary_set(
        &mut self,
        node: NodeId,
        key: &Scalar,
        value: &Value,
    ) -> Result<Detached, GraphError> {
        {
            let dict = self.dictionary_mut(node)?;
            if !dict.entries.contains_key(key) {
                return Err(GraphError::OutOfRange { node });
            }
        }
        let new_slot = self.value_to_slot(node, value);
        let dict = self.dictionary_mut(node).expect("dictionary checked above");
        let old_slot = dict
            .entries
            .insert(key.clone(), new_slot)
            .expect("entry checked above");
        let id = dict
            .ids
            .as_ref()
            .and_then(|ids| ids.get(key))
            .copied()
            .unwrap_or(ItemId::EMPTY);
        self.detach_slot(old_slot, id)
    }

    /// Move a dictionary entry to a free key without detaching its
    /// subtree; the id map follows the entry.
    pub fn dictionary_move(
        &mut self,
        node: NodeId,
        from: &Scalar,
        to: &Scalar,
    ) -> Result<ItemId, GraphError> {
        let dict = self.dictionary_mut(node)?;
        if dict.entries.contains_key(to) {
            return Err(GraphError::DuplicateKey { node });
        }
        let Some(slot) = dict.entries.remove(from) else {
            return Err(GraphError::OutOfRange { node });
        };
        dict.entries.insert(to.clone(), slot);
        let id = match dict.ids.as_mut() {
            Some(ids) => match ids.remove(from) {
                Some(id) => {
                    ids.insert(to.clone(), id);
                    id
                }
                None => ItemId::EMPTY,
            },
            None => ItemId::EMPTY,
        };
        Ok(id)
    }

    fn detach_slot(&mut self, slot: Slot, item_id: ItemId) -> Result<Detached, GraphError> {
        let value = self
            .slot_to_value(&slot)
            .unwrap_or(Value::Scalar(Scalar::Bool(false)));
        let mut removed_nodes = Vec::new();
        if let Slot::Node(n) = slot {
            self.remove_subtree(n, &mut removed_nodes);
        }
        Ok(Detached {
            value,
            item_id,
            removed_nodes,
        })
    }

    fn remove_subtree(&mut self, node: NodeId, removed: &mut Vec<NodeId>) {
        let Some(n) = self.nodes.remove(&node) else {
            return;
        };
        removed.push(node);
        match n.kind {
            NodeKind::Object(obj) => {
                if obj.identifiable && self.objects.get(&obj.object_id) == Some(&node) {
                    self.objects.remove(&obj.object_id);
                }
                for child in obj.children.values() {
                    self.remove_subtree(*child, removed);
                }
            }
            NodeKind::Member(member) => {
                if let Slot::Node(target) = member.slot {
                    self.remove_subtree(target, removed);
                }
            }
            NodeKind::Collection(col) => {
                for slot in col.items {
                    if let Slot::Node(target) = slot {
                        self.remove_subtree(target, removed);
                    }
                }
            }
            NodeKind::Dictionary(dict) => {
                for slot in dict.entries.into_values() {
                    if let Slot::Node(target) = slot {
                        self.remove_subtree(target, removed);
                    }
                }
            }
        }
    }

    /// Arena ids of the structural children of a node (member targets,
    /// object members, item targets). Object references are not children.
    pub fn structural_children(&self, node: NodeId) -> Vec<NodeId> {
        let Some(n) = self.nodes.get(&node) else {
            return Vec::new();
        };
        match &n.kind {
            NodeKind::Object(obj) => obj.children.values().copied().collect(),
            NodeKind::Member(member) => match member.slot {
                Slot::Node(target) => vec![target],
                _ => Vec::new(),
            },
            NodeKind::Collection(col) => col
                .items
                .iter()
                .filter_map(|slot| match slot {
                    Slot::Node(target) => Some(*target),
                    _ => None,
                })
                .collect(),
            NodeKind::Dictionary(dict) => dict
                .entries
                .values()
                .filter_map(|slot| match slot {
                    Slot::Node(target) => Some(*target),
                    _ => None,
                })
                .collect(),
        }
    }

    // ---- paths --------------------------------------------------------

    /// Walk a `NodePath` per the resolution rules: member steps follow
    /// references to objects, index/item steps land on indexed nodes and
    /// descend through item targets when more steps remain.
    ///
    /// `Ok(None)` is the fail-soft outcome (missing child, unknown id,
    /// unresolvable reference); `Err(KindMismatch)` means the document
    /// shape contradicts the path.
    pub fn resolve(&self, path: &NodePath) -> Result<Option<Resolved>, GraphError> {
        let mut node = self.root;
        let mut index = Index::Empty;
        let mut on_index = false;
        let total = path.len();
        for (pos, step) in path.steps().iter().enumerate() {
            let last = pos + 1 == total;
            match step {
                PathStep::Member(name) => {
                    let Some(obj) = self.deref_object(node).map_err(|e| at_step(e, pos))? else {
                        return Ok(None);
                    };
                    let Some(child) = self.object(obj).and_then(|o| o.children.get(name)) else {
                        return Ok(None);
                    };
                    node = *child;
                    index = Index::Empty;
                    on_index = false;
                }
                PathStep::Index(idx) => {
                    let Some(indexed) = self.deref_indexed(node).map_err(|e| at_step(e, pos))?
                    else {
                        return Ok(None);
                    };
                    if !self.index_exists(indexed, idx) {
                        return Ok(None);
                    }
                    node = indexed;
                    index = idx.clone();
                    on_index = true;
                    if !last {
                        match self.descend_item(indexed, idx, pos)? {
                            Some(target) => {
                                node = target;
                                index = Index::Empty;
                                on_index = false;
                            }
                            None => return Ok(None),
                        }
                    }
                }
                PathStep::Item(id) => {
                    let Some(indexed) = self.deref_indexed(node).map_err(|e| at_step(e, pos))?
                    else {
                        return Ok(None);
                    };
                    let Some(idx) = self.index_of_item(indexed, *id) else {
                        return Ok(None);
                    };
                    node = indexed;
                    index = idx.clone();
                    on_index = true;
                    if !last {
                        match self.descend_item(indexed, &idx, pos)? {
                            Some(target) => {
                                node = target;
                                index = Index::Empty;
                                on_index = false;
                            }
                            None => return Ok(None),
                        }
                    }
                }
            }
        }
        Ok(Some(Resolved {
            node,
            index,
            resolved_on_index: on_index,
        }))
    }

    fn descend_item(
        &self,
        node: NodeId,
        index: &Index,
        step: usize,
    ) -> Result<Option<NodeId>, GraphError> {
        match self.item_slot(node, index) {
            Some(Slot::Node(target)) => Ok(Some(*target)),
            Some(Slot::ObjectRef(object)) => Ok(self.object_node(*object)),
            Some(Slot::Scalar(_)) | Some(Slot::Content(_)) => {
                Err(at_step(self.mismatch(node, "object item", "terminal item"), step))
            }
            None => Ok(None),
        }
    }

    /// Path from the root to `(node, index)`. Identifiable entries are
    /// addressed by item id, everything else positionally.
    pub fn path_of(&self, node: NodeId, index: &Index) -> Option<NodePath> {
        let mut steps = Vec::new();
        if !index.is_empty() {
            match self.item_id_at(node, index) {
                Some(id) if !id.is_empty() => steps.push(PathStep::Item(id)),
                _ => steps.push(PathStep::Index(index.clone())),
            }
        }
        let mut cur = node;
        loop {
            let n = self.nodes.get(&cur)?;
            let Some(parent_id) = n.parent else { break };
            let parent = self.nodes.get(&parent_id)?;
            match &parent.kind {
                // A member's structural target; the member name is pushed
                // on the next hop.
                NodeKind::Member(_) => {}
                NodeKind::Object(obj) => {
                    let name = obj
                        .children
                        .iter()
                        .find(|(_, id)| **id == cur)
                        .map(|(name, _)| name.clone())?;
                    steps.push(PathStep::Member(name));
                }
                NodeKind::Collection(col) => {
                    let pos = col
                        .items
                        .iter()
                        .position(|slot| matches!(slot, Slot::Node(id) if *id == cur))?;
                    match col.ids.as_ref().and_then(|ids| ids.get(pos)).copied() {
                        Some(id) if !id.is_empty() => steps.push(PathStep::Item(id)),
                        _ => steps.push(PathStep::Index(Index::Seq(pos))),
                    }
                }
                NodeKind::Dictionary(dict) => {
                    let key = dict
                        .entries
                        .iter()
                        .find(|(_, slot)| matches!(slot, Slot::Node(id) if *id == cur))
                        .map(|(key, _)| key.clone())?;
                    match dict.ids.as_ref().and_then(|ids| ids.get(&key)).copied() {
                        Some(id) if !id.is_empty() => steps.push(PathStep::Item(id)),
                        _ => steps.push(PathStep::Index(Index::Key(key))),
                    }
                }
            }
            cur = parent_id;
        }
        steps.reverse();
        Some(NodePath::from(steps))
    }
}

fn at_step(err: GraphError, step: usize) -> GraphError {
    match err {
        GraphError::KindMismatch(mut mismatch) => {
            mismatch.step = step;
            GraphError::KindMismatch(mismatch)
        }
        other => other,
    }
}

//! Layer 7: Base linker and base→derived registry
//!
//! Walks derived and base graphs in lockstep, matching members by name and
//! items by item id (never by index), and records:
//! - per-node links: derived node → base node
//! - the registry: base-side identifiable object → derived counterpart
//!
//! The policy's `find_target` is consulted at every object boundary so
//! composite assets can redirect sub-trees to different base roots; a
//! redirect that does not resolve leaves the sub-tree unlinked.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::AssetPropertyGraph;
use crate::ident::{NodeId, ObjectId};
use crate::node::{NodeGraph, NodeKind, Slot};
use crate::policy::GraphPolicy;

/// Rebuild `derived`'s base links and registry from scratch. Safe to call
/// repeatedly; previous links are dropped first.
pub fn link_to_base(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    policy: &dyn GraphPolicy,
) {
    derived.clear_all_base_links();
    let mut linker = Linker {
        derived: derived.nodes(),
        base: base.nodes(),
        policy,
        links: BTreeMap::new(),
        registry: BTreeMap::new(),
        visited: BTreeSet::new(),
    };
    linker.link_object(derived.root(), base.root());
    let links = linker.links;
    let registry = linker.registry;
    derived.base_links = links;
    derived.registry = registry;
}

struct Linker<'a> {
    derived: &'a NodeGraph,
    base: &'a NodeGraph,
    policy: &'a dyn GraphPolicy,
    links: BTreeMap<NodeId, NodeId>,
    registry: BTreeMap<ObjectId, ObjectId>,
    visited: BTreeSet<NodeId>,
}

impl Linker<'_> {
    fn link_object(&mut self, d: NodeId, b: NodeId) {
        // Redirects can send two derived objects to one base object; visit
        // each derived object once.
        if !self.visited.insert(d) {
            return;
        }
        let Some(d_obj) = self.derived.object(d) else {
            return;
        };
        let Some(b_obj) = self.base.object(b) else {
            return;
        };
        let target = self.policy.find_target(d_obj.object_id, b_obj.object_id);
        let (b, b_obj) = if target == b_obj.object_id {
            (b, b_obj)
        } else {
            let Some(redirected) = self.base.object_node(target) else {
                return;
            };
            let Some(obj) = self.base.object(redirected) else {
                return;
            };
            (redirected, obj)
        };

        self.links.insert(d, b);
        if d_obj.identifiable && b_obj.identifiable {
            self.registry.insert(b_obj.object_id, d_obj.object_id);
        }
        for (name, d_member) in &d_obj.children {
            if let Some(b_member) = b_obj.children.get(name) {
                self.link_member(*d_member, *b_member);
            }
        }
    }

    fn link_member(&mut self, d: NodeId, b: NodeId) {
        self.links.insert(d, b);
        let (Some(d_member), Some(b_member)) = (self.derived.member(d), self.base.member(b))
        else {
            return;
        };
        if let (Slot::Node(d_target), Slot::Node(b_target)) = (&d_member.slot, &b_member.slot) {
            // Referenced parts belong to another sub-entity's base linkage.
            if self.policy.is_referenced_part(d, *d_target) {
                return;
            }
            self.link_structural(*d_target, *b_target);
        }
    }

    /// Pair up structural targets of matching kind; mismatching kinds stay
    /// unlinked and are resolved by member reconciliation.
    fn link_structural(&mut self, d: NodeId, b: NodeId) {
        let (Some(d_node), Some(b_node)) = (self.derived.node(d), self.base.node(b)) else {
            return;
        };
        match (&d_node.kind, &b_node.kind) {
            (NodeKind::Object(_), NodeKind::Object(_)) => self.link_object(d, b),
            (NodeKind::Collection(_), NodeKind::Collection(_)) => self.link_collection(d, b),
            (NodeKind::Dictionary(_), NodeKind::Dictionary(_)) => self.link_dictionary(d, b),
            _ => {}
        }
    }

    fn link_collection(&mut self, d: NodeId, b: NodeId) {
        self.links.insert(d, b);
        let (Some(d_col), Some(b_col)) = (self.derived.collection(d), self.base.collection(b))
        else {
            return;
        };
        match (&d_col.ids, &b_col.ids) {
            // Identifiable: match items by id.
            (Some(d_ids), Some(b_ids)) => {
                for (d_pos, id) in d_ids.iter().enumerate() {
                    if id.is_empty() {
                        continue;
                    }
                    let Some(b_pos) = b_ids.iter().position(|candidate| candidate == id) else {
                        continue;
                    };
                    self.link_item_slots(d_col.items.get(d_pos), b_col.items.get(b_pos));
                }
            }
            // Plain sequences pair positionally.
            _ => {
                for (d_slot, b_slot) in d_col.items.iter().zip(&b_col.items) {
                    self.link_item_slots(Some(d_slot), Some(b_slot));
                }
            }
        }
    }

    fn link_dictionary(&mut self, d: NodeId, b: NodeId) {
        self.links.insert(d, b);
        let (Some(d_dict), Some(b_dict)) = (self.derived.dictionary(d), self.base.dictionary(b))
        else {
            return;
        };
        match (&d_dict.ids, &b_dict.ids) {
            // Identifiable: match entries by id, keys may differ.
            (Some(d_ids), Some(b_ids)) => {
                for (d_key, id) in d_ids {
                    if id.is_empty() {
                        continue;
                    }
                    let Some((b_key, _)) = b_ids.iter().find(|(_, candidate)| *candidate == id)
                    else {
                        continue;
                    };
                    self.link_item_slots(d_dict.entries.get(d_key), b_dict.entries.get(b_key));
                }
            }
            // Plain dictionaries pair by key.
            _ => {
                for (key, d_slot) in &d_dict.entries {
                    self.link_item_slots(Some(d_slot), b_dict.entries.get(key));
                }
            }
        }
    }

    fn link_item_slots(&mut self, d: Option<&Slot>, b: Option<&Slot>) {
        if let (Some(Slot::Node(d_target)), Some(Slot::Node(b_target))) = (d, b) {
            self.link_structural(*d_target, *b_target);
        }
    }
}

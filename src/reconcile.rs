//! Layer 8: Reconciler
//!
//! Enforces "unoverridden ⇒ equal to base": members by value or runtime
//! type, identifiable collections and dictionaries item by item by id.
//!
//! The driver alternates linking and reconcile passes until a pass makes
//! no mutation. A pass that grafts a cloned base subtree leaves that
//! subtree unlinked; the next iteration links it and finds nothing left to
//! change (grafts copy base content exactly), so the loop settles after
//! the work is done and a second invocation is a no-op.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::clone::clone_with_remap;
use crate::error::GraphError;
use crate::event::ChangeKind;
use crate::graph::AssetPropertyGraph;
use crate::ident::{ItemId, NodeId, ObjectId};
use crate::link::link_to_base;
use crate::node::{NodeGraph, NodeKind, Slot};
use crate::path::Index;
use crate::policy::GraphPolicy;
use crate::value::Value;

/// Bound on link/pass iterations; converging runs settle in two or three.
const MAX_PASSES: usize = 16;

/// Reconcile `derived` against `base`, scoped to `scope` (the whole graph
/// when `None`). Mutations made here are attributed to the base: no
/// override stamping, no deletion marking, no re-entry.
pub fn reconcile_with_base(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    scope: Option<NodeId>,
    policy: &dyn GraphPolicy,
) -> Result<(), GraphError> {
    if let Some(node) = scope {
        if !derived.nodes().contains(node) {
            return Err(GraphError::UnknownNode(node));
        }
    }
    derived.updating_from_base = true;
    let result = run_to_fixpoint(derived, base, scope, policy);
    derived.updating_from_base = false;
    result
}

fn run_to_fixpoint(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    scope: Option<NodeId>,
    policy: &dyn GraphPolicy,
) -> Result<(), GraphError> {
    for pass in 0..MAX_PASSES {
        // Linking always starts at the root: a scoped pass still needs the
        // registry for reference resolution.
        link_to_base(derived, base, policy);
        let mutations = reconcile_pass(derived, base, scope, policy)?;
        debug!(pass, mutations, asset = %derived.asset(), "reconcile pass");
        if mutations == 0 {
            return Ok(());
        }
    }
    warn!(asset = %derived.asset(), "reconciliation did not settle; differences remain");
    Ok(())
}

fn reconcile_pass(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    scope: Option<NodeId>,
    policy: &dyn GraphPolicy,
) -> Result<usize, GraphError> {
    let mut mutations = 0;
    let mut stack = vec![scope.unwrap_or_else(|| derived.root())];
    let mut visited = BTreeSet::new();
    while let Some(node) = stack.pop() {
        if !visited.insert(node) || !derived.nodes().contains(node) {
            continue;
        }
        let Some(base_node) = derived.base_link(node) else {
            continue;
        };
        match derived.nodes().node(node).map(|n| &n.kind) {
            Some(NodeKind::Member(_)) => {
                mutations += reconcile_member(derived, base, node, base_node, policy)?;
            }
            Some(NodeKind::Collection(_)) | Some(NodeKind::Dictionary(_)) => {
                if derived.nodes().is_identifiable(node)
                    && base.nodes().is_identifiable(base_node)
                {
                    mutations += reconcile_items(derived, base, node, base_node, policy)?;
                }
            }
            _ => {}
        }
        // Children are gathered after the node was handled: a graft
        // replaces the subtree below it.
        if derived.nodes().contains(node) {
            stack.extend(derived.nodes().structural_children(node));
        }
    }
    Ok(mutations)
}

/// What a reconcile check decided for one member or item.
enum Action {
    Keep,
    /// Write a pointer to the derived counterpart of a base object.
    WriteObjectRef(ObjectId),
    /// Overwrite with a remapped clone of the base value.
    CloneBase,
}

// ---- members ----------------------------------------------------------

fn reconcile_member(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    node: NodeId,
    base_node: NodeId,
    policy: &dyn GraphPolicy,
) -> Result<usize, GraphError> {
    let Some(member) = derived.nodes().member(node) else {
        return Ok(0);
    };
    if !member.can_override || derived.overrides().content(node).is_overridden() {
        return Ok(0);
    }
    let Some(base_member) = base.nodes().member(base_node) else {
        return Ok(0);
    };
    let Some(base_value) = base.nodes().retrieve(base_node, &Index::Empty) else {
        return Ok(0);
    };
    let derived_slot = member.slot.clone();
    let base_slot = base_member.slot.clone();

    let action = decide(
        derived,
        base,
        &derived_slot,
        &base_slot,
        base_node,
        &Index::Empty,
        &base_value,
        policy,
    );
    apply_action(derived, node, &Index::Empty, action, &base_value)
}

// ---- shared decision rules --------------------------------------------

/// The member/item reconcile rules, §by shape:
/// - base side is an object reference ⇒ compare against the resolved
///   derived counterpart
/// - either side structural ⇒ reconcile iff runtime types differ
/// - content refs compare by `(id, url)`
/// - plain values compare by value
#[allow(clippy::too_many_arguments)]
fn decide(
    derived: &AssetPropertyGraph,
    base: &AssetPropertyGraph,
    derived_slot: &Slot,
    base_slot: &Slot,
    base_node: NodeId,
    base_index: &Index,
    base_value: &Value,
    policy: &dyn GraphPolicy,
) -> Action {
    if let Some(base_object) = base_object_reference(base, base_slot, base_node, base_index, base_value, policy)
    {
        let Some(target) = derived.resolve_base_to_derived(base_object) else {
            // No counterpart yet; a later pass may produce one.
            return Action::Keep;
        };
        return match derived_slot {
            Slot::ObjectRef(current) if *current == target => Action::Keep,
            _ => Action::WriteObjectRef(target),
        };
    }

    if derived_slot.is_structural() || base_slot.is_structural() {
        let differ = runtime_type(derived.nodes(), derived_slot)
            != runtime_type(base.nodes(), base_slot);
        return if differ { Action::CloneBase } else { Action::Keep };
    }

    if let (Slot::Content(derived_ref), Slot::Content(base_ref)) = (derived_slot, base_slot) {
        return if derived_ref == base_ref {
            Action::Keep
        } else {
            Action::CloneBase
        };
    }

    let equal = match (derived_slot, base_slot) {
        (Slot::Scalar(l), Slot::Scalar(b)) => l == b,
        (Slot::ObjectRef(l), Slot::ObjectRef(b)) => l == b,
        _ => false,
    };
    if equal { Action::Keep } else { Action::CloneBase }
}

/// Is the base-side value a pointer to an identifiable object? Either the
/// slot is one outright, or the asset policy says this position holds
/// pointers.
fn base_object_reference(
    base: &AssetPropertyGraph,
    base_slot: &Slot,
    base_node: NodeId,
    base_index: &Index,
    base_value: &Value,
    policy: &dyn GraphPolicy,
) -> Option<ObjectId> {
    match base_slot {
        Slot::ObjectRef(object) => Some(*object),
        Slot::Node(_) => match base_value {
            Value::Object(obj)
                if obj.identifiable
                    && policy.is_object_reference(base.nodes(), base_node, base_index, base_value) =>
            {
                Some(obj.id)
            }
            _ => None,
        },
        _ => None,
    }
}

/// Runtime type of a slot: the node kind, refined by the object type tag.
fn runtime_type<'a>(nodes: &'a NodeGraph, slot: &'a Slot) -> (&'static str, Option<&'a str>) {
    match slot {
        Slot::Scalar(_) => ("scalar", None),
        Slot::Content(_) => ("content-ref", None),
        Slot::ObjectRef(_) => ("object-ref", None),
        Slot::Node(target) => match nodes.node(*target).map(|n| &n.kind) {
            Some(NodeKind::Object(obj)) => ("object", obj.type_name.as_deref()),
            Some(NodeKind::Collection(_)) => ("collection", None),
            Some(NodeKind::Dictionary(_)) => ("dictionary", None),
            Some(NodeKind::Member(_)) | None => ("dangling", None),
        },
    }
}

fn apply_action(
    derived: &mut AssetPropertyGraph,
    node: NodeId,
    index: &Index,
    action: Action,
    base_value: &Value,
) -> Result<usize, GraphError> {
    match action {
        Action::Keep => Ok(0),
        Action::WriteObjectRef(target) => {
            derived.update(node, index, Value::ObjectRef(target))?;
            Ok(1)
        }
        Action::CloneBase => {
            let outcome = clone_with_remap(base_value);
            derived.registry.extend(outcome.remapped);
            derived.update(node, index, outcome.value)?;
            Ok(1)
        }
    }
}

// ---- identifiable collections and dictionaries ------------------------

fn reconcile_items(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    node: NodeId,
    base_node: NodeId,
    policy: &dyn GraphPolicy,
) -> Result<usize, GraphError> {
    let mut mutations = 0;

    let derived_live: Vec<ItemId> = derived.nodes().live_ids(node);
    let base_live: Vec<ItemId> = base.nodes().live_ids(base_node);
    let base_set: BTreeSet<ItemId> = base_live.iter().copied().filter(|id| !id.is_empty()).collect();

    // Pass 1: removals and deleted-set cleanup.
    let mut to_remove: Vec<ItemId> = Vec::new();
    for id in &derived_live {
        if !id.is_empty() && derived.overrides().item_overridden(node, *id) {
            continue;
        }
        if id.is_empty() {
            // Corrupted id map entry; drop the item.
            to_remove.push(*id);
            continue;
        }
        if !base_set.contains(id) {
            to_remove.push(*id);
        }
    }
    for id in derived.overrides.deleted_items(node) {
        if !base_set.contains(&id) {
            // The basis for the overriding deletion no longer exists.
            derived.overrides.unmark_deleted(node, id);
        }
    }

    // Pass 2: evaluate base entries in base order.
    let derived_set: BTreeSet<ItemId> = derived_live
        .iter()
        .copied()
        .filter(|id| !id.is_empty())
        .collect();
    let mut to_insert: Vec<(ItemId, usize, Index)> = Vec::new();
    for (base_pos, id) in base_live.iter().enumerate() {
        if id.is_empty() || derived.overrides().is_deleted(node, *id) {
            continue;
        }
        let Some(base_index) = base.nodes().index_of_item(base_node, *id) else {
            continue;
        };
        if !derived_set.contains(id) {
            mutations +=
                plan_insert(derived, base, node, base_node, *id, base_pos, &base_index, policy, &mut to_insert)?;
        } else {
            mutations +=
                reconcile_common_item(derived, base, node, base_node, *id, &base_index, policy)?;
        }
    }

    // Apply pass 1 removals: reconciliation steps, never overriding
    // deletions (the flag suppresses deletion marking).
    for id in to_remove {
        if let Some(index) = derived.nodes().index_of_item(node, id) {
            derived.remove(node, &index)?;
            mutations += 1;
        }
    }

    // Apply pass 2 insertions.
    for (id, base_pos, base_index) in to_insert {
        let Some(base_value) = base.nodes().retrieve(base_node, &base_index) else {
            continue;
        };
        let outcome = clone_with_remap(&base_value);
        derived.registry.extend(outcome.remapped);
        let at = match &base_index {
            Index::Seq(_) => {
                let derived_ids = derived.nodes().live_ids(node);
                Index::Seq(insertion_index(&base_live, base_pos, &derived_ids, &base_set))
            }
            Index::Key(key) => {
                // Collisions were filtered during evaluation; a key taken
                // since then means the base state itself moved on.
                if derived.nodes().item_slot(node, &base_index).is_some() {
                    continue;
                }
                Index::Key(key.clone())
            }
            Index::Empty => continue,
        };
        derived.restore(node, &at, outcome.value, id)?;
        mutations += 1;
    }

    Ok(mutations)
}

#[allow(clippy::too_many_arguments)]
fn plan_insert(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    node: NodeId,
    base_node: NodeId,
    id: ItemId,
    base_pos: usize,
    base_index: &Index,
    policy: &dyn GraphPolicy,
    to_insert: &mut Vec<(ItemId, usize, Index)>,
) -> Result<usize, GraphError> {
    let Some(base_value) = base.nodes().retrieve(base_node, base_index) else {
        return Ok(0);
    };
    if let Index::Key(key) = base_index {
        // Key collision against a live derived entry: record the id as
        // deleted instead of adding.
        if derived.nodes().item_slot(node, &Index::Key(key.clone())).is_some() {
            derived.overrides.mark_deleted(node, id);
            return Ok(0);
        }
    }
    if !policy.can_update(
        derived.nodes(),
        node,
        ChangeKind::CollectionAdd,
        base_index,
        &base_value,
    ) {
        derived.overrides.mark_deleted(node, id);
        return Ok(0);
    }
    to_insert.push((id, base_pos, base_index.clone()));
    Ok(0)
}

/// An id live on both sides: update the value in place unless the item
/// override is set, and follow base key moves unless the key override is
/// set.
fn reconcile_common_item(
    derived: &mut AssetPropertyGraph,
    base: &AssetPropertyGraph,
    node: NodeId,
    base_node: NodeId,
    id: ItemId,
    base_index: &Index,
    policy: &dyn GraphPolicy,
) -> Result<usize, GraphError> {
    let mut mutations = 0;
    let Some(derived_index) = derived.nodes().index_of_item(node, id) else {
        return Ok(0);
    };

    if !derived.overrides().item_overridden(node, id) {
        let derived_slot = derived.nodes().item_slot(node, &derived_index).cloned();
        let base_slot = base.nodes().item_slot(base_node, base_index).cloned();
        if let (Some(derived_slot), Some(base_slot)) = (derived_slot, base_slot) {
            if let Some(base_value) = base.nodes().retrieve(base_node, base_index) {
                let action = decide(
                    derived,
                    base,
                    &derived_slot,
                    &base_slot,
                    base_node,
                    base_index,
                    &base_value,
                    policy,
                );
                let vetoed = matches!(action, Action::CloneBase | Action::WriteObjectRef(_))
                    && !policy.can_update(
                        derived.nodes(),
                        node,
                        ChangeKind::CollectionUpdate,
                        &derived_index,
                        &base_value,
                    );
                if !vetoed {
                    mutations += apply_action(derived, node, &derived_index, action, &base_value)?;
                }
            }
        }
    }

    if let (Index::Key(derived_key), Index::Key(base_key)) = (&derived_index, base_index) {
        if derived_key != base_key && !derived.overrides().key_overridden(node, id) {
            // A derived entry still occupying the target key blocks the
            // move this pass; removals below free it for the next one.
            if derived.nodes().item_slot(node, &Index::Key(base_key.clone())).is_none() {
                let (from, to) = (derived_key.clone(), base_key.clone());
                derived.move_key(node, &from, &to)?;
                mutations += 1;
            }
        }
    }

    Ok(mutations)
}

/// Insertion index that reconstructs base order: walk base positions
/// before `base_pos` for the nearest id that is live in the derived node,
/// insert after it and after any run of derived-local items that follows
/// it (local inserts stay attached to their predecessor). With no common
/// predecessor, insert at the front.
fn insertion_index(
    base_ids: &[ItemId],
    base_pos: usize,
    derived_ids: &[ItemId],
    base_set: &BTreeSet<ItemId>,
) -> usize {
    for candidate_pos in (0..base_pos).rev() {
        let candidate = base_ids[candidate_pos];
        if candidate.is_empty() {
            continue;
        }
        if let Some(derived_pos) = derived_ids.iter().position(|id| *id == candidate) {
            let mut at = derived_pos + 1;
            while at < derived_ids.len() && !base_set.contains(&derived_ids[at]) {
                at += 1;
            }
            return at;
        }
    }
    0
}

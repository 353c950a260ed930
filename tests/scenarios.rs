//! End-to-end reconciliation scenarios: member inheritance and overrides,
//! identifiable collection/dictionary merging, ordering reconstruction,
//! and object-reference resolution.

use strata::{
    clone_with_remap, AssetItem, AssetPropertyGraph, CollectionValue, DictionaryValue,
    GraphContainer, GraphEvent, Index, ItemId, NodeId, ObjectValue, OverrideKind, Scalar, Value,
};

fn derive_item(base: &AssetItem) -> AssetItem {
    let outcome = clone_with_remap(&Value::Object(base.root.clone()));
    let Value::Object(root) = outcome.value else {
        unreachable!("clone preserves kinds");
    };
    let mut item = AssetItem::new(root);
    item.base = Some(base.id);
    item
}

fn member(graph: &AssetPropertyGraph, name: &str) -> NodeId {
    graph
        .nodes()
        .child(graph.root(), name)
        .unwrap_or_else(|| panic!("member `{name}` missing"))
}

fn member_target(graph: &AssetPropertyGraph, name: &str) -> NodeId {
    let node = member(graph, name);
    graph
        .nodes()
        .member_target(node)
        .unwrap_or_else(|| panic!("member `{name}` has no target"))
}

fn member_value(graph: &AssetPropertyGraph, name: &str) -> Value {
    graph
        .retrieve(member(graph, name), &Index::Empty)
        .unwrap_or_else(|| panic!("member `{name}` has no value"))
}

fn update_member(container: &mut GraphContainer, asset: strata::AssetId, name: &str, value: Value) {
    container
        .mutate(asset, |graph| {
            let node = member(graph, name);
            graph.update(node, &Index::Empty, value)
        })
        .unwrap();
}

#[test]
fn s1_unoverridden_member_follows_base() {
    let mut container = GraphContainer::new();
    let base_item = AssetItem::new(ObjectValue::new("Material").with_member("color", "red"));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    update_member(&mut container, base_id, "color", Value::from("green"));

    let derived = container.lookup(derived_id).unwrap();
    assert_eq!(member_value(derived, "color"), Value::from("green"));
    assert_eq!(
        derived.overrides().content(member(derived, "color")),
        OverrideKind::Base
    );
    derived.check_invariants().unwrap();
}

#[test]
fn s2_overridden_member_is_preserved() {
    let mut container = GraphContainer::new();
    let base_item = AssetItem::new(ObjectValue::new("Material").with_member("color", "red"));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    update_member(&mut container, derived_id, "color", Value::from("blue"));
    update_member(&mut container, base_id, "color", Value::from("green"));

    let derived = container.lookup(derived_id).unwrap();
    assert_eq!(member_value(derived, "color"), Value::from("blue"));
    assert_eq!(
        derived.overrides().content(member(derived, "color")),
        OverrideKind::New
    );
}

fn list_item(label: &str, value: i64) -> Value {
    Value::Object(
        ObjectValue::inline("Slot")
            .with_member("label", label)
            .with_member("value", value),
    )
}

fn identifiable_list(entries: &[(&str, i64)]) -> (Value, Vec<ItemId>) {
    let ids: Vec<ItemId> = entries.iter().map(|_| ItemId::fresh()).collect();
    let items = entries
        .iter()
        .map(|(label, value)| list_item(label, *value))
        .collect();
    (
        Value::Collection(CollectionValue::with_ids(items, ids.clone())),
        ids,
    )
}

#[test]
fn s3_base_deletion_reaches_unoverridden_derivative() {
    let mut container = GraphContainer::new();
    let (list, ids) = identifiable_list(&[("a", 1), ("b", 2), ("c", 3)]);
    let base_item = AssetItem::new(ObjectValue::new("Inventory").with_member("slots", list));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    container
        .mutate(base_id, |graph| {
            let slots = member_target(graph, "slots");
            let index = graph.nodes().index_of_item(slots, ids[1]).unwrap();
            graph.remove(slots, &index).map(|_| ())
        })
        .unwrap();

    let derived = container.lookup(derived_id).unwrap();
    let slots = member_target(derived, "slots");
    assert_eq!(derived.nodes().live_ids(slots), vec![ids[0], ids[2]]);
    assert!(derived.overrides().deleted_items(slots).is_empty());
    derived.check_invariants().unwrap();
}

#[test]
fn s4_local_deletion_survives_base_additions() {
    let mut container = GraphContainer::new();
    let (list, ids) = identifiable_list(&[("a", 1), ("b", 2)]);
    let base_item = AssetItem::new(ObjectValue::new("Inventory").with_member("slots", list));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    // Local overriding deletion of `b`.
    container
        .mutate(derived_id, |graph| {
            let slots = member_target(graph, "slots");
            let index = graph.nodes().index_of_item(slots, ids[1]).unwrap();
            graph.remove(slots, &index).map(|_| ())
        })
        .unwrap();

    // Base gains `d`.
    let d_id = container
        .mutate(base_id, |graph| {
            let slots = member_target(graph, "slots");
            graph.add(slots, &Index::Seq(2), list_item("d", 4))
        })
        .unwrap();

    let derived = container.lookup(derived_id).unwrap();
    let slots = member_target(derived, "slots");
    assert_eq!(derived.nodes().live_ids(slots), vec![ids[0], d_id]);
    assert_eq!(
        derived.overrides().deleted_items(slots),
        std::collections::BTreeSet::from([ids[1]])
    );
    derived.check_invariants().unwrap();
}

#[test]
fn s5_base_key_move_follows_item_id() {
    let mut container = GraphContainer::new();
    let mut entries = std::collections::BTreeMap::new();
    entries.insert(Scalar::from("k1"), Value::from("v1"));
    let dict = DictionaryValue::identifiable(entries);
    let id = *dict.ids.as_ref().unwrap().values().next().unwrap();
    let base_item =
        AssetItem::new(ObjectValue::new("Table").with_member("entries", Value::Dictionary(dict)));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    container
        .mutate(base_id, |graph| {
            let entries = member_target(graph, "entries");
            graph.move_key(entries, &Scalar::from("k1"), &Scalar::from("k2"))
        })
        .unwrap();

    let derived = container.lookup(derived_id).unwrap();
    let entries = member_target(derived, "entries");
    assert_eq!(
        derived.nodes().item_id_at(entries, &Index::Key(Scalar::from("k2"))),
        Some(id)
    );
    assert_eq!(
        derived.nodes().item_id_at(entries, &Index::Key(Scalar::from("k1"))),
        None
    );
    // Key override stays inherited after a base-driven move.
    assert!(!derived.overrides().key_overridden(entries, id));
}

#[test]
fn s6_object_references_resolve_to_derived_counterparts() {
    let mut container = GraphContainer::new();
    let part = ObjectValue::new("Part").with_member("mass", 1i64);
    let part2 = ObjectValue::new("Part").with_member("mass", 2i64);
    let part_id = part.id;
    let part2_id = part2.id;
    let base_item = AssetItem::new(
        ObjectValue::new("Entity")
            .with_member("part", Value::Object(part))
            .with_member("part2", Value::Object(part2))
            .with_member("favorite", Value::ObjectRef(part_id)),
    );
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    // Base repoints the reference at the second part.
    update_member(&mut container, base_id, "favorite", Value::ObjectRef(part2_id));

    let derived = container.lookup(derived_id).unwrap();
    let derived_part2 = derived.resolve_base_to_derived(part2_id).unwrap();
    assert_ne!(derived_part2, part2_id);
    assert_eq!(
        member_value(derived, "favorite"),
        Value::ObjectRef(derived_part2)
    );
    // The reference points at an object the derived graph actually owns.
    assert!(derived.nodes().object_node(derived_part2).is_some());
}

#[test]
fn ordering_law_plain_subsequence() {
    let mut container = GraphContainer::new();
    let (list, ids) = identifiable_list(&[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)]);
    let base_item = AssetItem::new(ObjectValue::new("Inventory").with_member("slots", list));
    let base_id = container.create_graph(&base_item).unwrap();

    // Derived holds only [B, D], by the same item ids.
    let derived_root = ObjectValue::new("Inventory").with_member(
        "slots",
        Value::Collection(CollectionValue::with_ids(
            vec![list_item("b", 2), list_item("d", 4)],
            vec![ids[1], ids[3]],
        )),
    );
    let mut derived_item = AssetItem::new(derived_root);
    derived_item.base = Some(base_item.id);
    let derived_id = container.create_graph(&derived_item).unwrap();

    container.reconcile(derived_id).unwrap();

    let derived = container.lookup(derived_id).unwrap();
    let slots = member_target(derived, "slots");
    assert_eq!(derived.nodes().live_ids(slots), ids);
    let _ = base_id;
}

#[test]
fn ordering_law_local_insert_stays_attached() {
    let mut container = GraphContainer::new();
    let (list, ids) = identifiable_list(&[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)]);
    let base_item = AssetItem::new(ObjectValue::new("Inventory").with_member("slots", list));
    container.create_graph(&base_item).unwrap();

    let derived_root = ObjectValue::new("Inventory").with_member(
        "slots",
        Value::Collection(CollectionValue::with_ids(
            vec![list_item("b", 2), list_item("d", 4)],
            vec![ids[1], ids[3]],
        )),
    );
    let mut derived_item = AssetItem::new(derived_root);
    derived_item.base = Some(base_item.id);
    let derived_id = container.create_graph(&derived_item).unwrap();

    // Local insert X between B and D; the add stamps its item override.
    let x_id = container
        .mutate(derived_id, |graph| {
            let slots = member_target(graph, "slots");
            graph.add(slots, &Index::Seq(1), list_item("x", 99))
        })
        .unwrap();

    container.reconcile(derived_id).unwrap();

    let derived = container.lookup(derived_id).unwrap();
    let slots = member_target(derived, "slots");
    assert_eq!(
        derived.nodes().live_ids(slots),
        vec![ids[0], ids[1], x_id, ids[2], ids[3], ids[4]]
    );
    assert!(derived.overrides().item_overridden(slots, x_id));
}

#[test]
fn item_update_follows_base_unless_overridden() {
    let mut container = GraphContainer::new();
    let (list, ids) = identifiable_list(&[("a", 1), ("b", 2)]);
    let base_item = AssetItem::new(ObjectValue::new("Inventory").with_member("slots", list));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    // Override item `a` locally.
    container
        .mutate(derived_id, |graph| {
            let slots = member_target(graph, "slots");
            let index = graph.nodes().index_of_item(slots, ids[0]).unwrap();
            graph.update(slots, &index, list_item("a-local", 10))
        })
        .unwrap();

    // Base rewrites both items.
    container
        .mutate(base_id, |graph| {
            let slots = member_target(graph, "slots");
            let a = graph.nodes().index_of_item(slots, ids[0]).unwrap();
            graph.update(slots, &a, list_item("a-base", 11))?;
            let b = graph.nodes().index_of_item(slots, ids[1]).unwrap();
            graph.update(slots, &b, list_item("b-base", 22))
        })
        .unwrap();

    let derived = container.lookup(derived_id).unwrap();
    let slots = member_target(derived, "slots");
    let a_index = derived.nodes().index_of_item(slots, ids[0]).unwrap();
    let b_index = derived.nodes().index_of_item(slots, ids[1]).unwrap();
    let a_node = derived.nodes().indexed_target(slots, &a_index).unwrap();
    let a_label = derived.nodes().child(a_node, "label").unwrap();
    assert_eq!(
        derived.retrieve(a_label, &Index::Empty),
        Some(Value::from("a-local"))
    );
    let b_node = derived.nodes().indexed_target(slots, &b_index).unwrap();
    let b_label = derived.nodes().child(b_node, "label").unwrap();
    assert_eq!(
        derived.retrieve(b_label, &Index::Empty),
        Some(Value::from("b-base"))
    );
}

#[test]
fn reconciliation_is_idempotent() {
    let mut container = GraphContainer::new();
    let (list, _ids) = identifiable_list(&[("a", 1), ("b", 2), ("c", 3)]);
    let base_item = AssetItem::new(
        ObjectValue::new("Inventory")
            .with_member("slots", list)
            .with_member("name", "base"),
    );
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    update_member(&mut container, base_id, "name", Value::from("renamed"));

    // Drain, then reconcile again: no further mutations may be recorded.
    container
        .lookup_mut(derived_id)
        .unwrap()
        .take_events();
    container.reconcile(derived_id).unwrap();
    let events = container.lookup_mut(derived_id).unwrap().take_events();
    assert!(
        events.iter().all(|event| !event.is_mutation()),
        "second reconcile mutated: {events:?}"
    );
}

#[test]
fn events_pair_pre_and_post_in_order() {
    let mut container = GraphContainer::new();
    let base_item = AssetItem::new(ObjectValue::new("Material").with_member("color", "red"));
    let base_id = container.create_graph(&base_item).unwrap();

    container
        .mutate(base_id, |graph| {
            let color = member(graph, "color");
            graph.update(color, &Index::Empty, Value::from("green"))
        })
        .unwrap();

    let events = container.lookup_mut(base_id).unwrap().take_events();
    let [GraphEvent::Changing { old, .. }, GraphEvent::Changed {
        old: old_after,
        new,
        prev_override,
        new_override,
        ..
    }] = events.as_slice()
    else {
        panic!("expected a Changing/Changed pair, got {events:?}");
    };
    assert_eq!(old, &Value::from("red"));
    assert_eq!(old_after, &Value::from("red"));
    assert_eq!(new, &Value::from("green"));
    assert_eq!(*prev_override, OverrideKind::Base);
    assert_eq!(*new_override, OverrideKind::New);
}

#[test]
fn base_content_changed_is_reported_to_derivatives() {
    let mut container = GraphContainer::new();
    let base_item = AssetItem::new(ObjectValue::new("Material").with_member("color", "red"));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    update_member(&mut container, base_id, "color", Value::from("green"));

    let events = container.lookup_mut(derived_id).unwrap().take_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, GraphEvent::BaseContentChanged { base } if *base == base_id)));
}

#[test]
fn reset_override_returns_to_base_content() {
    let mut container = GraphContainer::new();
    let base_item = AssetItem::new(ObjectValue::new("Material").with_member("color", "red"));
    let derived_item = derive_item(&base_item);
    container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    update_member(&mut container, derived_id, "color", Value::from("blue"));
    let derived = container.lookup(derived_id).unwrap();
    let color = member(derived, "color");
    assert_eq!(derived.overrides().content(color), OverrideKind::New);

    container
        .reset_override(derived_id, color, &Index::Empty)
        .unwrap();
    let derived = container.lookup(derived_id).unwrap();
    assert_eq!(derived.overrides().content(color), OverrideKind::Base);
    assert_eq!(member_value(derived, "color"), Value::from("red"));
}

/// Rejects every insert the reconciler proposes.
struct RejectInserts;

impl strata::GraphPolicy for RejectInserts {
    fn can_update(
        &self,
        _graph: &strata::NodeGraph,
        _node: NodeId,
        change: strata::ChangeKind,
        _index: &Index,
        _value: &Value,
    ) -> bool {
        !matches!(change, strata::ChangeKind::CollectionAdd)
    }
}

#[test]
fn vetoed_base_additions_are_recorded_as_deleted() {
    let mut container = GraphContainer::with_policy(Box::new(RejectInserts));
    let (list, ids) = identifiable_list(&[("a", 1)]);
    let base_item = AssetItem::new(ObjectValue::new("Inventory").with_member("slots", list));
    let derived_item = derive_item(&base_item);
    let base_id = container.create_graph(&base_item).unwrap();
    let derived_id = container.create_graph(&derived_item).unwrap();

    let b_id = container
        .mutate(base_id, |graph| {
            let slots = member_target(graph, "slots");
            graph.add(slots, &Index::Seq(1), list_item("b", 2))
        })
        .unwrap();

    let derived = container.lookup(derived_id).unwrap();
    let slots = member_target(derived, "slots");
    assert_eq!(derived.nodes().live_ids(slots), vec![ids[0]]);
    assert!(derived.overrides().is_deleted(slots, b_id));
    derived.check_invariants().unwrap();
}

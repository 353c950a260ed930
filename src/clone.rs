//! Layer 6: Deep clone with identifier remapping
//!
//! Every identifiable object in the cloned subtree gets a fresh id and the
//! old→new mapping is returned; object references that point inside the
//! subtree are rewritten through it, references escaping the subtree are
//! left as-is. Item ids are preserved: base and derived entries must keep
//! matching by id across clones.

use std::collections::BTreeMap;

use crate::ident::ObjectId;
use crate::value::{CollectionValue, DictionaryValue, MemberValue, ObjectValue, Value};

#[derive(Clone, Debug)]
pub struct CloneOutcome {
    pub value: Value,
    /// old id → fresh id, one entry per identifiable object in the subtree.
    pub remapped: BTreeMap<ObjectId, ObjectId>,
}

/// Deep-clone `value` with fresh identifiable-object ids.
pub fn clone_with_remap(value: &Value) -> CloneOutcome {
    let mut remapped = BTreeMap::new();
    collect_identifiable(value, &mut remapped);
    let value = rewrite(value, &remapped);
    CloneOutcome { value, remapped }
}

fn collect_identifiable(value: &Value, remapped: &mut BTreeMap<ObjectId, ObjectId>) {
    match value {
        Value::Object(obj) => {
            if obj.identifiable {
                remapped.insert(obj.id, ObjectId::fresh());
            }
            for member in obj.members.values() {
                collect_identifiable(&member.value, remapped);
            }
        }
        Value::Collection(col) => {
            for item in &col.items {
                collect_identifiable(item, remapped);
            }
        }
        Value::Dictionary(dict) => {
            for entry in dict.entries.values() {
                collect_identifiable(entry, remapped);
            }
        }
        Value::Scalar(_) | Value::Content(_) | Value::ObjectRef(_) => {}
    }
}

fn rewrite(value: &Value, remapped: &BTreeMap<ObjectId, ObjectId>) -> Value {
    match value {
        Value::Scalar(s) => Value::Scalar(s.clone()),
        Value::Content(c) => Value::Content(c.clone()),
        Value::ObjectRef(o) => Value::ObjectRef(remapped.get(o).copied().unwrap_or(*o)),
        Value::Object(obj) => {
            let members = obj
                .members
                .iter()
                .map(|(name, member)| {
                    (
                        name.clone(),
                        MemberValue {
                            value: rewrite(&member.value, remapped),
                            can_override: member.can_override,
                        },
                    )
                })
                .collect();
            Value::Object(ObjectValue {
                id: remapped.get(&obj.id).copied().unwrap_or(obj.id),
                type_name: obj.type_name.clone(),
                identifiable: obj.identifiable,
                members,
            })
        }
        Value::Collection(col) => Value::Collection(CollectionValue {
            items: col.items.iter().map(|item| rewrite(item, remapped)).collect(),
            ids: col.ids.clone(),
        }),
        Value::Dictionary(dict) => Value::Dictionary(DictionaryValue {
            entries: dict
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), rewrite(entry, remapped)))
                .collect(),
            ids: dict.ids.clone(),
        }),
    }
}

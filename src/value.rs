//! Layer 1: Document value tree
//!
//! The loaded form of an asset: objects with named members, collections,
//! dictionaries, scalar leaves, and two pointer shapes (content refs to
//! other assets, object refs within this asset).
//!
//! Cycles arise only through `ObjectRef`; the structural tree is acyclic
//! by construction.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::ident::{AssetId, ItemId, ObjectId};

/// Primitive leaf; also the dictionary key type.
///
/// Ordering is total: variants rank `Bool < I64 < F64 < Str`, floats
/// compare by `total_cmp`. Equality follows the same total order, so
/// scalars are usable as `BTreeMap` keys.
#[derive(Clone, Debug, Deserialize)]
pub enum Scalar {
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl Scalar {
    fn rank(&self) -> u8 {
        match self {
            Scalar::Bool(_) => 0,
            Scalar::I64(_) => 1,
            Scalar::F64(_) => 2,
            Scalar::Str(_) => 3,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::I64(a), Scalar::I64(b)) => a.cmp(b),
            (Scalar::F64(a), Scalar::F64(b)) => a.total_cmp(b),
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::Str(v) => write!(f, "{v}"),
        }
    }
}

// Hand-written to refuse non-finite floats at encode time; the canonical
// metadata digest depends on every scalar having one byte representation.
impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Bool(v) => serializer.serialize_newtype_variant("Scalar", 0, "Bool", v),
            Scalar::I64(v) => serializer.serialize_newtype_variant("Scalar", 1, "I64", v),
            Scalar::F64(v) => {
                if !v.is_finite() {
                    return Err(serde::ser::Error::custom(
                        "non-finite float values are not allowed",
                    ));
                }
                serializer.serialize_newtype_variant("Scalar", 2, "F64", v)
            }
            Scalar::Str(v) => serializer.serialize_newtype_variant("Scalar", 3, "Str", v),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

/// Opaque handle to another asset, carried by value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub id: AssetId,
    pub url: String,
}

impl ContentRef {
    pub fn new(id: AssetId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
        }
    }
}

/// One value in the asset tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(Scalar),
    /// Handle to another asset (`(id, url)` pair).
    Content(ContentRef),
    /// Pointer-by-id to an identifiable object inside the same asset.
    ObjectRef(ObjectId),
    /// Structural child object (owning).
    Object(ObjectValue),
    Collection(CollectionValue),
    Dictionary(DictionaryValue),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Content(_) => "content-ref",
            Value::ObjectRef(_) => "object-ref",
            Value::Object(_) => "object",
            Value::Collection(_) => "collection",
            Value::Dictionary(_) => "dictionary",
        }
    }
}

impl<T: Into<Scalar>> From<T> for Value {
    fn from(v: T) -> Self {
        Value::Scalar(v.into())
    }
}

/// A named field of an object, with its override capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberValue {
    pub value: Value,
    #[serde(default = "default_true")]
    pub can_override: bool,
}

fn default_true() -> bool {
    true
}

impl MemberValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            can_override: true,
        }
    }

    pub fn locked(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            can_override: false,
        }
    }
}

/// A structural object: named members, optional type tag, optional identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectValue {
    pub id: ObjectId,
    pub type_name: Option<String>,
    pub identifiable: bool,
    pub members: BTreeMap<String, MemberValue>,
}

impl ObjectValue {
    /// An identifiable object with a fresh id.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::fresh(),
            type_name: Some(type_name.into()),
            identifiable: true,
            members: BTreeMap::new(),
        }
    }

    /// A plain structural value without addressable identity.
    pub fn inline(type_name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::fresh(),
            type_name: Some(type_name.into()),
            identifiable: false,
            members: BTreeMap::new(),
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(name.into(), MemberValue::new(value));
        self
    }

    pub fn with_locked_member(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(name.into(), MemberValue::locked(value));
        self
    }
}

/// Ordered sequence of items. Identifiable iff `ids` is present; then
/// `ids` parallels `items` index by index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionValue {
    pub items: Vec<Value>,
    pub ids: Option<Vec<ItemId>>,
}

impl CollectionValue {
    pub fn plain(items: Vec<Value>) -> Self {
        Self { items, ids: None }
    }

    /// Identifiable collection with fresh ids.
    pub fn identifiable(items: Vec<Value>) -> Self {
        let ids = items.iter().map(|_| ItemId::fresh()).collect();
        Self {
            items,
            ids: Some(ids),
        }
    }

    /// Identifiable collection with caller-chosen ids. `ids` must parallel
    /// `items`.
    pub fn with_ids(items: Vec<Value>, ids: Vec<ItemId>) -> Self {
        debug_assert_eq!(items.len(), ids.len());
        Self {
            items,
            ids: Some(ids),
        }
    }

    pub fn is_identifiable(&self) -> bool {
        self.ids.is_some()
    }
}

/// Unordered key-value mapping. Identifiable iff `ids` is present; each
/// entry then carries an id independent of its key.
///
/// Serialized as entry lists: JSON maps require string keys, dictionary
/// keys are arbitrary scalars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "DictionaryValueWire", into = "DictionaryValueWire")]
pub struct DictionaryValue {
    pub entries: BTreeMap<Scalar, Value>,
    pub ids: Option<BTreeMap<Scalar, ItemId>>,
}

#[derive(Serialize, Deserialize)]
struct DictionaryValueWire {
    entries: Vec<(Scalar, Value)>,
    ids: Option<Vec<(Scalar, ItemId)>>,
}

impl From<DictionaryValue> for DictionaryValueWire {
    fn from(dict: DictionaryValue) -> Self {
        Self {
            entries: dict.entries.into_iter().collect(),
            ids: dict.ids.map(|ids| ids.into_iter().collect()),
        }
    }
}

impl From<DictionaryValueWire> for DictionaryValue {
    fn from(wire: DictionaryValueWire) -> Self {
        Self {
            entries: wire.entries.into_iter().collect(),
            ids: wire.ids.map(|ids| ids.into_iter().collect()),
        }
    }
}

impl DictionaryValue {
    pub fn plain(entries: BTreeMap<Scalar, Value>) -> Self {
        Self { entries, ids: None }
    }

    pub fn identifiable(entries: BTreeMap<Scalar, Value>) -> Self {
        let ids = entries.keys().map(|k| (k.clone(), ItemId::fresh())).collect();
        Self {
            entries,
            ids: Some(ids),
        }
    }

    pub fn is_identifiable(&self) -> bool {
        self.ids.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_order_is_total_across_kinds() {
        let mut keys = vec![
            Scalar::from("b"),
            Scalar::from(2i64),
            Scalar::from(true),
            Scalar::from(1.5f64),
            Scalar::from("a"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Scalar::from(true),
                Scalar::from(2i64),
                Scalar::from(1.5f64),
                Scalar::from("a"),
                Scalar::from("b"),
            ]
        );
    }

    #[test]
    fn scalar_nan_equals_itself_under_total_order() {
        let a = Scalar::F64(f64::NAN);
        let b = Scalar::F64(f64::NAN);
        assert_eq!(a, b);
    }

    #[test]
    fn scalar_serialization_rejects_non_finite() {
        assert!(serde_json::to_string(&Scalar::F64(f64::NAN)).is_err());
        assert!(serde_json::to_string(&Scalar::F64(f64::INFINITY)).is_err());
        assert!(serde_json::to_string(&Scalar::F64(1.25)).is_ok());
    }

    #[test]
    fn identifiable_collection_parallels_ids() {
        let c = CollectionValue::identifiable(vec![Value::from(1i64), Value::from(2i64)]);
        assert_eq!(c.ids.as_ref().unwrap().len(), c.items.len());
        assert!(c.is_identifiable());
        assert!(!CollectionValue::plain(vec![]).is_identifiable());
    }

    #[test]
    fn dictionary_value_roundtrips_json() {
        let mut entries = BTreeMap::new();
        entries.insert(Scalar::from("k1"), Value::from(1i64));
        entries.insert(Scalar::from(4i64), Value::from("x"));
        let dict = DictionaryValue::identifiable(entries);
        let json = serde_json::to_string(&dict).unwrap();
        let back: DictionaryValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dict);
    }

    #[test]
    fn object_builder_sets_identity() {
        let obj = ObjectValue::new("Entity").with_member("name", "root");
        assert!(obj.identifiable);
        let inline = ObjectValue::inline("Transform");
        assert!(!inline.identifiable);
    }
}

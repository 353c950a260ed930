//! Layer 0: Identity atoms
//!
//! ItemId: stable identity of an entry in an identifiable collection/dictionary
//! ObjectId: identity of an identifiable object within one asset
//! AssetId: identity of an asset document
//! NodeId: per-graph arena handle, never reused

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, InvalidId};

fn parse_uuid_id(
    s: &str,
    mk: impl FnOnce(String, String) -> InvalidId,
) -> Result<Uuid, GraphError> {
    Uuid::parse_str(s.trim()).map_err(|err| mk(s.to_string(), err.to_string()).into())
}

/// Stable identity of an entry inside an identifiable collection or
/// dictionary, independent of index or key.
///
/// Within one identifiable node, distinct live entries carry distinct
/// non-empty ids. Base and derived assets share item ids; reconciliation
/// matches entries by id, never by position.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(Uuid);

impl ItemId {
    /// Sentinel for "no id". Never a valid live entry id.
    pub const EMPTY: ItemId = ItemId(Uuid::nil());

    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, GraphError> {
        parse_uuid_id(s, |raw, reason| InvalidId::Item { raw, reason }).map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ItemId {
    type Error = GraphError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ItemId::parse_str(&s)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> String {
        id.0.to_string()
    }
}

impl From<Uuid> for ItemId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identity of an identifiable object inside one asset.
///
/// Object references are id lookups through the graph's object index,
/// never owning pointers; structural parent links own their subtrees.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, GraphError> {
        parse_uuid_id(s, |raw, reason| InvalidId::Object { raw, reason }).map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = GraphError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ObjectId::parse_str(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> String {
        id.0.to_string()
    }
}

impl From<Uuid> for ObjectId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identity of an asset document; key of the container map.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(Uuid);

impl AssetId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, GraphError> {
        parse_uuid_id(s, |raw, reason| InvalidId::Asset { raw, reason }).map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AssetId {
    type Error = GraphError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        AssetId::parse_str(&s)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> String {
        id.0.to_string()
    }
}

impl From<Uuid> for AssetId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Arena handle for a node inside one graph. Handles are never reused and
/// are meaningless across graphs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

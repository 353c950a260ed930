//! Layer 9: Override and object-reference metadata
//!
//! The serializer boundary: two path-keyed blobs attached to the asset
//! document's metadata side-channel. Paths ending on an index/item step
//! apply to an item or key; paths ending on a member step apply to content.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::canon::{sha256_bytes, to_canon_json_bytes};
use crate::error::GraphError;
use crate::ident::{AssetId, ItemId, ObjectId};
use crate::overrides::OverrideKind;
use crate::path::NodePath;
use crate::value::ObjectValue;

/// Key of this crate's blob inside an asset item's metadata side-channel.
pub const METADATA_KEY: &str = "property-overrides";

/// Format version for the metadata blob. Current version is 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatVersion(u32);

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion(1);

    pub fn new(v: u32) -> Self {
        Self(v)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_compatible(&self) -> bool {
        self.0 == Self::CURRENT.0
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// What a non-`Base` override applies to at the resolved path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OverrideScope {
    /// Member content (paths ending on a member step).
    #[default]
    Content,
    /// An entry of an identifiable collection or dictionary.
    Item,
    /// A dictionary entry's key.
    Key,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub path: NodePath,
    pub state: OverrideKind,
    #[serde(default)]
    pub scope: OverrideScope,
}

/// Alias used by the override snapshot/restore API
/// (`clear_all_overrides` / `restore_overrides`).
pub type NodeOverride = OverrideEntry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReferenceEntry {
    pub path: NodePath,
    pub id: ObjectId,
}

/// Ids once inherited from a base and explicitly removed in the
/// derivative, per identifiable collection/dictionary. Persisted so
/// overriding deletions survive reload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItemsEntry {
    pub path: NodePath,
    pub ids: BTreeSet<ItemId>,
}

/// The persistent side-channel blob.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default)]
    pub format_version: FormatVersion,
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
    #[serde(default)]
    pub object_references: Vec<ObjectReferenceEntry>,
    #[serde(default)]
    pub deleted_items: Vec<DeletedItemsEntry>,
}

impl AssetMetadata {
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
            && self.object_references.is_empty()
            && self.deleted_items.is_empty()
    }

    /// Canonical digest of the blob; stable across key insertion order.
    pub fn digest(&self) -> Result<[u8; 32], GraphError> {
        let bytes =
            to_canon_json_bytes(self).map_err(|err| GraphError::Encode(err.to_string()))?;
        Ok(sha256_bytes(&bytes))
    }
}

/// An asset document plus its metadata side-channel, as exchanged with the
/// file-level asset manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetItem {
    pub id: AssetId,
    pub root: ObjectValue,
    /// The asset this one derives from, if any.
    #[serde(default)]
    pub base: Option<AssetId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AssetItem {
    pub fn new(root: ObjectValue) -> Self {
        Self {
            id: AssetId::fresh(),
            root,
            base: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(id: AssetId, root: ObjectValue) -> Self {
        Self {
            id,
            root,
            base: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Parse this item's blob, if present. Incompatible versions are an
    /// error, an absent blob is `None`.
    pub fn metadata_blob(&self) -> Result<Option<AssetMetadata>, GraphError> {
        let Some(raw) = self.metadata.get(METADATA_KEY) else {
            return Ok(None);
        };
        let blob: AssetMetadata = serde_json::from_value(raw.clone())?;
        if !blob.format_version.is_compatible() {
            return Err(GraphError::UnsupportedVersion(blob.format_version.get()));
        }
        Ok(Some(blob))
    }

    pub fn attach_metadata(&mut self, blob: &AssetMetadata) -> Result<(), GraphError> {
        self.metadata
            .insert(METADATA_KEY.to_string(), serde_json::to_value(blob)?);
        Ok(())
    }
}

//! Base-derived asset property graphs with override reconciliation.
//!
//! Module hierarchy follows type dependency order:
//! - ident: ItemId, ObjectId, AssetId, NodeId (Layer 0)
//! - value: document value tree (Layer 1)
//! - path: Index, PathStep, NodePath (Layer 2)
//! - node: node arena, navigation, mutation, path resolution (Layer 3)
//! - overrides: override store (Layer 4)
//! - event: change journal (Layer 5)
//! - clone: deep clone with identifier remapping (Layer 6)
//! - link: base linker and base→derived registry (Layer 7)
//! - reconcile: the reconciliation algorithm (Layer 8)
//! - metadata: override/object-reference blobs (Layer 9)
//! - graph: AssetPropertyGraph (Layer 10)
//! - container: GraphContainer (Layer 11)

#![forbid(unsafe_code)]

pub mod canon;
pub mod clone;
pub mod container;
pub mod error;
pub mod event;
pub mod graph;
pub mod ident;
pub mod link;
pub mod metadata;
pub mod node;
pub mod overrides;
pub mod path;
pub mod policy;
pub mod reconcile;
pub mod value;

pub use canon::{sha256_bytes, to_canon_json_bytes, CanonJsonError};
pub use clone::{clone_with_remap, CloneOutcome};
pub use container::GraphContainer;
pub use error::{GraphError, InvalidId, KindMismatch};
pub use event::{ChangeKind, GraphEvent};
pub use graph::AssetPropertyGraph;
pub use ident::{AssetId, ItemId, NodeId, ObjectId};
pub use link::link_to_base;
pub use metadata::{
    AssetItem, AssetMetadata, DeletedItemsEntry, FormatVersion, NodeOverride,
    ObjectReferenceEntry, OverrideEntry, OverrideScope, METADATA_KEY,
};
pub use node::{
    CollectionNode, Detached, DictionaryNode, MemberNode, Node, NodeGraph, NodeKind, ObjectNode,
    Resolved, Slot,
};
pub use overrides::{OverrideKind, OverrideStore};
pub use path::{Index, NodePath, PathStep};
pub use policy::{DefaultPolicy, GraphPolicy};
pub use reconcile::reconcile_with_base;
pub use value::{
    CollectionValue, ContentRef, DictionaryValue, MemberValue, ObjectValue, Scalar, Value,
};

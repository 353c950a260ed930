//! Graph capability errors (id parsing, path resolution, shape violations).
//!
//! These are bounded and stable: resolution failures are recovered locally
//! by callers (skip and continue), shape mismatches are surfaced.

use thiserror::Error;

use crate::ident::{AssetId, NodeId};
use crate::path::NodePath;

/// Invalid ID string.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("item id `{raw}` is invalid: {reason}")]
    Item { raw: String, reason: String },
    #[error("object id `{raw}` is invalid: {reason}")]
    Object { raw: String, reason: String },
    #[error("asset id `{raw}` is invalid: {reason}")]
    Asset { raw: String, reason: String },
}

/// A path step expected one node kind but found another.
///
/// Indicates document corruption; callers abort the operation.
#[derive(Debug, Error, Clone)]
#[error("path `{path}` step {step}: expected {expected}, found {found}")]
pub struct KindMismatch {
    pub path: NodePath,
    pub step: usize,
    pub expected: &'static str,
    pub found: &'static str,
}

/// Canonical error enum for the graph capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum GraphError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    KindMismatch(#[from] KindMismatch),
    #[error("asset {0} is not owned by this container")]
    UnknownAsset(AssetId),
    #[error("node {0} is not part of this graph")]
    UnknownNode(NodeId),
    #[error("index out of range for node {node}")]
    OutOfRange { node: NodeId },
    #[error("dictionary {node} already contains the key")]
    DuplicateKey { node: NodeId },
    #[error("identifiable node {node} carries an empty item id")]
    CorruptedIdMap { node: NodeId },
    #[error("invariant violated at node {node}: {reason}")]
    InvariantViolation { node: NodeId, reason: &'static str },
    #[error("metadata format version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("metadata encode failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Encode(err.to_string())
    }
}

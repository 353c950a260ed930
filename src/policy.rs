//! Extension points for asset-specific graph behavior.
//!
//! Composite assets override these to redirect sub-trees to their own base
//! roots and to refuse inserts that make no sense for the asset type.

use crate::event::ChangeKind;
use crate::ident::{NodeId, ObjectId};
use crate::node::NodeGraph;
use crate::path::Index;
use crate::value::Value;

/// Asset-specific rules consulted during linking and reconciliation.
pub trait GraphPolicy {
    /// Decide whether an identifiable value sitting at `(node, index)` is
    /// a pointer to an object rather than structural containment.
    fn is_object_reference(
        &self,
        _graph: &NodeGraph,
        _node: NodeId,
        _index: &Index,
        _value: &Value,
    ) -> bool {
        false
    }

    /// Redirect a derived sub-tree to a different base object. Called at
    /// every object boundary during linking; identity by default.
    fn find_target(&self, _source: ObjectId, candidate: ObjectId) -> ObjectId {
        candidate
    }

    /// Veto an update the reconciler wants to perform. A refused insert
    /// marks the item id as deleted instead of adding it.
    fn can_update(
        &self,
        _graph: &NodeGraph,
        _node: NodeId,
        _change: ChangeKind,
        _index: &Index,
        _value: &Value,
    ) -> bool {
        true
    }

    /// Whether `target` is a referenced part of `member`'s owner rather
    /// than owned content. Composite-asset helper.
    fn is_referenced_part(&self, _member: NodeId, _target: NodeId) -> bool {
        false
    }
}

/// Default rules: nothing is a pointer, no redirects, no vetoes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPolicy;

impl GraphPolicy for DefaultPolicy {}

//! Layer 5: Change journal
//!
//! Every mutation on a graph appends paired pre/post records in program
//! order: `Changing` strictly before `Changed`, `ItemChanging` strictly
//! before `ItemChanged`. Nested mutations record depth-first.
//!
//! `new_override` is `New` for local edits and `Base` for mutations made
//! on behalf of the base (reconciliation passes and override resets).

use crate::ident::{AssetId, ItemId, NodeId};
use crate::overrides::OverrideKind;
use crate::path::Index;
use crate::value::Value;

/// What happened to an indexed node's entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    CollectionAdd,
    CollectionRemove,
    CollectionUpdate,
}

/// One journal record.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    /// A member value is about to change.
    Changing { node: NodeId, old: Value },
    /// A member value changed.
    Changed {
        node: NodeId,
        old: Value,
        new: Value,
        prev_override: OverrideKind,
        new_override: OverrideKind,
    },
    /// An indexed entry is about to change.
    ItemChanging {
        node: NodeId,
        change: ChangeKind,
        index: Index,
        old: Option<Value>,
    },
    /// An indexed entry changed.
    ItemChanged {
        node: NodeId,
        change: ChangeKind,
        index: Index,
        new: Option<Value>,
        prev_override: OverrideKind,
        new_override: OverrideKind,
        item_id: ItemId,
    },
    /// A base-driven reconciliation pass finished for this graph.
    BaseContentChanged { base: AssetId },
}

impl GraphEvent {
    /// Whether this record describes an applied mutation (post events only;
    /// pre events are announcements).
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            GraphEvent::Changed { .. } | GraphEvent::ItemChanged { .. }
        )
    }
}

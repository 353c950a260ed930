//! Layer 11: Graph container
//!
//! Owns the set of per-asset graphs and the only cross-graph edges in the
//! system: the base-subscription index. Base-driven propagation runs here,
//! gated by `propagate_changes_from_base`, and never re-enters itself (a
//! reconciliation pass records its mutations under `updating_from_base`,
//! so propagation consumes them without treating them as local edits).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use crate::error::GraphError;
use crate::event::GraphEvent;
use crate::graph::AssetPropertyGraph;
use crate::ident::{AssetId, NodeId};
use crate::link::link_to_base;
use crate::metadata::AssetItem;
use crate::path::Index;
use crate::policy::{DefaultPolicy, GraphPolicy};
use crate::reconcile::reconcile_with_base;

/// Owns every asset property graph by asset identity.
pub struct GraphContainer {
    graphs: BTreeMap<AssetId, AssetPropertyGraph>,
    /// base asset → derived assets subscribed to it.
    subscribers: BTreeMap<AssetId, BTreeSet<AssetId>>,
    /// Gate for base-driven reconciliation.
    pub propagate_changes_from_base: bool,
    policy: Box<dyn GraphPolicy>,
}

impl Default for GraphContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphContainer {
    pub fn new() -> Self {
        Self::with_policy(Box::new(DefaultPolicy))
    }

    pub fn with_policy(policy: Box<dyn GraphPolicy>) -> Self {
        Self {
            graphs: BTreeMap::new(),
            subscribers: BTreeMap::new(),
            propagate_changes_from_base: true,
            policy,
        }
    }

    /// Build and register a graph for a loaded asset item. If the item
    /// names a base that is present, the new graph links to it; graphs
    /// already waiting on this asset as their base link up as well.
    pub fn create_graph(&mut self, item: &AssetItem) -> Result<AssetId, GraphError> {
        let mut graph = AssetPropertyGraph::build(item)?;
        let id = graph.asset();
        if let Some(base_id) = graph.base() {
            self.subscribers.entry(base_id).or_default().insert(id);
            if let Some(base) = self.graphs.get(&base_id) {
                link_to_base(&mut graph, base, self.policy.as_ref());
            }
        }
        self.graphs.insert(id, graph);

        // Late-arriving base: wire up derivatives loaded before it.
        let waiting: Vec<AssetId> = self
            .subscribers
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for derived_id in waiting {
            self.with_detached(derived_id, |derived, base, policy| {
                if let Some(base) = base {
                    link_to_base(derived, base, policy);
                }
            })?;
        }
        Ok(id)
    }

    pub fn lookup(&self, id: AssetId) -> Option<&AssetPropertyGraph> {
        self.graphs.get(&id)
    }

    /// Direct mutable access. Changes made through this accessor do not
    /// propagate to derivatives; use [`Self::mutate`] for that.
    pub fn lookup_mut(&mut self, id: AssetId) -> Option<&mut AssetPropertyGraph> {
        self.graphs.get_mut(&id)
    }

    pub fn assets(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.graphs.keys().copied()
    }

    /// Drop a graph. Derivatives keep their base asset id but lose their
    /// links: non-owning edges into the dropped graph must not survive it.
    pub fn remove(&mut self, id: AssetId) -> Option<AssetPropertyGraph> {
        let graph = self.graphs.remove(&id)?;
        if let Some(base_id) = graph.base() {
            if let Some(set) = self.subscribers.get_mut(&base_id) {
                set.remove(&id);
                if set.is_empty() {
                    self.subscribers.remove(&base_id);
                }
            }
        }
        if let Some(derivatives) = self.subscribers.get(&id).cloned() {
            for derived_id in derivatives {
                if let Some(derived) = self.graphs.get_mut(&derived_id) {
                    derived.clear_all_base_links();
                }
            }
        }
        Some(graph)
    }

    /// Rebind a derived graph to a new base (or none) and re-link. Does
    /// not reconcile; callers decide when content follows.
    pub fn refresh_base(
        &mut self,
        derived_id: AssetId,
        base_id: Option<AssetId>,
    ) -> Result<(), GraphError> {
        let graph = self
            .graphs
            .get_mut(&derived_id)
            .ok_or(GraphError::UnknownAsset(derived_id))?;
        if let Some(old_base) = graph.base() {
            if let Some(set) = self.subscribers.get_mut(&old_base) {
                set.remove(&derived_id);
                if set.is_empty() {
                    self.subscribers.remove(&old_base);
                }
            }
        }
        graph.clear_all_base_links();
        graph.set_base(base_id);
        if let Some(base_id) = base_id {
            self.subscribers
                .entry(base_id)
                .or_default()
                .insert(derived_id);
            self.with_detached(derived_id, |derived, base, policy| {
                if let Some(base) = base {
                    link_to_base(derived, base, policy);
                }
            })?;
        }
        Ok(())
    }

    /// Reconcile a derived graph with its base now. A graph without a
    /// base, or whose base is not loaded, is left untouched.
    pub fn reconcile(&mut self, derived_id: AssetId) -> Result<(), GraphError> {
        self.with_detached(derived_id, |derived, base, policy| match base {
            Some(base) => reconcile_with_base(derived, base, None, policy),
            None => Ok(()),
        })?
    }

    /// Run a mutation against one graph, then propagate to its transitive
    /// derivatives when the gate is open and the closure actually changed
    /// something.
    pub fn mutate<R>(
        &mut self,
        asset: AssetId,
        f: impl FnOnce(&mut AssetPropertyGraph) -> Result<R, GraphError>,
    ) -> Result<R, GraphError> {
        let graph = self
            .graphs
            .get_mut(&asset)
            .ok_or(GraphError::UnknownAsset(asset))?;
        let before = graph.events_len();
        let out = f(graph)?;
        let changed = graph.events_len() > before;
        if changed && self.propagate_changes_from_base {
            self.propagate_from(asset)?;
        }
        Ok(out)
    }

    /// Clear override bits on a node subtree and restore inherited
    /// content from the base.
    pub fn reset_override(
        &mut self,
        asset: AssetId,
        node: NodeId,
        index: &Index,
    ) -> Result<(), GraphError> {
        let graph = self
            .graphs
            .get_mut(&asset)
            .ok_or(GraphError::UnknownAsset(asset))?;
        graph.reset_override(node, index)?;
        self.with_detached(asset, |derived, base, policy| match base {
            Some(base) => reconcile_with_base(derived, base, Some(node), policy),
            None => Ok(()),
        })?
    }

    /// Breadth-first over the subscription closure of `base_id`: each
    /// derivative re-links, reconciles, and reports `BaseContentChanged`.
    fn propagate_from(&mut self, base_id: AssetId) -> Result<(), GraphError> {
        let mut queue: VecDeque<AssetId> = self
            .subscribers
            .get(&base_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let mut visited = BTreeSet::new();
        visited.insert(base_id);
        while let Some(derived_id) = queue.pop_front() {
            if !visited.insert(derived_id) {
                continue;
            }
            debug!(base = %base_id, derived = %derived_id, "propagating base change");
            self.reconcile(derived_id)?;
            if let Some(derived) = self.graphs.get_mut(&derived_id) {
                if let Some(its_base) = derived.base() {
                    derived.events.push(GraphEvent::BaseContentChanged { base: its_base });
                }
            }
            if let Some(next) = self.subscribers.get(&derived_id) {
                queue.extend(next.iter().copied());
            }
        }
        Ok(())
    }

    fn with_detached<R>(
        &mut self,
        id: AssetId,
        f: impl FnOnce(&mut AssetPropertyGraph, Option<&AssetPropertyGraph>, &dyn GraphPolicy) -> R,
    ) -> Result<R, GraphError> {
        let mut graph = self
            .graphs
            .remove(&id)
            .ok_or(GraphError::UnknownAsset(id))?;
        let base = graph.base().and_then(|base_id| self.graphs.get(&base_id));
        let out = f(&mut graph, base, self.policy.as_ref());
        self.graphs.insert(id, graph);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::clone_with_remap;
    use crate::value::{ObjectValue, Value};

    fn base_item() -> AssetItem {
        AssetItem::new(ObjectValue::new("Material").with_member("color", "red"))
    }

    fn derive(base: &AssetItem) -> AssetItem {
        let outcome = clone_with_remap(&Value::Object(base.root.clone()));
        let Value::Object(root) = outcome.value else {
            unreachable!("clone preserves kinds");
        };
        let mut item = AssetItem::new(root);
        item.base = Some(base.id);
        item
    }

    #[test]
    fn create_lookup_remove() {
        let mut container = GraphContainer::new();
        let item = base_item();
        let id = container.create_graph(&item).unwrap();
        assert!(container.lookup(id).is_some());
        assert!(container.remove(id).is_some());
        assert!(container.lookup(id).is_none());
    }

    #[test]
    fn derived_links_even_when_base_loads_later() {
        let mut container = GraphContainer::new();
        let base = base_item();
        let derived = derive(&base);
        let derived_id = container.create_graph(&derived).unwrap();
        assert!(container
            .lookup(derived_id)
            .unwrap()
            .base_link(container.lookup(derived_id).unwrap().root())
            .is_none());

        let base_id = container.create_graph(&base).unwrap();
        let graph = container.lookup(derived_id).unwrap();
        assert_eq!(
            graph.base_link(graph.root()),
            Some(container.lookup(base_id).unwrap().root())
        );
    }

    #[test]
    fn removing_base_clears_derived_links() {
        let mut container = GraphContainer::new();
        let base = base_item();
        let derived = derive(&base);
        let base_id = container.create_graph(&base).unwrap();
        let derived_id = container.create_graph(&derived).unwrap();

        container.remove(base_id);
        let graph = container.lookup(derived_id).unwrap();
        assert_eq!(graph.base_link(graph.root()), None);
        assert_eq!(graph.base(), Some(base_id));
    }

    #[test]
    fn refresh_base_rebinds_and_unsubscribes() {
        let mut container = GraphContainer::new();
        let base = base_item();
        let derived = derive(&base);
        let base_id = container.create_graph(&base).unwrap();
        let derived_id = container.create_graph(&derived).unwrap();

        container.refresh_base(derived_id, None).unwrap();
        let graph = container.lookup(derived_id).unwrap();
        assert_eq!(graph.base(), None);
        assert_eq!(graph.base_link(graph.root()), None);

        // No longer a subscriber: base edits stop reaching it.
        container
            .mutate(base_id, |graph| {
                let color = graph.nodes().child(graph.root(), "color").unwrap();
                graph.update(color, &Index::Empty, Value::from("green"))
            })
            .unwrap();
        let graph = container.lookup(derived_id).unwrap();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        assert_eq!(graph.retrieve(color, &Index::Empty), Some(Value::from("red")));

        container.refresh_base(derived_id, Some(base_id)).unwrap();
        container.reconcile(derived_id).unwrap();
        let graph = container.lookup(derived_id).unwrap();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        assert_eq!(
            graph.retrieve(color, &Index::Empty),
            Some(Value::from("green"))
        );
    }

    #[test]
    fn propagation_respects_the_gate() {
        let mut container = GraphContainer::new();
        let base = base_item();
        let derived = derive(&base);
        let base_id = container.create_graph(&base).unwrap();
        let derived_id = container.create_graph(&derived).unwrap();

        container.propagate_changes_from_base = false;
        container
            .mutate(base_id, |graph| {
                let color = graph.nodes().child(graph.root(), "color").unwrap();
                graph.update(color, &Index::Empty, Value::from("green"))
            })
            .unwrap();
        let graph = container.lookup(derived_id).unwrap();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        assert_eq!(graph.retrieve(color, &Index::Empty), Some(Value::from("red")));

        container.propagate_changes_from_base = true;
        container
            .mutate(base_id, |graph| {
                let color = graph.nodes().child(graph.root(), "color").unwrap();
                graph.update(color, &Index::Empty, Value::from("blue"))
            })
            .unwrap();
        let graph = container.lookup(derived_id).unwrap();
        let color = graph.nodes().child(graph.root(), "color").unwrap();
        assert_eq!(
            graph.retrieve(color, &Index::Empty),
            Some(Value::from("blue"))
        );
    }
}

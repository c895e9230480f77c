//! Calculator state.
//!
//! The repository owns everything a calculator knows: the modifiers by
//! `(stat, form)`, the active behaviors, the node arena and the dependency
//! graph between nodes and their inputs. It never evaluates values itself;
//! the calculator drives evaluation and stores the results here.

use crate::aggregation::{self, NodeType};
use crate::config::CalculatorConfig;
use crate::error::StatError;
use crate::graph::DependencyGraph;
use crate::modifier::{Form, Modifier};
use crate::node::{CalculationNode, GraphKey, NodeKey, PendingNotification};
use crate::node_value::NodeValue;
use crate::path::PathDefinition;
use crate::registry::{CollectionChange, RegisteredStat};
use crate::stat::{Stat, StatId};
use crate::transform::Behavior;
use crate::value::ValueRef;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One entry of a batch.
#[derive(Debug, Clone)]
pub(crate) enum ModifierChange {
    Add(Modifier),
    Remove(Modifier),
}

struct NodeEntry {
    value: Option<NodeValue>,
    dirty: bool,
    handle: Arc<CalculationNode>,
}

struct ActiveBehavior {
    behavior: Behavior,
    references: usize,
}

/// What a batch created, so that a failed batch can take it back.
struct BatchJournal {
    created: Vec<NodeKey>,
    registered: Vec<StatId>,
    registry_changes: usize,
}

pub(crate) struct Repository {
    config: CalculatorConfig,
    modifiers: HashMap<(StatId, Form), Vec<Modifier>>,
    modifier_counts: HashMap<StatId, usize>,
    /// In activation order, which is the order transformations are applied.
    behaviors: Vec<ActiveBehavior>,
    nodes: HashMap<NodeKey, NodeEntry>,
    nodes_by_stat: HashMap<StatId, HashSet<NodeKey>>,
    graph: DependencyGraph<GraphKey>,
    evaluation_stack: Vec<NodeKey>,
    /// Inputs changed since the last recomputation.
    invalidated: Vec<GraphKey>,
    /// Nodes waiting to be evaluated.
    stale: HashSet<NodeKey>,
    unpublished: HashSet<NodeKey>,
    /// Keys that may have become unused since the last pruning pass.
    prune_candidates: HashSet<GraphKey>,
    /// Nodes the last pruning pass kept only because of their subscribers.
    subscribed: HashSet<NodeKey>,
    batch: Option<BatchJournal>,
    registered: HashMap<StatId, RegisteredStat>,
    registry_changes: Vec<CollectionChange<RegisteredStat>>,
}

impl Repository {
    pub(crate) fn new(config: CalculatorConfig) -> Self {
        Self {
            config,
            modifiers: HashMap::new(),
            modifier_counts: HashMap::new(),
            behaviors: Vec::new(),
            nodes: HashMap::new(),
            nodes_by_stat: HashMap::new(),
            graph: DependencyGraph::new(),
            evaluation_stack: Vec::new(),
            invalidated: Vec::new(),
            stale: HashSet::new(),
            unpublished: HashSet::new(),
            prune_candidates: HashSet::new(),
            subscribed: HashSet::new(),
            batch: None,
            registered: HashMap::new(),
            registry_changes: Vec::new(),
        }
    }

    pub(crate) fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    // Modifiers

    /// Apply a batch. Returns the changes that took effect, in order.
    pub(crate) fn apply(&mut self, changes: Vec<ModifierChange>) -> Vec<ModifierChange> {
        let mut applied = Vec::with_capacity(changes.len());
        for change in changes {
            let took_effect = match &change {
                ModifierChange::Add(modifier) => {
                    self.add_modifier(modifier);
                    true
                }
                ModifierChange::Remove(modifier) => self.remove_modifier(modifier),
            };
            if took_effect {
                applied.push(change);
            }
        }
        applied
    }

    /// Undo changes returned by `apply`.
    pub(crate) fn revert(&mut self, applied: Vec<ModifierChange>) {
        for change in applied.into_iter().rev() {
            match change {
                ModifierChange::Add(modifier) => {
                    self.remove_modifier(&modifier);
                }
                ModifierChange::Remove(modifier) => self.add_modifier(&modifier),
            }
        }
    }

    fn add_modifier(&mut self, modifier: &Modifier) {
        for stat in modifier.stats() {
            self.modifiers
                .entry((stat.id().clone(), modifier.form()))
                .or_default()
                .push(modifier.clone());
            self.invalidated
                .push(GraphKey::Forms(stat.id().clone(), modifier.form()));

            let first = {
                let count = self.modifier_counts.entry(stat.id().clone()).or_insert(0);
                *count += 1;
                *count == 1
            };
            if first {
                self.activate_behaviors(stat);
            }
            self.register_if_needed(stat);
        }
    }

    fn remove_modifier(&mut self, modifier: &Modifier) -> bool {
        let present = modifier.stats().first().map_or(false, |stat| {
            self.modifiers
                .get(&(stat.id().clone(), modifier.form()))
                .map_or(false, |existing| existing.contains(modifier))
        });
        if !present {
            tracing::warn!(?modifier, "ignoring removal of a modifier that was never added");
            return false;
        }

        for stat in modifier.stats() {
            let key = (stat.id().clone(), modifier.form());
            if let Some(existing) = self.modifiers.get_mut(&key) {
                if let Some(index) = existing.iter().position(|m| m == modifier) {
                    existing.remove(index);
                }
                if existing.is_empty() {
                    self.modifiers.remove(&key);
                }
            }
            self.invalidated
                .push(GraphKey::Forms(stat.id().clone(), modifier.form()));

            let last = match self.modifier_counts.get_mut(stat.id()) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            };
            if last {
                self.modifier_counts.remove(stat.id());
                self.deactivate_behaviors(stat);
                if let Some(keys) = self.nodes_by_stat.get(stat.id()) {
                    self.prune_candidates
                        .extend(keys.iter().cloned().map(GraphKey::Node));
                }
            }
        }
        true
    }

    // Batches

    /// Start recording the nodes and registrations created from now on.
    pub(crate) fn begin_batch(&mut self) {
        self.batch = Some(BatchJournal {
            created: Vec::new(),
            registered: Vec::new(),
            registry_changes: self.registry_changes.len(),
        });
    }

    pub(crate) fn commit_batch(&mut self) {
        self.batch = None;
    }

    /// Take back what the current batch created: its nodes, the inputs
    /// only they read, its registrations and their pending announcements.
    /// Nodes it re-evaluated are marked dirty again.
    pub(crate) fn discard_batch(&mut self) {
        let Some(journal) = self.batch.take() else {
            return;
        };
        self.registry_changes.truncate(journal.registry_changes);
        for stat in &journal.registered {
            self.registered.remove(stat);
        }

        let mut inputs = Vec::new();
        for key in &journal.created {
            let graph_key = GraphKey::Node(key.clone());
            inputs.extend(self.graph.dependencies(&graph_key));
            self.graph.remove(&graph_key);
            self.forget_node(key);
        }
        for key in inputs {
            let orphaned = !matches!(key, GraphKey::Node(_)) && !self.graph.has_dependents(&key);
            if orphaned {
                self.graph.remove(&key);
            }
        }

        for key in std::mem::take(&mut self.unpublished) {
            self.mark_dirty(&key);
        }
        tracing::debug!(
            nodes = journal.created.len(),
            registrations = journal.registered.len(),
            "discarded batch"
        );
    }

    pub(crate) fn modifiers(&self, stat: &StatId, form: Form) -> Vec<Modifier> {
        self.modifiers
            .get(&(stat.clone(), form))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn modifier_count(&self, stat: &StatId) -> usize {
        self.modifier_counts.get(stat).copied().unwrap_or(0)
    }

    // Behaviors

    fn activate_behaviors(&mut self, stat: &Stat) {
        for behavior in stat.behaviors() {
            if let Some(active) = self.behaviors.iter_mut().find(|a| a.behavior == *behavior) {
                active.references += 1;
                continue;
            }
            tracing::trace!(behavior = behavior.key(), "activating behavior");
            self.invalidate_behavior(behavior);
            self.behaviors.push(ActiveBehavior {
                behavior: behavior.clone(),
                references: 1,
            });
        }
    }

    fn deactivate_behaviors(&mut self, stat: &Stat) {
        for behavior in stat.behaviors() {
            let Some(index) = self.behaviors.iter().position(|a| a.behavior == *behavior) else {
                continue;
            };
            self.behaviors[index].references -= 1;
            if self.behaviors[index].references == 0 {
                tracing::trace!(behavior = behavior.key(), "deactivating behavior");
                self.behaviors.remove(index);
                self.invalidate_behavior(behavior);
            }
        }
    }

    fn invalidate_behavior(&mut self, behavior: &Behavior) {
        for stat in behavior.affected_stats() {
            for node_type in behavior.affected_node_types() {
                self.invalidated
                    .push(GraphKey::Behaviors(stat.id().clone(), *node_type));
            }
        }
    }

    pub(crate) fn active_behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    /// The natural value of `key` wrapped by every active behavior
    /// affecting it.
    pub(crate) fn value_chain(&self, key: &NodeKey) -> ValueRef {
        let mut value = aggregation::natural_value(key.stat(), key.node_type(), key.path());
        for active in &self.behaviors {
            if active
                .behavior
                .affects(key.stat(), key.node_type(), key.path())
            {
                value = active.behavior.transformation().transform(value);
            }
        }
        value
    }

    // Paths

    /// The paths of `stat`: the main path, one per local source of its base
    /// modifiers, then the paths routed into it by active behaviors.
    ///
    /// Every input read is pushed to `dependencies`.
    pub(crate) fn paths(&self, stat: &Stat, dependencies: &mut Vec<GraphKey>) -> Vec<PathDefinition> {
        let mut visiting = vec![stat.id().clone()];
        self.collect_paths(stat, &mut visiting, dependencies)
    }

    fn collect_paths(
        &self,
        stat: &Stat,
        visiting: &mut Vec<StatId>,
        dependencies: &mut Vec<GraphKey>,
    ) -> Vec<PathDefinition> {
        let mut paths = vec![PathDefinition::main()];
        for form in Form::BASE {
            dependencies.push(GraphKey::Forms(stat.id().clone(), form));
            for modifier in self.modifiers.get(&(stat.id().clone(), form)).into_iter().flatten() {
                let path = PathDefinition::new(modifier.source());
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }

        dependencies.push(GraphKey::Behaviors(stat.id().clone(), NodeType::UncappedSubtotal));
        let main = PathDefinition::main();
        for active in &self.behaviors {
            let behavior = &active.behavior;
            let Some(source) = behavior.path_source() else {
                continue;
            };
            if !behavior.affects(stat, NodeType::UncappedSubtotal, &main)
                || visiting.contains(source.id())
            {
                continue;
            }
            visiting.push(source.id().clone());
            let source_paths = self.collect_paths(source, visiting, dependencies);
            visiting.pop();

            for path in source_paths {
                if path
                    .conversion_stats()
                    .iter()
                    .any(|converted| converted == source || converted == stat)
                {
                    continue;
                }
                let extended = path.extended_by(source.clone());
                if !paths.contains(&extended) {
                    paths.push(extended);
                }
            }
        }
        paths
    }

    // Nodes

    /// The handle of `key`, creating the node if it does not exist yet.
    pub(crate) fn ensure_node(&mut self, key: &NodeKey) -> Arc<CalculationNode> {
        let handle = self.create_entry(key);
        self.register_if_needed(key.stat());
        handle
    }

    fn create_entry(&mut self, key: &NodeKey) -> Arc<CalculationNode> {
        if let Some(entry) = self.nodes.get(key) {
            return entry.handle.clone();
        }
        let handle = Arc::new(CalculationNode::new(key.clone()));
        self.nodes.insert(
            key.clone(),
            NodeEntry {
                value: None,
                dirty: true,
                handle: handle.clone(),
            },
        );
        self.nodes_by_stat
            .entry(key.stat().id().clone())
            .or_default()
            .insert(key.clone());
        self.stale.insert(key.clone());
        self.graph.add_node(GraphKey::Node(key.clone()));
        self.prune_candidates.insert(GraphKey::Node(key.clone()));
        if let Some(batch) = &mut self.batch {
            batch.created.push(key.clone());
        }
        handle
    }

    fn mark_dirty(&mut self, key: &NodeKey) {
        if let Some(entry) = self.nodes.get_mut(key) {
            entry.dirty = true;
            self.stale.insert(key.clone());
        }
    }

    /// Drop `key` from every node index. The graph is left alone.
    fn forget_node(&mut self, key: &NodeKey) -> Option<NodeEntry> {
        let entry = self.nodes.remove(key)?;
        if let Some(keys) = self.nodes_by_stat.get_mut(key.stat().id()) {
            keys.remove(key);
            if keys.is_empty() {
                self.nodes_by_stat.remove(key.stat().id());
            }
        }
        self.stale.remove(key);
        self.unpublished.remove(key);
        self.subscribed.remove(key);
        Some(entry)
    }

    pub(crate) fn contains_node(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The stored value of `key` if it is up to date.
    pub(crate) fn cached_value(&self, key: &NodeKey) -> Option<Option<NodeValue>> {
        self.nodes
            .get(key)
            .filter(|entry| !entry.dirty)
            .map(|entry| entry.value)
    }

    /// Start evaluating `key`.
    ///
    /// Fails if `key` is already being evaluated or the evaluation is
    /// nested too deeply.
    pub(crate) fn enter(&mut self, key: &NodeKey) -> Result<(), StatError> {
        if let Some(position) = self.evaluation_stack.iter().position(|k| k == key) {
            let path = self.evaluation_stack[position..]
                .iter()
                .chain(std::iter::once(key))
                .map(ToString::to_string)
                .collect();
            return Err(StatError::Cycle { path });
        }
        if self.evaluation_stack.len() >= self.config.max_evaluation_depth {
            return Err(StatError::EvaluationDepthExceeded(
                self.config.max_evaluation_depth,
            ));
        }
        self.ensure_node(key);
        self.evaluation_stack.push(key.clone());
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.evaluation_stack.pop();
    }

    pub(crate) fn evaluation_depth(&self) -> usize {
        self.evaluation_stack.len()
    }

    /// Store the result of evaluating `key` along with everything it read.
    pub(crate) fn store(
        &mut self,
        key: &NodeKey,
        value: Option<NodeValue>,
        mut dependencies: Vec<GraphKey>,
    ) {
        dependencies.push(GraphKey::Behaviors(key.stat().id().clone(), key.node_type()));
        if let Some(entry) = self.nodes.get_mut(key) {
            entry.value = value;
            entry.dirty = false;
        }
        self.stale.remove(key);
        let dropped = self
            .graph
            .set_dependencies(&GraphKey::Node(key.clone()), dependencies);
        self.prune_candidates.extend(dropped);
        self.unpublished.insert(key.clone());
    }

    /// Mark everything reading an input changed since the last call dirty.
    ///
    /// Returns every dirty node, dependencies before dependents. Only the
    /// dirty nodes and the edges between them are visited.
    pub(crate) fn dirty_nodes(&mut self) -> Result<Vec<NodeKey>, StatError> {
        let roots = std::mem::take(&mut self.invalidated);
        for key in self.graph.transitive_dependents(roots) {
            if let GraphKey::Node(node) = key {
                self.mark_dirty(&node);
            }
        }
        if self.stale.is_empty() {
            return Ok(Vec::new());
        }

        let dirty: HashSet<GraphKey> = self.stale.iter().cloned().map(GraphKey::Node).collect();
        Ok(self
            .graph
            .topological_order(&dirty)?
            .into_iter()
            .filter_map(|key| match key {
                GraphKey::Node(node) => Some(node),
                _ => None,
            })
            .collect())
    }

    /// Push recomputed values to their handles. Returns the notifications
    /// of the values that changed.
    pub(crate) fn publish(&mut self) -> Vec<PendingNotification> {
        let tolerance = self.config.value_tolerance;
        let keys: Vec<NodeKey> = self.unpublished.drain().collect();
        keys.iter()
            .filter_map(|key| {
                let entry = self.nodes.get(key)?;
                entry.handle.publish(entry.value, tolerance)
            })
            .collect()
    }

    // Pruning

    /// Remove unused keys, starting from the ones that may have become
    /// unused since the last pass and following what they read. Returns
    /// the number of removed keys.
    pub(crate) fn prune(&mut self) -> usize {
        let mut pending: Vec<GraphKey> = self.prune_candidates.drain().collect();
        pending.extend(self.subscribed.drain().map(GraphKey::Node));

        let mut removed = 0;
        while let Some(key) = pending.pop() {
            if !self.graph.contains(&key) {
                continue;
            }
            let unused = self.is_unused(&key);
            if let GraphKey::Node(node) = &key {
                // the registered node may have been waiting on this one
                if let Some(registered) = self.registered.get(node.stat().id()) {
                    if registered.node.key() != node {
                        pending.push(GraphKey::Node(registered.node.key().clone()));
                    }
                }
                if !unused && self.is_observed(node) {
                    self.subscribed.insert(node.clone());
                }
            }
            if !unused {
                continue;
            }

            pending.extend(self.graph.dependencies(&key));
            self.graph.remove(&key);
            if let GraphKey::Node(node) = &key {
                self.remove_node(node);
            }
            removed += 1;
        }
        if removed > 0 {
            tracing::debug!(removed, remaining = self.nodes.len(), "pruned unused nodes");
        }
        removed
    }

    /// Whether `key` can be pruned: nothing reads it and, for nodes, its
    /// stat has no modifiers and nothing subscribes to it.
    ///
    /// The `Total` node a user-specified stat is registered with goes last:
    /// it stays while another node of the stat is still read from outside
    /// the stat, so the stat is unregistered together with the rest of it.
    fn is_unused(&self, key: &GraphKey) -> bool {
        if self.graph.has_dependents(key) {
            return false;
        }
        match key {
            GraphKey::Node(node) => {
                self.modifier_count(node.stat().id()) == 0
                    && !self.is_observed(node)
                    && !self.holds_registration(node)
            }
            GraphKey::Forms(..) | GraphKey::Behaviors(..) => true,
        }
    }

    fn is_observed(&self, node: &NodeKey) -> bool {
        self.nodes
            .get(node)
            .map_or(false, |entry| entry.handle.has_subscribers())
    }

    fn holds_registration(&self, node: &NodeKey) -> bool {
        let stat = node.stat().id();
        let is_registered_node = self
            .registered
            .get(stat)
            .map_or(false, |registered| registered.node.key() == node);
        if !is_registered_node {
            return false;
        }
        let read_from_outside = |other: &NodeKey| {
            self.is_observed(other)
                || self
                    .graph
                    .dependents(&GraphKey::Node(other.clone()))
                    .iter()
                    .any(|dependent| match dependent {
                        GraphKey::Node(reader) => reader.stat() != node.stat(),
                        _ => true,
                    })
        };
        self.nodes_by_stat.get(stat).map_or(false, |keys| {
            keys.iter().any(|other| other != node && read_from_outside(other))
        })
    }

    fn remove_node(&mut self, key: &NodeKey) {
        let Some(entry) = self.forget_node(key) else {
            return;
        };

        let stat = key.stat().id();
        let is_registered_node = self
            .registered
            .get(stat)
            .map_or(false, |registered| Arc::ptr_eq(&registered.node, &entry.handle));
        if is_registered_node {
            if let Some(registered) = self.registered.remove(stat) {
                tracing::info!(stat = %registered.stat, "unregistered stat");
                self.registry_changes
                    .push(CollectionChange::Removed(registered));
            }
        }
    }

    // Explicit registration

    fn register_if_needed(&mut self, stat: &Stat) {
        if stat.explicit_registration().is_none() || self.registered.contains_key(stat.id()) {
            return;
        }
        let node = self.create_entry(&NodeKey::main(stat.clone(), NodeType::Total));
        if let Some(batch) = &mut self.batch {
            batch.registered.push(stat.id().clone());
        }
        tracing::info!(stat = %stat, "registered stat for external tracking");
        let registered = RegisteredStat {
            node,
            stat: stat.clone(),
        };
        self.registered
            .insert(stat.id().clone(), registered.clone());
        self.registry_changes
            .push(CollectionChange::Added(registered));
    }

    pub(crate) fn take_registry_changes(&mut self) -> Vec<CollectionChange<RegisteredStat>> {
        std::mem::take(&mut self.registry_changes)
    }
}

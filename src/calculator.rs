//! Calculator module.
//!
//! Provides `Calculator`, the entry point of the crate. It accepts batches
//! of modifier additions and removals, keeps every node it has handed out
//! up to date, and notifies subscribers of changed values once per batch.

use crate::aggregation::{applies_to, NodeType};
use crate::config::CalculatorConfig;
use crate::context::{PathContext, ValueCalculationContext};
use crate::error::StatError;
use crate::modifier::{Form, Modifier};
use crate::node::{CalculationNode, GraphKey, NodeKey, PendingNotification};
use crate::node_value::NodeValue;
use crate::path::PathDefinition;
use crate::registry::{CollectionChange, ObservableCollection, RegisteredStat};
use crate::repository::{ModifierChange, Repository};
use crate::source::ModifierSource;
use crate::stat::Stat;
use crate::value::{IntoValue, ValueResult};
use std::cell::RefCell;
use std::sync::Arc;

/// An incremental stat calculator.
///
/// The calculator:
/// 1. Collects modifiers per stat and form
/// 2. Creates nodes lazily when they are first requested or read
/// 3. Records what every node reads while it is evaluated
/// 4. Recomputes only the nodes reading something a batch changed
/// 5. Publishes new values and notifies subscribers after each batch
///
/// All computation happens on the thread owning the calculator. The node
/// handles it returns can be read and subscribed to from any thread.
///
/// # Examples
///
/// ```rust
/// use statgraph::*;
///
/// let mut calculator = Calculator::new();
/// let life = Stat::new("Life");
///
/// calculator
///     .new_batch_update()
///     .add_modifier(Modifier::global(&life, Form::BaseAdd, 100.0))
///     .add_modifier(Modifier::global(&life, Form::BaseAdd, 50.0))
///     .add_modifier(Modifier::global(&life, Form::Increase, 50.0))
///     .do_update()
///     .unwrap();
///
/// let total = calculator.node(&life, NodeType::Total).unwrap();
/// assert_eq!(total.value(), Some(NodeValue::from(225.0))); // (100 + 50) * 1.5
/// ```
pub struct Calculator {
    repository: RefCell<Repository>,
    registered_stats: ObservableCollection<RegisteredStat>,
}

impl Calculator {
    /// Create a calculator with the default configuration.
    pub fn new() -> Self {
        Self::from_config(CalculatorConfig::default())
    }

    /// Create a calculator with `config`, rejecting invalid settings.
    pub fn with_config(config: CalculatorConfig) -> Result<Self, StatError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: CalculatorConfig) -> Self {
        Self {
            repository: RefCell::new(Repository::new(config)),
            registered_stats: ObservableCollection::new(),
        }
    }

    pub fn config(&self) -> CalculatorConfig {
        self.repository.borrow().config().clone()
    }

    /// The main-path node of `stat` for `node_type`, computed and
    /// published.
    pub fn node(&self, stat: &Stat, node_type: NodeType) -> Result<Arc<CalculationNode>, StatError> {
        self.path_node(stat, node_type, &PathDefinition::main())
    }

    /// The node of `stat` for `node_type` on `path`.
    ///
    /// Node types that only exist on the main path ignore `path`. If the
    /// node cannot be evaluated, nothing it created is kept and no
    /// subscriber is notified.
    pub fn path_node(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Arc<CalculationNode>, StatError> {
        let key = NodeKey::new(stat.clone(), node_type, path.clone());
        let handle = {
            let mut repository = self.repository.borrow_mut();
            repository.begin_batch();
            repository.ensure_node(&key)
        };

        if let Err(err) = self.recompute() {
            tracing::warn!(node = %key, error = %err, "node evaluation failed");
            self.repository.borrow_mut().discard_batch();
            self.finish(Vec::new());
            return Err(err);
        }
        let notifications = {
            let mut repository = self.repository.borrow_mut();
            repository.commit_batch();
            repository.publish()
        };
        self.finish(notifications);
        Ok(handle)
    }

    /// Shorthand for the current value of a main-path node.
    pub fn value(&self, stat: &Stat, node_type: NodeType) -> Result<Option<NodeValue>, StatError> {
        Ok(self.node(stat, node_type)?.value())
    }

    /// The paths `stat` is currently computed over, main path first.
    pub fn paths(&self, stat: &Stat) -> Vec<PathDefinition> {
        self.repository.borrow().paths(stat, &mut Vec::new())
    }

    /// Stats discovered during evaluation that want an externally provided
    /// value, in discovery order.
    pub fn explicitly_registered_stats(&self) -> &ObservableCollection<RegisteredStat> {
        &self.registered_stats
    }

    /// Number of nodes currently cached.
    pub fn node_count(&self) -> usize {
        self.repository.borrow().node_count()
    }

    /// Start a batch of modifier changes.
    pub fn new_batch_update(&mut self) -> BatchUpdate<'_> {
        BatchUpdate {
            calculator: self,
            changes: Vec::new(),
        }
    }

    fn update(&self, changes: Vec<ModifierChange>) -> Result<(), StatError> {
        let requested = changes.len();
        let applied = {
            let mut repository = self.repository.borrow_mut();
            repository.begin_batch();
            repository.apply(changes)
        };
        tracing::debug!(requested, applied = applied.len(), "applying batch");

        if let Err(err) = self.recompute() {
            tracing::warn!(error = %err, "batch failed, rolling back");
            self.roll_back(applied);
            return Err(err);
        }

        let notifications = {
            let mut repository = self.repository.borrow_mut();
            repository.commit_batch();
            let notifications = repository.publish();
            if repository.config().prune_unused_nodes {
                repository.prune();
            }
            notifications
        };
        self.finish(notifications);
        Ok(())
    }

    /// Undo a failed batch: its modifier changes, the nodes and
    /// registrations it created, and the values it computed.
    fn roll_back(&self, applied: Vec<ModifierChange>) {
        {
            let mut repository = self.repository.borrow_mut();
            repository.revert(applied);
            repository.discard_batch();
        }
        if let Err(err) = self.recompute() {
            tracing::warn!(error = %err, "recomputation after rollback failed");
        }
        // The restored values are the ones the handles already show.
        self.repository.borrow_mut().publish();
        self.finish(Vec::new());
    }

    /// Evaluate every dirty node until none is left.
    fn recompute(&self) -> Result<(), StatError> {
        loop {
            let dirty = self.repository.borrow_mut().dirty_nodes()?;
            if dirty.is_empty() {
                return Ok(());
            }
            for key in &dirty {
                self.evaluate(key)?;
            }
        }
    }

    /// Flush registry changes and deliver notifications. Runs with the
    /// repository released so listeners never observe it borrowed.
    fn finish(&self, notifications: Vec<PendingNotification>) {
        let changes = self.repository.borrow_mut().take_registry_changes();
        for change in changes {
            match change {
                CollectionChange::Added(stat) => self.registered_stats.add(stat),
                CollectionChange::Removed(stat) => {
                    self.registered_stats.remove(&stat);
                }
            }
        }
        for notification in notifications {
            notification.deliver();
        }
    }

    fn evaluate(&self, key: &NodeKey) -> ValueResult {
        let value = {
            let mut repository = self.repository.borrow_mut();
            if let Some(value) = repository.cached_value(key) {
                return Ok(value);
            }
            repository.enter(key)?;
            repository.value_chain(key)
        };

        tracing::trace!(node = %key, "evaluating node");
        let context = RecordingContext::new(self, key.path().clone());
        let result = value.calculate(&context);

        let mut repository = self.repository.borrow_mut();
        repository.leave();
        let value = result?;
        repository.store(key, value, context.into_dependencies());
        Ok(value)
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

/// A pending set of modifier changes.
///
/// Changes are applied in order when `do_update` is called. Either the
/// whole batch takes effect or, if evaluation fails, none of it does.
#[must_use = "a batch does nothing until `do_update` is called"]
pub struct BatchUpdate<'a> {
    calculator: &'a mut Calculator,
    changes: Vec<ModifierChange>,
}

impl BatchUpdate<'_> {
    pub fn add_modifier(mut self, modifier: Modifier) -> Self {
        self.changes.push(ModifierChange::Add(modifier));
        self
    }

    pub fn add_modifiers(mut self, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        self.changes
            .extend(modifiers.into_iter().map(ModifierChange::Add));
        self
    }

    /// Remove one instance of an equal modifier. Removing a modifier that
    /// was never added is logged and ignored.
    pub fn remove_modifier(mut self, modifier: Modifier) -> Self {
        self.changes.push(ModifierChange::Remove(modifier));
        self
    }

    pub fn remove_modifiers(mut self, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        self.changes
            .extend(modifiers.into_iter().map(ModifierChange::Remove));
        self
    }

    /// Add a modifier to a single stat.
    pub fn add(self, stat: &Stat, form: Form, value: impl IntoValue, source: ModifierSource) -> Self {
        self.add_modifier(Modifier::new(vec![stat.clone()], form, value, source))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply the batch, recompute what it affects and notify subscribers.
    pub fn do_update(self) -> Result<(), StatError> {
        self.calculator.update(self.changes)
    }
}

/// Context handed to values while a node is evaluated. Every read is
/// recorded as a dependency of that node.
struct RecordingContext<'a> {
    calculator: &'a Calculator,
    path: PathDefinition,
    dependencies: RefCell<Vec<GraphKey>>,
}

impl<'a> RecordingContext<'a> {
    fn new(calculator: &'a Calculator, path: PathDefinition) -> Self {
        Self {
            calculator,
            path,
            dependencies: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, key: GraphKey) {
        self.dependencies.borrow_mut().push(key);
    }

    fn into_dependencies(self) -> Vec<GraphKey> {
        self.dependencies.into_inner()
    }
}

impl ValueCalculationContext for RecordingContext<'_> {
    fn current_path(&self) -> PathDefinition {
        self.path.clone()
    }

    fn get_value(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, StatError> {
        let key = NodeKey::new(stat.clone(), node_type, path.clone());
        self.record(GraphKey::Node(key.clone()));
        self.calculator.evaluate(&key)
    }

    fn get_values(
        &self,
        form: Form,
        paths: &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, StatError> {
        let mut values = Vec::new();
        for (stat, path) in paths {
            self.record(GraphKey::Forms(stat.id().clone(), form));
            let modifiers = self.calculator.repository.borrow().modifiers(stat.id(), form);
            let context = PathContext::new(self, path.clone());
            for modifier in modifiers
                .iter()
                .filter(|modifier| applies_to(form, modifier.source(), path))
            {
                values.push(modifier.value().calculate(&context)?);
            }
        }
        Ok(values)
    }

    fn get_paths(&self, stat: &Stat) -> Result<Vec<PathDefinition>, StatError> {
        let mut dependencies = Vec::new();
        let paths = self
            .calculator
            .repository
            .borrow()
            .paths(stat, &mut dependencies);
        self.dependencies.borrow_mut().extend(dependencies);
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StatValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn total(calculator: &Calculator, stat: &Stat) -> Option<NodeValue> {
        calculator.value(stat, NodeType::Total).unwrap()
    }

    #[test]
    fn test_simple_calculation() {
        let mut calculator = Calculator::new();
        let stat = Stat::new("stat");
        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&stat, Form::BaseAdd, 5.0))
            .do_update()
            .unwrap();
        assert_eq!(total(&calculator, &stat), Some(NodeValue::from(5.0)));
    }

    #[test]
    fn test_unknown_without_modifiers() {
        let calculator = Calculator::new();
        assert_eq!(total(&calculator, &Stat::new("stat")), None);
    }

    #[test]
    fn test_reads_are_cached() {
        let mut calculator = Calculator::new();
        let stat = Stat::new("stat");
        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&stat, Form::BaseAdd, 5.0))
            .do_update()
            .unwrap();
        let first = calculator.node(&stat, NodeType::Total).unwrap();
        let count = calculator.node_count();
        let second = calculator.node(&stat, NodeType::Total).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calculator.node_count(), count);
    }

    #[test]
    fn test_dependents_follow_changes() {
        let mut calculator = Calculator::new();
        let strength = Stat::new("Strength");
        let life = Stat::new("Life");
        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&strength, Form::BaseAdd, 10.0))
            .add_modifier(Modifier::global(&life, Form::BaseAdd, Arc::new(StatValue::new(strength.clone()))))
            .do_update()
            .unwrap();
        let life_total = calculator.node(&life, NodeType::Total).unwrap();
        assert_eq!(life_total.value(), Some(NodeValue::from(10.0)));

        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&strength, Form::BaseAdd, 5.0))
            .do_update()
            .unwrap();
        assert_eq!(life_total.value(), Some(NodeValue::from(15.0)));
    }

    #[test]
    fn test_one_notification_per_batch() {
        let mut calculator = Calculator::new();
        let stat = Stat::new("stat");
        let node = calculator.node(&stat, NodeType::Total).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        node.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&stat, Form::BaseAdd, 1.0))
            .add_modifier(Modifier::global(&stat, Form::BaseAdd, 2.0))
            .add_modifier(Modifier::global(&stat, Form::More, 100.0))
            .do_update()
            .unwrap();
        assert_eq!(node.value(), Some(NodeValue::from(6.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_value_does_not_notify() {
        let mut calculator = Calculator::new();
        let stat = Stat::new("stat");
        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&stat, Form::BaseAdd, 1.0))
            .do_update()
            .unwrap();
        let node = calculator.node(&stat, NodeType::Total).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        node.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&stat, Form::Increase, 0.0))
            .do_update()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cycle_rolls_back_batch() {
        let mut calculator = Calculator::new();
        let a = Stat::new("A");
        let b = Stat::new("B");
        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&a, Form::BaseAdd, 1.0))
            .do_update()
            .unwrap();
        let node = calculator.node(&a, NodeType::Total).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        node.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&a, Form::BaseAdd, Arc::new(StatValue::new(b.clone()))))
            .add_modifier(Modifier::global(&b, Form::BaseAdd, Arc::new(StatValue::new(a.clone()))))
            .do_update()
            .unwrap_err();
        assert!(matches!(err, StatError::Cycle { .. }));
        assert_eq!(node.value(), Some(NodeValue::from(1.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&a, Form::BaseAdd, 2.0))
            .do_update()
            .unwrap();
        assert_eq!(node.value(), Some(NodeValue::from(3.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_node_request_leaves_nothing_behind() {
        let mut calculator = Calculator::new();
        let a = Stat::new("A");
        let b = Stat::new("B");
        let life = Stat::new("Life");
        // nothing reads A or B yet, so the batch itself succeeds
        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&a, Form::BaseAdd, Arc::new(StatValue::new(b.clone()))))
            .add_modifier(Modifier::global(&b, Form::BaseAdd, Arc::new(StatValue::new(a.clone()))))
            .do_update()
            .unwrap();
        let node = calculator.node(&life, NodeType::Total).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        node.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let node_count = calculator.node_count();

        let err = calculator.node(&a, NodeType::Total).unwrap_err();
        assert!(matches!(err, StatError::Cycle { .. }));
        assert_eq!(calculator.node_count(), node_count);

        // later batches do not trip over the abandoned evaluation
        calculator
            .new_batch_update()
            .add_modifier(Modifier::global(&life, Form::BaseAdd, 5.0))
            .do_update()
            .unwrap();
        assert_eq!(node.value(), Some(NodeValue::from(5.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_path_nodes() {
        let mut calculator = Calculator::new();
        let armour = Stat::new("Armour");
        let helm = ModifierSource::item(crate::source::ItemSlot::Helm, "Cap");
        calculator
            .new_batch_update()
            .add(&armour, Form::BaseSet, 100.0, helm.clone())
            .add(&armour, Form::Increase, 50.0, helm.clone())
            .add(&armour, Form::BaseAdd, 10.0, ModifierSource::global())
            .do_update()
            .unwrap();

        let helm_path = PathDefinition::new(&helm);
        assert_eq!(calculator.paths(&armour), vec![PathDefinition::main(), helm_path.clone()]);
        let helm_total = calculator
            .path_node(&armour, NodeType::PathTotal, &helm_path)
            .unwrap();
        assert_eq!(helm_total.value(), Some(NodeValue::from(150.0)));
        assert_eq!(total(&calculator, &armour), Some(NodeValue::from(160.0)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CalculatorConfig {
            max_evaluation_depth: 0,
            ..CalculatorConfig::default()
        };
        assert!(matches!(
            Calculator::with_config(config),
            Err(StatError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_batch_len() {
        let mut calculator = Calculator::new();
        let stat = Stat::new("stat");
        let batch = calculator.new_batch_update();
        assert!(batch.is_empty());
        let batch = batch.add_modifier(Modifier::global(&stat, Form::BaseAdd, 1.0));
        assert_eq!(batch.len(), 1);
        batch.do_update().unwrap();
    }
}

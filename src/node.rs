//! Calculation node handles.
//!
//! A `CalculationNode` is the externally visible face of one
//! `(stat, node type, path)` computation. The calculator owns the
//! computation; handles only carry the last published value and the
//! `ValueChanged` subscribers. Handles are `Send + Sync`: values can be
//! read and subscriptions managed from any thread, while all computation
//! stays on the thread owning the calculator.

use crate::aggregation::NodeType;
use crate::modifier::Form;
use crate::node_value::NodeValue;
use crate::path::PathDefinition;
use crate::stat::{Stat, StatId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Identity of a calculation node.
///
/// Node types that only exist on the main path are normalized to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    stat: Stat,
    node_type: NodeType,
    path: PathDefinition,
}

impl NodeKey {
    pub fn new(stat: Stat, node_type: NodeType, path: PathDefinition) -> Self {
        let path = if node_type.is_path_specific() {
            path
        } else {
            PathDefinition::main()
        };
        Self {
            stat,
            node_type,
            path,
        }
    }

    pub fn main(stat: Stat, node_type: NodeType) -> Self {
        Self::new(stat, node_type, PathDefinition::main())
    }

    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn path(&self) -> &PathDefinition {
        &self.path
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stat, self.node_type)?;
        if !self.path.is_main_path() {
            write!(f, "[{}]", self.path)?;
        }
        Ok(())
    }
}

/// Anything a node's value can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum GraphKey {
    Node(NodeKey),
    /// The modifiers of one form applying to one stat.
    Forms(StatId, Form),
    /// The active behaviors intercepting one stat's node type.
    Behaviors(StatId, NodeType),
}

impl fmt::Display for GraphKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphKey::Node(key) => write!(f, "{key}"),
            GraphKey::Forms(stat, form) => write!(f, "{stat}:{form:?}"),
            GraphKey::Behaviors(stat, node_type) => write!(f, "{stat}:{node_type} behaviors"),
        }
    }
}

/// Notification raised when a node's published value changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChanged {
    pub previous: Option<NodeValue>,
    pub current: Option<NodeValue>,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ValueChanged) + Send + Sync>;

/// The published state of a calculation node.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Calculator, Form, Modifier, NodeType, NodeValue, Stat};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let mut calculator = Calculator::new();
/// let life = Stat::new("Life");
/// let node = calculator.node(&life, NodeType::Total).unwrap();
///
/// let changes = Arc::new(AtomicUsize::new(0));
/// let counter = changes.clone();
/// node.subscribe(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// calculator
///     .new_batch_update()
///     .add_modifier(Modifier::global(&life, Form::BaseAdd, 38.0))
///     .do_update()
///     .unwrap();
///
/// assert_eq!(node.value(), Some(NodeValue::from(38.0)));
/// assert_eq!(changes.load(Ordering::SeqCst), 1);
/// ```
pub struct CalculationNode {
    key: NodeKey,
    value: RwLock<Option<NodeValue>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl CalculationNode {
    pub(crate) fn new(key: NodeKey) -> Self {
        Self {
            key,
            value: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// The value published by the last completed update.
    pub fn value(&self) -> Option<NodeValue> {
        *self.value.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a `ValueChanged` listener. Listeners run on the thread
    /// applying the update, after the update has completed.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ValueChanged) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn has_subscribers(&self) -> bool {
        !self.lock_listeners().is_empty()
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`. Returns the pending notification if it differs from
    /// the previous value by more than `tolerance`.
    pub(crate) fn publish(&self, value: Option<NodeValue>, tolerance: f64) -> Option<PendingNotification> {
        let mut current = self.value.write().unwrap_or_else(PoisonError::into_inner);
        if crate::node_value::values_equal(*current, value, tolerance) {
            return None;
        }
        let event = ValueChanged {
            previous: *current,
            current: value,
        };
        *current = value;
        drop(current);
        let listeners = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        Some(PendingNotification { event, listeners })
    }
}

impl fmt::Debug for CalculationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculationNode")
            .field("key", &self.key.to_string())
            .field("value", &self.value())
            .finish()
    }
}

/// A change to deliver once the calculator is no longer borrowed.
pub(crate) struct PendingNotification {
    event: ValueChanged,
    listeners: Vec<Listener>,
}

impl PendingNotification {
    pub(crate) fn deliver(self) {
        for listener in &self.listeners {
            listener(&self.event);
        }
    }
}

//! Observable collection of explicitly registered stats.

use crate::node::CalculationNode;
use crate::stat::Stat;
use std::sync::{Arc, Mutex, PoisonError};

/// A stat announced to external observers together with its `Total` node.
#[derive(Debug, Clone)]
pub struct RegisteredStat {
    pub node: Arc<CalculationNode>,
    pub stat: Stat,
}

impl PartialEq for RegisteredStat {
    fn eq(&self, other: &Self) -> bool {
        self.stat == other.stat && Arc::ptr_eq(&self.node, &other.node)
    }
}

/// A change to an observable collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    Added(T),
    Removed(T),
}

type CollectionListener<T> = Arc<dyn Fn(&CollectionChange<T>) + Send + Sync>;

/// An append-ordered collection that notifies listeners of changes.
///
/// Items keep the order in which they were added.
///
/// # Examples
///
/// ```rust
/// use statgraph::registry::{CollectionChange, ObservableCollection};
/// use std::sync::{Arc, Mutex};
///
/// let collection = ObservableCollection::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// collection.subscribe(move |change: &CollectionChange<u32>| {
///     sink.lock().unwrap().push(change.clone());
/// });
///
/// collection.add(7);
/// collection.remove(&7);
///
/// assert!(collection.is_empty());
/// assert_eq!(
///     *seen.lock().unwrap(),
///     vec![CollectionChange::Added(7), CollectionChange::Removed(7)]
/// );
/// ```
pub struct ObservableCollection<T> {
    items: Mutex<Vec<T>>,
    listeners: Mutex<Vec<CollectionListener<T>>>,
}

impl<T: Clone + PartialEq> ObservableCollection<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&CollectionChange<T>) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    pub fn add(&self, item: T) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item.clone());
        self.notify(CollectionChange::Added(item));
    }

    /// Remove the first occurrence of `item`. Returns whether it was present.
    pub fn remove(&self, item: &T) -> bool {
        let removed = {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            match items.iter().position(|existing| existing == item) {
                Some(index) => Some(items.remove(index)),
                None => None,
            }
        };
        match removed {
            Some(removed) => {
                self.notify(CollectionChange::Removed(removed));
                true
            }
            None => false,
        }
    }

    /// A snapshot of the current items.
    pub fn items(&self) -> Vec<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, change: CollectionChange<T>) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(&change);
        }
    }
}

impl<T: Clone + PartialEq> Default for ObservableCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

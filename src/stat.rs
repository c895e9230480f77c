//! Stat identity module.
//!
//! Provides `StatId`, an interned string key, and `Stat`, the immutable
//! description of a tracked statistic. Two `Stat`s are equal when their
//! keys are equal, no matter how (or by whom) they were constructed.

use crate::transform::Behavior;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Interned string identifier for stats.
///
/// # Examples
///
/// ```rust
/// use statgraph::StatId;
///
/// let life: StatId = "Life".into();
/// let life2 = StatId::from(String::from("Life"));
///
/// assert_eq!(life, life2);
/// assert_eq!(life.as_str(), "Life");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatId(Arc<str>);

impl StatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for StatId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StatId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(StatId::from(s))
    }
}

impl From<&str> for StatId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for StatId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for StatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric kind of a stat's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Float,
    Integer,
    Boolean,
}

/// Reason a stat must be announced to external observers when the
/// calculator first encounters it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExplicitRegistrationType {
    /// The value is entered by the user; `default_value` is used while
    /// no modifier applies.
    UserSpecifiedValue { default_value: Option<f64> },
}

#[derive(Clone)]
struct StatInner {
    id: StatId,
    data_type: DataType,
    minimum: Option<Stat>,
    maximum: Option<Stat>,
    explicit_registration: Option<ExplicitRegistrationType>,
    behaviors: Vec<Behavior>,
}

/// A tracked statistic.
///
/// Cheap to clone. Equality and hashing only look at the key, so a stat
/// constructed independently by two producers maps to the same nodes.
///
/// # Examples
///
/// ```rust
/// use statgraph::{DataType, Stat};
///
/// let life = Stat::new("Life").with_data_type(DataType::Integer).with_bounds();
///
/// assert_eq!(life, Stat::new("Life"));
/// assert_eq!(life.minimum().map(|s| s.id().to_string()), Some("Life.Minimum".to_string()));
/// ```
#[derive(Clone)]
pub struct Stat(Arc<StatInner>);

impl Stat {
    pub fn new(id: impl Into<StatId>) -> Self {
        Self(Arc::new(StatInner {
            id: id.into(),
            data_type: DataType::Float,
            minimum: None,
            maximum: None,
            explicit_registration: None,
            behaviors: Vec::new(),
        }))
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        Arc::make_mut(&mut self.0).data_type = data_type;
        self
    }

    /// Attach `"<id>.Minimum"` and `"<id>.Maximum"` stats of the same data type.
    pub fn with_bounds(self) -> Self {
        let minimum = Stat::new(format!("{}.Minimum", self.id())).with_data_type(self.data_type());
        let maximum = Stat::new(format!("{}.Maximum", self.id())).with_data_type(self.data_type());
        self.with_minimum(minimum).with_maximum(maximum)
    }

    pub fn with_minimum(mut self, minimum: Stat) -> Self {
        Arc::make_mut(&mut self.0).minimum = Some(minimum);
        self
    }

    pub fn with_maximum(mut self, maximum: Stat) -> Self {
        Arc::make_mut(&mut self.0).maximum = Some(maximum);
        self
    }

    pub fn with_explicit_registration(mut self, registration: ExplicitRegistrationType) -> Self {
        Arc::make_mut(&mut self.0).explicit_registration = Some(registration);
        self
    }

    pub fn with_behaviors(mut self, behaviors: Vec<Behavior>) -> Self {
        Arc::make_mut(&mut self.0).behaviors = behaviors;
        self
    }

    /// The same stat without behaviors.
    ///
    /// Behaviors that need to refer back to the stat carrying them use this
    /// form, which keeps the stat description acyclic.
    pub fn without_behaviors(&self) -> Self {
        if self.0.behaviors.is_empty() {
            return self.clone();
        }
        let mut inner = (*self.0).clone();
        inner.behaviors = Vec::new();
        Self(Arc::new(inner))
    }

    pub fn id(&self) -> &StatId {
        &self.0.id
    }

    pub fn data_type(&self) -> DataType {
        self.0.data_type
    }

    pub fn minimum(&self) -> Option<&Stat> {
        self.0.minimum.as_ref()
    }

    pub fn maximum(&self) -> Option<&Stat> {
        self.0.maximum.as_ref()
    }

    pub fn explicit_registration(&self) -> Option<ExplicitRegistrationType> {
        self.0.explicit_registration
    }

    pub fn behaviors(&self) -> &[Behavior] {
        &self.0.behaviors
    }
}

impl PartialEq for Stat {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Stat {}

impl Hash for Stat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stat({})", self.0.id)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.id)
    }
}

impl Serialize for Stat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.id.serialize(serializer)
    }
}

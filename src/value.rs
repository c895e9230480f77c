//! Value expressions.
//!
//! A `Value` is a pure function from an evaluation context to an optional
//! `NodeValue`. Modifiers carry values, behaviors wrap them. Values may be
//! evaluated any number of times and must not have side effects.

use crate::aggregation::NodeType;
use crate::context::ValueCalculationContext;
use crate::error::StatError;
use crate::node_value::NodeValue;
use crate::path::PathDefinition;
use crate::stat::Stat;
use std::fmt;
use std::sync::Arc;

/// Result of evaluating a value.
pub type ValueResult = Result<Option<NodeValue>, StatError>;

/// A lazily evaluated calculation.
///
/// # Examples
///
/// ```rust
/// use statgraph::context::ValueCalculationContext;
/// use statgraph::value::{Value, ValueResult};
///
/// #[derive(Debug)]
/// struct Always42;
///
/// impl Value for Always42 {
///     fn calculate(&self, _context: &dyn ValueCalculationContext) -> ValueResult {
///         Ok(Some(statgraph::NodeValue::from(42.0)))
///     }
/// }
/// ```
pub trait Value: fmt::Debug + Send + Sync {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult;

    /// Key identifying values that are structurally equal.
    ///
    /// Two values whose keys are both `Some` and equal are treated as the
    /// same value when modifiers are compared for removal. Values returning
    /// `None` are only equal to themselves (same allocation).
    fn structural_key(&self) -> Option<String> {
        None
    }
}

/// Shared handle to a value expression.
pub type ValueRef = Arc<dyn Value>;

/// Whether two value handles denote the same value.
pub fn values_match(a: &ValueRef, b: &ValueRef) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    match (a.structural_key(), b.structural_key()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Conversion into a shared value handle.
pub trait IntoValue {
    fn into_value(self) -> ValueRef;
}

impl IntoValue for ValueRef {
    fn into_value(self) -> ValueRef {
        self
    }
}

impl<T: Value + 'static> IntoValue for Arc<T> {
    fn into_value(self) -> ValueRef {
        self
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> ValueRef {
        Arc::new(Constant::new(self))
    }
}

impl IntoValue for NodeValue {
    fn into_value(self) -> ValueRef {
        Arc::new(Constant::from(self))
    }
}

impl IntoValue for bool {
    fn into_value(self) -> ValueRef {
        Arc::new(Constant::from(NodeValue::from(self)))
    }
}

/// A fixed value, possibly unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub Option<NodeValue>);

impl Constant {
    pub fn new(value: f64) -> Self {
        Self(Some(NodeValue::from(value)))
    }

    pub fn unknown() -> Self {
        Self(None)
    }
}

impl From<NodeValue> for Constant {
    fn from(value: NodeValue) -> Self {
        Self(Some(value))
    }
}

impl Value for Constant {
    fn calculate(&self, _context: &dyn ValueCalculationContext) -> ValueResult {
        Ok(self.0)
    }

    fn structural_key(&self) -> Option<String> {
        Some(match self.0 {
            Some(v) => format!("Constant({:?},{:?})", v.minimum(), v.maximum()),
            None => "Constant(null)".to_string(),
        })
    }
}

/// The value of a stat's node.
///
/// Reads the main path unless a path is given.
#[derive(Debug, Clone)]
pub struct StatValue {
    stat: Stat,
    node_type: NodeType,
    path: Option<PathDefinition>,
}

impl StatValue {
    pub fn new(stat: Stat) -> Self {
        Self::of(stat, NodeType::Total)
    }

    pub fn of(stat: Stat, node_type: NodeType) -> Self {
        Self {
            stat,
            node_type,
            path: None,
        }
    }

    pub fn on_path(stat: Stat, node_type: NodeType, path: PathDefinition) -> Self {
        Self {
            stat,
            node_type,
            path: Some(path),
        }
    }
}

impl Value for StatValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let main = PathDefinition::main();
        let path = self.path.as_ref().unwrap_or(&main);
        context.get_value(&self.stat, self.node_type, path)
    }

    fn structural_key(&self) -> Option<String> {
        Some(format!("Stat({},{:?},{:?})", self.stat, self.node_type, self.path))
    }
}

/// `multiplier` for every full or partial `divisor` of a stat's total.
///
/// # Examples
///
/// ```rust
/// use statgraph::value::PerStatValue;
/// use statgraph::Stat;
///
/// // 1% per 5 dexterity
/// let per_dex = PerStatValue::new(Stat::new("Dexterity"), 1.0, 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct PerStatValue {
    stat: Stat,
    multiplier: f64,
    divisor: f64,
}

impl PerStatValue {
    pub fn new(stat: Stat, multiplier: f64, divisor: f64) -> Self {
        Self {
            stat,
            multiplier,
            divisor,
        }
    }
}

impl Value for PerStatValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let total = context.total(&self.stat)?;
        Ok(total.map(|v| (v / self.divisor).select(f64::ceil) * self.multiplier))
    }

    fn structural_key(&self) -> Option<String> {
        Some(format!(
            "PerStat({},{:?},{:?})",
            self.stat, self.multiplier, self.divisor
        ))
    }
}

/// `then` if the condition is true, `otherwise` if not.
///
/// An unknown condition counts as false.
#[derive(Debug, Clone)]
pub struct ConditionalValue {
    condition: ValueRef,
    then: ValueRef,
    otherwise: ValueRef,
}

impl ConditionalValue {
    pub fn new(condition: ValueRef, then: ValueRef, otherwise: ValueRef) -> Self {
        Self {
            condition,
            then,
            otherwise,
        }
    }

    /// `value` if the condition holds, unknown otherwise.
    pub fn when(condition: ValueRef, value: ValueRef) -> Self {
        Self::new(condition, value, Arc::new(Constant::unknown()))
    }
}

impl Value for ConditionalValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        if is_true(self.condition.calculate(context)?) {
            self.then.calculate(context)
        } else {
            self.otherwise.calculate(context)
        }
    }
}

/// Conjunction of conditions. Evaluates to 1 or 0, never unknown.
#[derive(Debug, Clone)]
pub struct AndValue(Vec<ValueRef>);

impl AndValue {
    pub fn new(conditions: Vec<ValueRef>) -> Self {
        Self(conditions)
    }
}

impl Value for AndValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        for condition in &self.0 {
            if !is_true(condition.calculate(context)?) {
                return Ok(Some(NodeValue::from(false)));
            }
        }
        Ok(Some(NodeValue::from(true)))
    }
}

type CalculateFn = dyn Fn(&dyn ValueCalculationContext) -> ValueResult + Send + Sync;

/// A value backed by a closure.
///
/// # Examples
///
/// ```rust
/// use statgraph::value::FunctionalValue;
/// use statgraph::{NodeValue, Stat};
///
/// let strength = Stat::new("Strength");
/// // +1 life per 2 strength
/// let life_from_strength = FunctionalValue::new("Strength / 2", move |ctx| {
///     Ok(ctx.total(&strength)?.map(|v| v / 2.0))
/// });
/// ```
#[derive(Clone)]
pub struct FunctionalValue {
    description: String,
    calculate: Arc<CalculateFn>,
}

impl FunctionalValue {
    pub fn new<F>(description: impl Into<String>, calculate: F) -> Self
    where
        F: Fn(&dyn ValueCalculationContext) -> ValueResult + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            calculate: Arc::new(calculate),
        }
    }
}

impl fmt::Debug for FunctionalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionalValue({})", self.description)
    }
}

impl Value for FunctionalValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        (self.calculate)(context)
    }
}

pub(crate) fn is_true(value: Option<NodeValue>) -> bool {
    value.map_or(false, |v| v.is_true())
}

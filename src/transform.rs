//! Behaviors and value transformations.
//!
//! A behavior lets the modifiers of one stat change *how* other nodes are
//! computed. While the stat carrying it has at least one modifier, the
//! behavior intercepts evaluation of its affected `(stat, node type)`
//! pairs: the node's value expression is passed through the behavior's
//! transformation, which returns a new expression wrapping the old one.
//!
//! Transformations are pure. They may read other nodes and may evaluate
//! the wrapped value in a decorated context, but never touch the graph.

use crate::aggregation::NodeType;
use crate::context::{ModifiedValuesContext, ValueCalculationContext};
use crate::error::StatError;
use crate::modifier::Form;
use crate::node_value::{self, NodeValue};
use crate::path::PathDefinition;
use crate::stat::{DataType, Stat};
use crate::value::{is_true, Value, ValueRef, ValueResult};
use std::fmt;
use std::sync::Arc;

/// Turns a value expression into a new one.
///
/// Closures `Fn(ValueRef) -> ValueRef` implement this trait.
///
/// # Examples
///
/// ```rust
/// use statgraph::transform::ValueTransformation;
/// use statgraph::value::{Constant, ValueRef};
/// use std::sync::Arc;
///
/// let replace_with_five = |_: ValueRef| -> ValueRef { Arc::new(Constant::new(5.0)) };
/// let _transformed = replace_with_five.transform(Arc::new(Constant::unknown()));
/// ```
pub trait ValueTransformation: Send + Sync {
    fn transform(&self, value: ValueRef) -> ValueRef;
}

impl<F> ValueTransformation for F
where
    F: Fn(ValueRef) -> ValueRef + Send + Sync,
{
    fn transform(&self, value: ValueRef) -> ValueRef {
        self(value)
    }
}

/// Which paths of an affected stat a behavior applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BehaviorPathInteraction {
    /// Only the main path. The behavior transforms the scalar result.
    All,
    /// Every path.
    AllPaths,
    /// Paths that did not pass through a conversion.
    NonConversionPaths,
    /// Paths whose last conversion stat is the given stat.
    ConversionPathsOnly(Stat),
}

impl BehaviorPathInteraction {
    pub fn matches(&self, path: &PathDefinition) -> bool {
        match self {
            Self::All => path.is_main_path(),
            Self::AllPaths => true,
            Self::NonConversionPaths => !path.is_conversion_path(),
            Self::ConversionPathsOnly(stat) => path.last_conversion() == Some(stat),
        }
    }
}

#[derive(Clone)]
struct BehaviorInner {
    key: String,
    affected_stats: Vec<Stat>,
    affected_node_types: Vec<NodeType>,
    path_interaction: BehaviorPathInteraction,
    transformation: Arc<dyn ValueTransformation>,
    path_source: Option<Stat>,
}

/// A value transformation registered against `(stat, node type)` pairs.
///
/// Behaviors are identified by their key: the same behavior contributed by
/// several stats is only applied once.
///
/// # Examples
///
/// ```rust
/// use statgraph::transform::{Behavior, BehaviorPathInteraction};
/// use statgraph::value::{Constant, ValueRef};
/// use statgraph::{NodeType, Stat};
/// use std::sync::Arc;
///
/// let transformed = Stat::new("transformed");
/// let behavior = Behavior::new(
///     "transformed.Subtotal=5",
///     vec![transformed],
///     vec![NodeType::Subtotal],
///     BehaviorPathInteraction::All,
///     |_: ValueRef| -> ValueRef { Arc::new(Constant::new(5.0)) },
/// );
/// let carrier = Stat::new("stat").with_behaviors(vec![behavior]);
/// ```
#[derive(Clone)]
pub struct Behavior(Arc<BehaviorInner>);

impl Behavior {
    pub fn new(
        key: impl Into<String>,
        affected_stats: Vec<Stat>,
        affected_node_types: Vec<NodeType>,
        path_interaction: BehaviorPathInteraction,
        transformation: impl ValueTransformation + 'static,
    ) -> Self {
        Self(Arc::new(BehaviorInner {
            key: key.into(),
            affected_stats,
            affected_node_types,
            path_interaction,
            transformation: Arc::new(transformation),
            path_source: None,
        }))
    }

    /// While active, the paths of `source` (extended by `source`) become
    /// paths of every affected stat.
    pub fn with_path_source(mut self, source: Stat) -> Self {
        Arc::make_mut(&mut self.0).path_source = Some(source);
        self
    }

    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn affected_stats(&self) -> &[Stat] {
        &self.0.affected_stats
    }

    pub fn affected_node_types(&self) -> &[NodeType] {
        &self.0.affected_node_types
    }

    pub fn path_interaction(&self) -> &BehaviorPathInteraction {
        &self.0.path_interaction
    }

    pub fn path_source(&self) -> Option<&Stat> {
        self.0.path_source.as_ref()
    }

    pub fn transformation(&self) -> &dyn ValueTransformation {
        self.0.transformation.as_ref()
    }

    /// Whether this behavior intercepts the node `(stat, node_type, path)`.
    pub fn affects(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> bool {
        self.0.affected_node_types.contains(&node_type)
            && self.0.affected_stats.contains(stat)
            && self.0.path_interaction.matches(path)
    }
}

impl PartialEq for Behavior {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for Behavior {}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Behavior({})", self.0.key)
    }
}

/// Adds the modifiers of `form` applying to another stat to the values of
/// the affected stat, optionally only while a condition stat is true.
///
/// Use on the node type that aggregates `form` (for example
/// `NodeType::Increase` for `Form::Increase`).
#[derive(Debug, Clone)]
pub struct AffectedByModifiersToOtherStat {
    other: Stat,
    form: Form,
    condition: Option<Stat>,
}

impl AffectedByModifiersToOtherStat {
    pub fn new(other: Stat, form: Form) -> Self {
        Self {
            other,
            form,
            condition: None,
        }
    }

    pub fn when(mut self, condition: Stat) -> Self {
        self.condition = Some(condition);
        self
    }
}

impl ValueTransformation for AffectedByModifiersToOtherStat {
    fn transform(&self, value: ValueRef) -> ValueRef {
        Arc::new(AffectedByOtherValue {
            settings: self.clone(),
            wrapped: value,
        })
    }
}

#[derive(Debug)]
struct AffectedByOtherValue {
    settings: AffectedByModifiersToOtherStat,
    wrapped: ValueRef,
}

impl Value for AffectedByOtherValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        if let Some(condition) = &self.settings.condition {
            if !is_true(context.total(condition)?) {
                return self.wrapped.calculate(context);
            }
        }
        let decorated = ModifiedValuesContext::new(context, |inner, form, paths| {
            let mut values = inner.get_values(form, paths)?;
            if form == self.settings.form {
                let other: Vec<_> = paths
                    .iter()
                    .map(|(_, path)| (self.settings.other.clone(), path.clone()))
                    .collect();
                values.extend(inner.get_values(form, &other)?);
            }
            Ok(values)
        });
        self.wrapped.calculate(&decorated)
    }
}

/// Adds the path totals of related stats to the wrapped value.
///
/// Use on `NodeType::UncappedSubtotal` to make a stat the sum of several
/// others, e.g. a combined damage-over-time value.
#[derive(Debug, Clone)]
pub struct CombinedPathTotal {
    stats: Vec<Stat>,
}

impl CombinedPathTotal {
    pub fn new(stats: Vec<Stat>) -> Self {
        Self { stats }
    }
}

impl ValueTransformation for CombinedPathTotal {
    fn transform(&self, value: ValueRef) -> ValueRef {
        Arc::new(CombinedPathTotalValue {
            stats: self.stats.clone(),
            wrapped: value,
        })
    }
}

#[derive(Debug)]
struct CombinedPathTotalValue {
    stats: Vec<Stat>,
    wrapped: ValueRef,
}

impl Value for CombinedPathTotalValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let mut values = vec![self.wrapped.calculate(context)?];
        for stat in &self.stats {
            values.extend(context.path_values(stat, NodeType::PathTotal)?);
        }
        Ok(node_value::sum(values))
    }
}

/// Aggregates the modifiers of one form by maximum instead of sum.
///
/// All requested `(stat, path)` pairs must belong to the same stat.
#[derive(Debug, Clone, Copy)]
pub struct MaximumFormAggregating {
    form: Form,
}

impl MaximumFormAggregating {
    pub fn new(form: Form) -> Self {
        Self { form }
    }
}

impl ValueTransformation for MaximumFormAggregating {
    fn transform(&self, value: ValueRef) -> ValueRef {
        Arc::new(MaximumFormValue {
            form: self.form,
            wrapped: value,
        })
    }
}

#[derive(Debug)]
struct MaximumFormValue {
    form: Form,
    wrapped: ValueRef,
}

impl Value for MaximumFormValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let decorated = ModifiedValuesContext::new(context, |inner, form, paths| {
            if form != self.form {
                return inner.get_values(form, paths);
            }
            if let Some((first, _)) = paths.first() {
                if paths.iter().any(|(stat, _)| stat != first) {
                    let mut stats: Vec<_> = paths.iter().map(|(stat, _)| stat.id().clone()).collect();
                    stats.dedup();
                    return Err(StatError::MixedStatsInMaximum(stats));
                }
            }
            let maximum = inner
                .get_values(form, paths)?
                .into_iter()
                .flatten()
                .reduce(|a: NodeValue, b| a.combine(b, f64::max));
            Ok(maximum.into_iter().map(Some).collect())
        });
        self.wrapped.calculate(&decorated)
    }
}

/// Rounds the wrapped value.
#[derive(Debug, Clone, Copy)]
pub struct Rounded {
    decimals: i32,
}

impl Rounded {
    pub fn new(decimals: i32) -> Self {
        Self { decimals }
    }

    /// Two decimals for floats, none for integers and booleans.
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Float => Self::new(2),
            DataType::Integer | DataType::Boolean => Self::new(0),
        }
    }
}

impl ValueTransformation for Rounded {
    fn transform(&self, value: ValueRef) -> ValueRef {
        Arc::new(RoundedValue {
            decimals: self.decimals,
            wrapped: value,
        })
    }
}

#[derive(Debug)]
struct RoundedValue {
    decimals: i32,
    wrapped: ValueRef,
}

impl Value for RoundedValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        Ok(self
            .wrapped
            .calculate(context)?
            .map(|v| v.round_to(self.decimals)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::FixedContext;
    use crate::value::{Constant, FunctionalValue};

    fn sum_of_base_add(stat: Stat) -> ValueRef {
        Arc::new(FunctionalValue::new("sum", move |ctx| {
            Ok(node_value::sum(ctx.form_values(
                Form::BaseAdd,
                &stat,
                &PathDefinition::main(),
            )?))
        }))
    }

    #[test]
    fn test_path_interaction() {
        let physical = Stat::new("Physical");
        let main = PathDefinition::main();
        let given = PathDefinition::new(&crate::ModifierSource::given());
        let converted = main.extended_by(physical.clone());

        assert!(BehaviorPathInteraction::All.matches(&main));
        assert!(!BehaviorPathInteraction::All.matches(&given));
        assert!(BehaviorPathInteraction::AllPaths.matches(&converted));
        assert!(BehaviorPathInteraction::NonConversionPaths.matches(&given));
        assert!(!BehaviorPathInteraction::NonConversionPaths.matches(&converted));
        assert!(BehaviorPathInteraction::ConversionPathsOnly(physical).matches(&converted));
        assert!(!BehaviorPathInteraction::ConversionPathsOnly(Stat::new("Fire")).matches(&converted));
    }

    #[test]
    fn test_behavior_identity_is_key() {
        let a = Behavior::new("k", vec![], vec![], BehaviorPathInteraction::All, |v: ValueRef| v);
        let b = Behavior::new(
            "k",
            vec![Stat::new("x")],
            vec![NodeType::Total],
            BehaviorPathInteraction::AllPaths,
            |v: ValueRef| v,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_affected_by_other_stat() {
        let fire = Stat::new("Fire");
        let elemental = Stat::new("Elemental");
        let flag = Stat::new("Flag");
        let context = FixedContext::new()
            .with_form_values(Form::BaseAdd, &fire, &[1.0])
            .with_form_values(Form::BaseAdd, &elemental, &[10.0]);

        let transformation = AffectedByModifiersToOtherStat::new(elemental.clone(), Form::BaseAdd);
        let value = transformation.transform(sum_of_base_add(fire.clone()));
        assert_eq!(value.calculate(&context).unwrap(), Some(NodeValue::from(11.0)));

        let conditional = AffectedByModifiersToOtherStat::new(elemental, Form::BaseAdd).when(flag.clone());
        let value = conditional.transform(sum_of_base_add(fire.clone()));
        assert_eq!(value.calculate(&context).unwrap(), Some(NodeValue::from(1.0)));

        let context = context.with_total(&flag, 1.0);
        assert_eq!(value.calculate(&context).unwrap(), Some(NodeValue::from(11.0)));
    }

    #[test]
    fn test_combined_path_total() {
        let bleed = Stat::new("Bleed");
        let poison = Stat::new("Poison");
        let context = FixedContext::new()
            .with_node(&bleed, NodeType::PathTotal, PathDefinition::main(), 4.0)
            .with_node(&poison, NodeType::PathTotal, PathDefinition::main(), 6.0);
        let value = CombinedPathTotal::new(vec![bleed, poison]).transform(Arc::new(Constant::unknown()));
        assert_eq!(value.calculate(&context).unwrap(), Some(NodeValue::from(10.0)));
    }

    #[test]
    fn test_maximum_form_aggregation() {
        let stat = Stat::new("Aura");
        let context = FixedContext::new().with_form_values(Form::BaseAdd, &stat, &[3.0, 7.0, 5.0]);
        let value = MaximumFormAggregating::new(Form::BaseAdd).transform(sum_of_base_add(stat));
        assert_eq!(value.calculate(&context).unwrap(), Some(NodeValue::from(7.0)));
    }

    #[test]
    fn test_maximum_over_mixed_stats_fails() {
        let a = Stat::new("A");
        let b = Stat::new("B");
        let mixed: ValueRef = Arc::new(FunctionalValue::new("mixed", move |ctx| {
            let paths = [
                (a.clone(), PathDefinition::main()),
                (b.clone(), PathDefinition::main()),
            ];
            Ok(node_value::sum(ctx.get_values(Form::BaseSet, &paths)?))
        }));
        let value = MaximumFormAggregating::new(Form::BaseSet).transform(mixed);
        let err = value.calculate(&FixedContext::new()).unwrap_err();
        assert!(matches!(err, StatError::MixedStatsInMaximum(ids) if ids.len() == 2));
    }

    #[test]
    fn test_rounding() {
        let value = Rounded::for_data_type(DataType::Float).transform(Arc::new(Constant::new(1.23456)));
        assert_eq!(value.calculate(&FixedContext::new()).unwrap(), Some(NodeValue::from(1.23)));
        let value = Rounded::for_data_type(DataType::Integer).transform(Arc::new(Constant::new(2.5)));
        assert_eq!(value.calculate(&FixedContext::new()).unwrap(), Some(NodeValue::from(3.0)));
    }
}

//! The aggregation pipeline.
//!
//! Every stat is computed through a fixed chain of stages ("node types"):
//!
//! ```text
//! Total = TotalOverride ?? Subtotal
//! Subtotal = clip(UncappedSubtotal, Minimum.Total, Maximum.Total)
//! UncappedSubtotal = sum of PathTotal over the stat's paths
//! PathTotal = Base * (1 + Increase / 100) * More
//! Base = BaseOverride ?? (BaseSet + BaseAdd)
//! ```
//!
//! This module defines the stages and the natural value of each, before
//! behaviors get to wrap it.

use crate::context::ValueCalculationContext;
use crate::modifier::Form;
use crate::node_value::{self, NodeValue};
use crate::path::PathDefinition;
use crate::source::ModifierSource;
use crate::stat::{ExplicitRegistrationType, Stat};
use crate::value::{Value, ValueRef, ValueResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A stage of the aggregation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Total,
    Subtotal,
    UncappedSubtotal,
    PathTotal,
    TotalOverride,
    Base,
    BaseOverride,
    BaseSet,
    BaseAdd,
    Increase,
    More,
}

impl NodeType {
    pub const ALL: [NodeType; 11] = [
        NodeType::Total,
        NodeType::Subtotal,
        NodeType::UncappedSubtotal,
        NodeType::PathTotal,
        NodeType::TotalOverride,
        NodeType::Base,
        NodeType::BaseOverride,
        NodeType::BaseSet,
        NodeType::BaseAdd,
        NodeType::Increase,
        NodeType::More,
    ];

    /// Whether a node of this type exists once per path. The others only
    /// exist on the main path.
    pub fn is_path_specific(self) -> bool {
        matches!(
            self,
            NodeType::PathTotal
                | NodeType::Base
                | NodeType::BaseOverride
                | NodeType::BaseSet
                | NodeType::BaseAdd
                | NodeType::Increase
                | NodeType::More
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Whether a modifier of `form` from `source` applies to a stat on `path`.
///
/// Base forms only feed the path opened by their own canonical source and
/// never conversion paths. Multipliers apply to every path whose source
/// they influence. Total overrides must be global.
pub(crate) fn applies_to(form: Form, source: &ModifierSource, path: &PathDefinition) -> bool {
    let canonical = source.canonical();
    if form.is_base() {
        !path.is_conversion_path() && &canonical == path.source()
    } else if form == Form::TotalOverride {
        canonical.is_global()
    } else {
        path.source().influencing_sources().contains(&canonical)
    }
}

/// The natural value of a node, before behaviors are applied.
pub(crate) fn natural_value(stat: &Stat, node_type: NodeType, path: &PathDefinition) -> ValueRef {
    Arc::new(AggregationValue {
        stat: stat.clone(),
        node_type,
        path: path.clone(),
    })
}

#[derive(Debug)]
struct AggregationValue {
    stat: Stat,
    node_type: NodeType,
    path: PathDefinition,
}

impl AggregationValue {
    fn node(&self, ctx: &dyn ValueCalculationContext, node_type: NodeType) -> ValueResult {
        ctx.get_value(&self.stat, node_type, &self.path)
    }

    fn forms(&self, ctx: &dyn ValueCalculationContext, form: Form) -> Result<Vec<Option<NodeValue>>, crate::StatError> {
        ctx.form_values(form, &self.stat, &self.path)
    }

    /// Values of `form` for the stat and every conversion stat of the path.
    fn forms_along_path(
        &self,
        ctx: &dyn ValueCalculationContext,
        form: Form,
    ) -> Result<Vec<Option<NodeValue>>, crate::StatError> {
        let pairs: Vec<_> = self
            .path
            .conversion_stats()
            .iter()
            .chain(std::iter::once(&self.stat))
            .map(|stat| (stat.clone(), self.path.clone()))
            .collect();
        ctx.get_values(form, &pairs)
    }

    fn total(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        if let Some(value) = self.node(ctx, NodeType::TotalOverride)? {
            return Ok(Some(value));
        }
        let subtotal = self.node(ctx, NodeType::Subtotal)?;
        if subtotal.is_some() {
            return Ok(subtotal);
        }
        match self.stat.explicit_registration() {
            Some(ExplicitRegistrationType::UserSpecifiedValue {
                default_value: Some(default),
            }) => Ok(Some(NodeValue::from(default))),
            _ => Ok(None),
        }
    }

    fn subtotal(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        let uncapped = self.node(ctx, NodeType::UncappedSubtotal)?;
        if uncapped.is_none() {
            return Ok(None);
        }
        let minimum = match self.stat.minimum() {
            Some(stat) => ctx.total(stat)?,
            None => None,
        };
        let maximum = match self.stat.maximum() {
            Some(stat) => ctx.total(stat)?,
            None => None,
        };
        Ok(node_value::clip(uncapped, minimum, maximum))
    }

    fn uncapped_subtotal(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        let values = ctx.path_values(&self.stat, NodeType::PathTotal)?;
        Ok(node_value::sum(values))
    }

    fn path_total(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        let Some(base) = self.node(ctx, NodeType::Base)? else {
            return Ok(None);
        };
        let increase = self
            .node(ctx, NodeType::Increase)?
            .unwrap_or_else(NodeValue::zero);
        let more = self
            .node(ctx, NodeType::More)?
            .unwrap_or_else(|| NodeValue::from(1.0));
        Ok(Some(base * (increase / 100.0 + 1.0) * more))
    }

    fn base(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        if let Some(value) = self.node(ctx, NodeType::BaseOverride)? {
            return Ok(Some(value));
        }
        let set = self.node(ctx, NodeType::BaseSet)?;
        let add = self.node(ctx, NodeType::BaseAdd)?;
        Ok(node_value::sum([set, add]))
    }

    fn base_add(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        let mut values = self.forms(ctx, Form::BaseAdd)?;
        values.extend(
            self.forms(ctx, Form::BaseSubtract)?
                .into_iter()
                .map(|v| v.map(|v| -v)),
        );
        values.extend(
            self.forms(ctx, Form::MinBaseAdd)?
                .into_iter()
                .map(|v| v.map(|v| NodeValue::new(v.minimum(), 0.0))),
        );
        values.extend(
            self.forms(ctx, Form::MaxBaseAdd)?
                .into_iter()
                .map(|v| v.map(|v| NodeValue::new(0.0, v.maximum()))),
        );
        Ok(node_value::sum(values))
    }

    fn increase(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        let mut values = self.forms_along_path(ctx, Form::Increase)?;
        values.extend(
            self.forms_along_path(ctx, Form::Reduce)?
                .into_iter()
                .map(|v| v.map(|v| -v)),
        );
        Ok(node_value::sum(values))
    }

    fn more(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        let more = self
            .forms_along_path(ctx, Form::More)?
            .into_iter()
            .map(|v| v.map(|v| v / 100.0 + 1.0));
        let less = self
            .forms_along_path(ctx, Form::Less)?
            .into_iter()
            .map(|v| v.map(|v| -(v / 100.0) + 1.0));
        Ok(node_value::product(more.chain(less)))
    }
}

/// Override aggregation: unknown without values, zero wins, otherwise the
/// first known value.
fn aggregate_override(values: Vec<Option<NodeValue>>) -> Option<NodeValue> {
    let known: Vec<NodeValue> = values.into_iter().flatten().collect();
    if known.iter().any(|v| !v.is_true()) {
        return Some(NodeValue::zero());
    }
    known.first().copied()
}

impl Value for AggregationValue {
    fn calculate(&self, ctx: &dyn ValueCalculationContext) -> ValueResult {
        match self.node_type {
            NodeType::Total => self.total(ctx),
            NodeType::Subtotal => self.subtotal(ctx),
            NodeType::UncappedSubtotal => self.uncapped_subtotal(ctx),
            NodeType::PathTotal => self.path_total(ctx),
            NodeType::TotalOverride => Ok(aggregate_override(
                self.forms(ctx, Form::TotalOverride)?,
            )),
            NodeType::Base => self.base(ctx),
            NodeType::BaseOverride => Ok(aggregate_override(
                self.forms(ctx, Form::BaseOverride)?,
            )),
            NodeType::BaseSet => Ok(node_value::sum(self.forms(ctx, Form::BaseSet)?)),
            NodeType::BaseAdd => self.base_add(ctx),
            NodeType::Increase => self.increase(ctx),
            NodeType::More => self.more(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::FixedContext;
    use crate::source::ItemSlot;

    fn evaluate(context: &FixedContext, stat: &Stat, node_type: NodeType) -> Option<NodeValue> {
        natural_value(stat, node_type, &context.current_path())
            .calculate(context)
            .unwrap()
    }

    #[test]
    fn test_path_total_defaults() {
        let stat = Stat::new("Evasion");
        let path = PathDefinition::main();
        let context = FixedContext::new().with_node(&stat, NodeType::Base, path.clone(), 10.0);
        assert_eq!(evaluate(&context, &stat, NodeType::PathTotal), Some(NodeValue::from(10.0)));

        let context = context
            .with_node(&stat, NodeType::Increase, path.clone(), 50.0)
            .with_node(&stat, NodeType::More, path, 2.0);
        assert_eq!(evaluate(&context, &stat, NodeType::PathTotal), Some(NodeValue::from(30.0)));
    }

    #[test]
    fn test_path_total_without_base_is_unknown() {
        let stat = Stat::new("Evasion");
        let context = FixedContext::new().with_node(&stat, NodeType::Increase, PathDefinition::main(), 50.0);
        assert_eq!(evaluate(&context, &stat, NodeType::PathTotal), None);
    }

    #[test]
    fn test_base_prefers_override() {
        let stat = Stat::new("Armour");
        let path = PathDefinition::main();
        let context = FixedContext::new()
            .with_node(&stat, NodeType::BaseSet, path.clone(), 5.0)
            .with_node(&stat, NodeType::BaseAdd, path.clone(), 3.0);
        assert_eq!(evaluate(&context, &stat, NodeType::Base), Some(NodeValue::from(8.0)));

        let context = context.with_node(&stat, NodeType::BaseOverride, path, 1.0);
        assert_eq!(evaluate(&context, &stat, NodeType::Base), Some(NodeValue::from(1.0)));
    }

    #[test]
    fn test_base_add_folds_signed_forms() {
        let stat = Stat::new("Damage");
        let context = FixedContext::new()
            .with_form_values(Form::BaseAdd, &stat, &[10.0])
            .with_form_values(Form::BaseSubtract, &stat, &[3.0])
            .with_form_values(Form::MinBaseAdd, &stat, &[1.0])
            .with_form_values(Form::MaxBaseAdd, &stat, &[5.0]);
        assert_eq!(
            evaluate(&context, &stat, NodeType::BaseAdd),
            Some(NodeValue::new(8.0, 12.0))
        );
    }

    #[test]
    fn test_more_multiplies_separately() {
        let stat = Stat::new("Damage");
        let context = FixedContext::new()
            .with_form_values(Form::More, &stat, &[100.0, 50.0])
            .with_form_values(Form::Less, &stat, &[50.0]);
        assert_eq!(evaluate(&context, &stat, NodeType::More), Some(NodeValue::from(1.5)));
    }

    #[test]
    fn test_increase_and_reduce_add_up() {
        let stat = Stat::new("Damage");
        let context = FixedContext::new()
            .with_form_values(Form::Increase, &stat, &[30.0, 20.0])
            .with_form_values(Form::Reduce, &stat, &[10.0]);
        assert_eq!(evaluate(&context, &stat, NodeType::Increase), Some(NodeValue::from(40.0)));
    }

    #[test]
    fn test_override_zero_wins() {
        let stat = Stat::new("Damage");
        let context = FixedContext::new().with_form_values(Form::TotalOverride, &stat, &[5.0, 0.0]);
        assert_eq!(evaluate(&context, &stat, NodeType::TotalOverride), Some(NodeValue::zero()));

        let context = FixedContext::new().with_form_values(Form::TotalOverride, &stat, &[5.0, 7.0]);
        assert_eq!(evaluate(&context, &stat, NodeType::TotalOverride), Some(NodeValue::from(5.0)));
        assert_eq!(evaluate(&FixedContext::new(), &stat, NodeType::TotalOverride), None);
    }

    #[test]
    fn test_subtotal_clips_to_bound_totals() {
        let stat = Stat::new("Resistance").with_bounds();
        let (Some(min), Some(max)) = (stat.minimum().cloned(), stat.maximum().cloned()) else {
            panic!("bounds missing");
        };
        let context = FixedContext::new()
            .with_node(&stat, NodeType::UncappedSubtotal, PathDefinition::main(), 90.0)
            .with_total(&max, 75.0);
        assert_eq!(evaluate(&context, &stat, NodeType::Subtotal), Some(NodeValue::from(75.0)));

        let context = context.with_total(&min, 80.0).with_total(&max, 100.0);
        assert_eq!(evaluate(&context, &stat, NodeType::Subtotal), Some(NodeValue::from(90.0)));
    }

    #[test]
    fn test_user_specified_default() {
        let stat = Stat::new("EnemyCount").with_explicit_registration(
            ExplicitRegistrationType::UserSpecifiedValue {
                default_value: Some(3.0),
            },
        );
        assert_eq!(evaluate(&FixedContext::new(), &stat, NodeType::Total), Some(NodeValue::from(3.0)));
    }

    #[test]
    fn test_applicability_rules() {
        let body = ModifierSource::item(ItemSlot::BodyArmour, "Coat");
        let body_path = PathDefinition::new(&body);
        let converted = PathDefinition::main().extended_by(Stat::new("Physical"));

        assert!(applies_to(Form::BaseSet, &body, &body_path));
        assert!(!applies_to(Form::BaseSet, &ModifierSource::global(), &body_path));
        assert!(!applies_to(Form::BaseAdd, &ModifierSource::global(), &converted));
        assert!(applies_to(Form::Increase, &ModifierSource::global(), &body_path));
        assert!(applies_to(Form::Increase, &ModifierSource::global(), &converted));
        assert!(!applies_to(Form::More, &body, &PathDefinition::main()));
        assert!(!applies_to(Form::TotalOverride, &body, &PathDefinition::main()));
    }
}

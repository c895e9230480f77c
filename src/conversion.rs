//! Stat conversion and gain.
//!
//! "Convert 50% of Physical to Fire" and "Gain 20% of Physical as extra
//! Fire" are modelled as ordinary stats whose behaviors reroute value:
//!
//! - `convert_to(source, target)`: percentage of `source` moved to `target`
//! - `gain_as(source, target)`: percentage of `source` added to `target`
//!   without reducing `source`
//! - `conversion(source)`: total percentage converted away from `source`
//! - `skill_conversion(source)`: the part of it granted by skills
//!
//! A conversion modifier is normally added to the `convert_to`,
//! `conversion` and `skill_conversion` stats at once, see
//! [`conversion_modifier_stats`].
//!
//! Value moved from `source` to `target` keeps its lineage: every path of
//! `source` reappears as a path of `target` extended by `source`, so
//! increases to `source` keep applying to the converted part and chains
//! of conversions never count a value twice.

use crate::aggregation::NodeType;
use crate::context::{FilteredPathsContext, ValueCalculationContext};
use crate::node_value::{self, NodeValue};
use crate::path::PathDefinition;
use crate::stat::Stat;
use crate::transform::{Behavior, BehaviorPathInteraction, ValueTransformation};
use crate::value::{Value, ValueRef, ValueResult};
use std::sync::Arc;

fn convert_to_id(source: &Stat, target: &Stat) -> String {
    format!("{source}.ConvertTo({target})")
}

fn gain_as_id(source: &Stat, target: &Stat) -> String {
    format!("{source}.GainAs({target})")
}

fn conversion_id(source: &Stat) -> String {
    format!("{source}.Conversion")
}

fn skill_conversion_id(source: &Stat) -> String {
    format!("{source}.SkillConversion")
}

/// The stat holding the percentage of `source` converted to `target`.
///
/// # Examples
///
/// ```rust
/// use statgraph::conversion::convert_to;
/// use statgraph::Stat;
///
/// let stat = convert_to(&Stat::new("Physical"), &Stat::new("Fire"));
/// assert_eq!(stat.id().as_str(), "Physical.ConvertTo(Fire)");
/// assert_eq!(stat.behaviors().len(), 4);
/// ```
pub fn convert_to(source: &Stat, target: &Stat) -> Stat {
    let source = source.without_behaviors();
    let target = target.without_behaviors();
    let behaviors = vec![
        target_base(&source, &target),
        target_uncapped_subtotal(&source, &target),
        source_path_total(&source),
        convert_to_uncapped_subtotal(&source, &target),
    ];
    Stat::new(convert_to_id(&source, &target)).with_behaviors(behaviors)
}

/// The stat holding the percentage of `source` gained as extra `target`.
pub fn gain_as(source: &Stat, target: &Stat) -> Stat {
    let source = source.without_behaviors();
    let target = target.without_behaviors();
    let behaviors = vec![
        target_base(&source, &target),
        target_uncapped_subtotal(&source, &target),
    ];
    Stat::new(gain_as_id(&source, &target)).with_behaviors(behaviors)
}

/// The stat holding the total percentage converted away from `source`.
pub fn conversion(source: &Stat) -> Stat {
    Stat::new(conversion_id(source))
}

/// The stat holding the percentage converted away from `source` by skills.
pub fn skill_conversion(source: &Stat) -> Stat {
    let plain = Stat::new(skill_conversion_id(source));
    let behavior = Behavior::new(
        format!("SkillConversionUncappedSubtotal({source})"),
        vec![plain.clone()],
        vec![NodeType::UncappedSubtotal],
        BehaviorPathInteraction::All,
        |value: ValueRef| -> ValueRef { Arc::new(SkillPathsOnlyValue { wrapped: value }) },
    );
    plain.with_behaviors(vec![behavior])
}

/// The stats a "convert X% of source to target" modifier applies to.
pub fn conversion_modifier_stats(source: &Stat, target: &Stat) -> Vec<Stat> {
    vec![
        convert_to(source, target),
        conversion(source),
        skill_conversion(source),
    ]
}

fn target_base(source: &Stat, target: &Stat) -> Behavior {
    let transformation = ConversionTargetBase {
        source: source.clone(),
        convert_to: Stat::new(convert_to_id(source, target)),
        gain_as: Stat::new(gain_as_id(source, target)),
    };
    Behavior::new(
        format!("ConversionTargetBase({source}, {target})"),
        vec![target.clone()],
        vec![NodeType::Base],
        BehaviorPathInteraction::ConversionPathsOnly(source.clone()),
        transformation,
    )
}

fn target_uncapped_subtotal(source: &Stat, target: &Stat) -> Behavior {
    Behavior::new(
        format!("ConversionTargetUncappedSubtotal({source}, {target})"),
        vec![target.clone()],
        vec![NodeType::UncappedSubtotal],
        BehaviorPathInteraction::All,
        |value: ValueRef| value,
    )
    .with_path_source(source.clone())
}

fn source_path_total(source: &Stat) -> Behavior {
    let transformation = ConversionSourcePathTotal {
        conversion: conversion(source),
    };
    Behavior::new(
        format!("ConversionSourcePathTotal({source})"),
        vec![source.clone()],
        vec![NodeType::PathTotal],
        BehaviorPathInteraction::AllPaths,
        transformation,
    )
}

fn convert_to_uncapped_subtotal(source: &Stat, target: &Stat) -> Behavior {
    let convert_to = Stat::new(convert_to_id(source, target));
    let transformation = ConvertToUncappedSubtotal {
        convert_to: convert_to.clone(),
        conversion: conversion(source),
        skill_conversion: Stat::new(skill_conversion_id(source)),
    };
    Behavior::new(
        format!("ConvertToUncappedSubtotal({source}, {target})"),
        vec![convert_to],
        vec![NodeType::UncappedSubtotal],
        BehaviorPathInteraction::All,
        transformation,
    )
}

/// Base of a target on a path ending in `source`: the source's base on the
/// path before the conversion times the converted and gained percentages.
#[derive(Debug, Clone)]
struct ConversionTargetBase {
    source: Stat,
    convert_to: Stat,
    gain_as: Stat,
}

impl ValueTransformation for ConversionTargetBase {
    fn transform(&self, value: ValueRef) -> ValueRef {
        Arc::new(ConversionTargetBaseValue {
            settings: self.clone(),
            wrapped: value,
        })
    }
}

#[derive(Debug)]
struct ConversionTargetBaseValue {
    settings: ConversionTargetBase,
    wrapped: ValueRef,
}

impl Value for ConversionTargetBaseValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let wrapped = self.wrapped.calculate(context)?;
        let path = context.current_path();
        if path.last_conversion() != Some(&self.settings.source) {
            return Ok(wrapped);
        }
        let source_base =
            context.get_value(&self.settings.source, NodeType::Base, &path.without_last_conversion())?;
        let Some(source_base) = source_base else {
            return Ok(wrapped);
        };
        let converted = context.total(&self.settings.convert_to)?.unwrap_or_else(NodeValue::zero);
        let gained = context.total(&self.settings.gain_as)?.unwrap_or_else(NodeValue::zero);
        let contribution = source_base * (converted + gained) / 100.0;
        Ok(node_value::sum([wrapped, Some(contribution)]))
    }
}

/// Path totals of a source keep only the unconverted share.
#[derive(Debug, Clone)]
struct ConversionSourcePathTotal {
    conversion: Stat,
}

impl ValueTransformation for ConversionSourcePathTotal {
    fn transform(&self, value: ValueRef) -> ValueRef {
        Arc::new(ConversionSourcePathTotalValue {
            conversion: self.conversion.clone(),
            wrapped: value,
        })
    }
}

#[derive(Debug)]
struct ConversionSourcePathTotalValue {
    conversion: Stat,
    wrapped: ValueRef,
}

impl Value for ConversionSourcePathTotalValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let Some(value) = self.wrapped.calculate(context)? else {
            return Ok(None);
        };
        let converted = context.total(&self.conversion)?.unwrap_or_else(NodeValue::zero);
        let remaining = (-(converted / 100.0) + 1.0).clip(NodeValue::zero(), NodeValue::from(1.0));
        Ok(Some(value * remaining))
    }
}

/// Scales a conversion down when all conversions of its source exceed 100%.
///
/// Skill conversions are honored first. If they alone reach 100% they are
/// scaled to exactly 100% and everything else is dropped, otherwise the
/// other conversions share the remainder proportionally.
#[derive(Debug, Clone)]
struct ConvertToUncappedSubtotal {
    convert_to: Stat,
    conversion: Stat,
    skill_conversion: Stat,
}

impl ValueTransformation for ConvertToUncappedSubtotal {
    fn transform(&self, value: ValueRef) -> ValueRef {
        Arc::new(ConvertToUncappedSubtotalValue {
            settings: self.clone(),
            wrapped: value,
        })
    }
}

#[derive(Debug)]
struct ConvertToUncappedSubtotalValue {
    settings: ConvertToUncappedSubtotal,
    wrapped: ValueRef,
}

impl ConvertToUncappedSubtotalValue {
    fn skill_value(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let skill_paths = FilteredPathsContext::new(context, |path: &PathDefinition| path.source().is_skill());
        let skill_paths: &dyn ValueCalculationContext = &skill_paths;
        let values = skill_paths.path_values(&self.settings.convert_to, NodeType::PathTotal)?;
        Ok(node_value::sum(values))
    }
}

impl Value for ConvertToUncappedSubtotalValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let Some(value) = self.wrapped.calculate(context)? else {
            return Ok(None);
        };
        let Some(conversion) = context.total(&self.settings.conversion)? else {
            return Ok(Some(value));
        };
        if conversion.maximum() <= 100.0 {
            return Ok(Some(value));
        }
        let skill_conversion = context
            .total(&self.settings.skill_conversion)?
            .unwrap_or_else(NodeValue::zero);
        let skill_value = self.skill_value(context)?.unwrap_or_else(NodeValue::zero);
        if skill_conversion.minimum() >= 100.0 {
            return Ok(Some(skill_value * 100.0 / skill_conversion));
        }
        let non_skill = value - skill_value;
        let remaining_share = (-skill_conversion + 100.0) / (conversion - skill_conversion);
        Ok(Some(skill_value + non_skill * remaining_share))
    }
}

/// Uncapped subtotal restricted to skill-sourced paths.
#[derive(Debug)]
struct SkillPathsOnlyValue {
    wrapped: ValueRef,
}

impl Value for SkillPathsOnlyValue {
    fn calculate(&self, context: &dyn ValueCalculationContext) -> ValueResult {
        let skill_paths = FilteredPathsContext::new(context, |path: &PathDefinition| path.source().is_skill());
        self.wrapped.calculate(&skill_paths)
    }
}

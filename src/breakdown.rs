//! Stat breakdown module.
//!
//! Contains `StatBreakdown`, a read-only snapshot of how a stat's total was
//! put together: the stage values of every path plus the main-path totals.
//! It serializes to JSON for debugging tools.

use crate::aggregation::NodeType;
use crate::calculator::Calculator;
use crate::error::StatError;
use crate::node_value::NodeValue;
use crate::path::PathDefinition;
use crate::stat::Stat;
use serde::Serialize;

/// Stage values of one path of a stat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathBreakdown {
    /// The path these values belong to.
    pub path: PathDefinition,

    pub base: Option<NodeValue>,

    /// Summed percentage of `Increase` modifiers.
    pub increase: Option<NodeValue>,

    /// Product of the `More` multipliers.
    pub more: Option<NodeValue>,

    pub path_total: Option<NodeValue>,
}

/// A computed stat with the values of every stage that contributed to it.
///
/// Paths are listed in the order the calculator enumerates them, main path
/// first.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Calculator, Form, Modifier, NodeValue, Stat};
///
/// let mut calculator = Calculator::new();
/// let life = Stat::new("Life");
/// calculator
///     .new_batch_update()
///     .add_modifier(Modifier::global(&life, Form::BaseAdd, 100.0))
///     .add_modifier(Modifier::global(&life, Form::Increase, 20.0))
///     .do_update()
///     .unwrap();
///
/// let breakdown = calculator.breakdown(&life).unwrap();
/// assert_eq!(breakdown.paths.len(), 1);
/// assert_eq!(breakdown.paths[0].increase, Some(NodeValue::from(20.0)));
/// assert_eq!(breakdown.total, Some(NodeValue::from(120.0)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatBreakdown {
    /// The stat, serialized as its key.
    pub stat: Stat,

    pub total: Option<NodeValue>,

    pub subtotal: Option<NodeValue>,

    /// Sum of all path totals before clipping.
    pub uncapped_subtotal: Option<NodeValue>,

    pub paths: Vec<PathBreakdown>,
}

impl StatBreakdown {
    /// Render the breakdown as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, StatError> {
        serde_json::to_string_pretty(self).map_err(|e| StatError::Serialization(e.to_string()))
    }

    /// The breakdown of `path`, if the stat has such a path.
    pub fn path(&self, path: &PathDefinition) -> Option<&PathBreakdown> {
        self.paths.iter().find(|entry| &entry.path == path)
    }
}

impl Calculator {
    /// Compute `stat` and collect its stage values.
    ///
    /// The nodes read here stay cached like any other node and are pruned
    /// on a later update once nothing depends on them.
    pub fn breakdown(&self, stat: &Stat) -> Result<StatBreakdown, StatError> {
        let total = self.value(stat, NodeType::Total)?;
        let subtotal = self.value(stat, NodeType::Subtotal)?;
        let uncapped_subtotal = self.value(stat, NodeType::UncappedSubtotal)?;

        let paths = self
            .paths(stat)
            .into_iter()
            .map(|path| {
                let value = |node_type| self.path_node(stat, node_type, &path).map(|n| n.value());
                Ok(PathBreakdown {
                    base: value(NodeType::Base)?,
                    increase: value(NodeType::Increase)?,
                    more: value(NodeType::More)?,
                    path_total: value(NodeType::PathTotal)?,
                    path: path.clone(),
                })
            })
            .collect::<Result<_, StatError>>()?;

        Ok(StatBreakdown {
            stat: stat.clone(),
            total,
            subtotal,
            uncapped_subtotal,
            paths,
        })
    }
}

//! Error types for stat computation.
//!
//! All errors that can occur while building modifiers, evaluating nodes
//! or applying batches are represented by the `StatError` enum.

use crate::stat::StatId;
use thiserror::Error;

/// Format a chain of node names as a readable string.
fn format_cycle_path(path: &[String]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.join(" -> ")
}

fn format_stats(stats: &[StatId]) -> String {
    stats
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during stat computation.
///
/// Builder misuse and misconfigured behaviors are raised immediately.
/// Unknown values are never an error: they propagate as `None`.
///
/// # Examples
///
/// ```rust
/// use statgraph::StatError;
///
/// let err = StatError::FieldAlreadySet("form");
/// assert_eq!(err.to_string(), "Modifier entry field already set: form");
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatError {
    /// A node was re-entered while it was being evaluated.
    ///
    /// Contains the chain of nodes, closed by the node that was re-entered.
    #[error("Cycle detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<String> },

    /// Evaluation recursed deeper than the configured limit.
    #[error("Evaluation depth limit of {0} exceeded")]
    EvaluationDepthExceeded(usize),

    /// A single-assignment field of a modifier entry was set twice.
    #[error("Modifier entry field already set: {0}")]
    FieldAlreadySet(&'static str),

    /// A multi-entry operation was given a list whose length does not
    /// match the number of existing entries.
    #[error("Expected {expected} entries but got {actual}")]
    MismatchedEntryCount { expected: usize, actual: usize },

    /// Two accumulators with more than one entry each were merged.
    #[error("At most one side of a merge may hold more than one entry ({left} and {right} given)")]
    MultipleMultiEntryModifiers { left: usize, right: usize },

    /// A maximum aggregation was asked to compare values of different stats.
    #[error("Maximum aggregation over mixed stats: {}", format_stats(.0))]
    MixedStatsInMaximum(Vec<StatId>),

    /// Configuration could not be parsed or holds invalid values.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A breakdown could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StatError::MismatchedEntryCount {
            expected: 2,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Expected 2 entries but got 3");
    }

    #[test]
    fn test_cycle_error_display() {
        let err = StatError::Cycle {
            path: vec![
                "A.Total".to_string(),
                "B.Total".to_string(),
                "A.Total".to_string(),
            ],
        };
        let display = err.to_string();
        assert!(display.contains("Cycle detected"));
        assert!(display.contains("A.Total -> B.Total -> A.Total"));
    }

    #[test]
    fn test_mixed_stats_display() {
        let err = StatError::MixedStatsInMaximum(vec![StatId::from("a"), StatId::from("b")]);
        assert!(err.to_string().ends_with("a, b"));
    }

    #[test]
    fn test_empty_cycle_display() {
        let err = StatError::Cycle { path: Vec::new() };
        assert!(err.to_string().contains("(empty cycle)"));
    }
}

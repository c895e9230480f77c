//! Calculator configuration.

use crate::error::StatError;
use crate::node_value::DEFAULT_TOLERANCE;
use serde::{Deserialize, Serialize};

/// Tuning knobs of a `Calculator`.
///
/// Missing fields fall back to their defaults when deserializing.
///
/// # Examples
///
/// ```rust
/// use statgraph::CalculatorConfig;
///
/// let config = CalculatorConfig::from_json_str(r#"{ "prune_unused_nodes": false }"#).unwrap();
/// assert!(!config.prune_unused_nodes);
/// assert_eq!(config.max_evaluation_depth, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    /// Drop cached nodes of stats without modifiers once nothing observes
    /// or reads them.
    pub prune_unused_nodes: bool,
    /// Values closer than this are considered unchanged.
    pub value_tolerance: f64,
    /// Maximum nesting of node evaluations.
    pub max_evaluation_depth: usize,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            prune_unused_nodes: true,
            value_tolerance: DEFAULT_TOLERANCE,
            max_evaluation_depth: 4096,
        }
    }
}

impl CalculatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, StatError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| StatError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StatError> {
        if !self.value_tolerance.is_finite() || self.value_tolerance < 0.0 {
            return Err(StatError::InvalidConfig(format!(
                "value_tolerance must be a finite non-negative number, got {}",
                self.value_tolerance
            )));
        }
        if self.max_evaluation_depth == 0 {
            return Err(StatError::InvalidConfig(
                "max_evaluation_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, StatError> {
        serde_json::to_string_pretty(self).map_err(|e| StatError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CalculatorConfig::default();
        assert!(config.prune_unused_nodes);
        assert_eq!(config.value_tolerance, 1e-10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = CalculatorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CalculatorConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        let err = CalculatorConfig::from_json_str("{ prune").unwrap_err();
        assert!(matches!(err, StatError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_values() {
        let err = CalculatorConfig::from_json_str(r#"{ "max_evaluation_depth": 0 }"#).unwrap_err();
        assert!(matches!(err, StatError::InvalidConfig(_)));
        let err = CalculatorConfig::from_json_str(r#"{ "value_tolerance": -1.0 }"#).unwrap_err();
        assert!(matches!(err, StatError::InvalidConfig(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let config = CalculatorConfig {
            prune_unused_nodes: false,
            ..CalculatorConfig::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(CalculatorConfig::from_json_str(&json).unwrap(), config);
    }
}

//! Numeric values flowing through the calculation graph.
//!
//! A `NodeValue` is a closed range `[minimum, maximum]`. Most stats carry a
//! single number (both bounds equal), damage stats carry real ranges.
//! "Unknown" is not a `NodeValue` but `Option::None`: every helper in this
//! module treats it as absorbing, except the aggregation folds (`sum` and
//! `product`), which skip unknown elements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Tolerance used by `PartialEq` on `NodeValue`.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// A numeric range with component-wise arithmetic.
///
/// # Examples
///
/// ```rust
/// use statgraph::NodeValue;
///
/// let a = NodeValue::new(1.0, 3.0);
/// let b = NodeValue::from(2.0);
///
/// assert_eq!(a + b, NodeValue::new(3.0, 5.0));
/// assert_eq!(a * 2.0, NodeValue::new(2.0, 6.0));
/// assert_eq!(NodeValue::from(0.1 + 0.2), NodeValue::from(0.3));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeValue {
    minimum: f64,
    maximum: f64,
}

impl NodeValue {
    /// Create a range. The bounds are taken as given.
    pub fn new(minimum: f64, maximum: f64) -> Self {
        Self { minimum, maximum }
    }

    /// Create a value whose bounds are both zero.
    pub fn zero() -> Self {
        Self::from(0.0)
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// The representative scalar of this value: the minimum for single
    /// values, the mean for ranges.
    pub fn single(&self) -> f64 {
        if self.minimum == self.maximum {
            self.minimum
        } else {
            (self.minimum + self.maximum) / 2.0
        }
    }

    /// Whether this value counts as "true" when used as a condition.
    pub fn is_true(&self) -> bool {
        self.minimum != 0.0 || self.maximum != 0.0
    }

    /// Component-wise equality within `tolerance`.
    pub fn almost_equals(&self, other: &NodeValue, tolerance: f64) -> bool {
        almost_equal(self.minimum, other.minimum, tolerance)
            && almost_equal(self.maximum, other.maximum, tolerance)
    }

    /// Apply `f` to both bounds.
    pub fn select(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.minimum), f(self.maximum))
    }

    /// Combine both bounds with the matching bounds of `other`.
    pub fn combine(self, other: NodeValue, f: impl Fn(f64, f64) -> f64) -> Self {
        Self::new(f(self.minimum, other.minimum), f(self.maximum, other.maximum))
    }

    /// Clamp both bounds into `[minimum, maximum]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::NodeValue;
    ///
    /// let v = NodeValue::new(5.0, 25.0);
    /// let clipped = v.clip(NodeValue::from(10.0), NodeValue::from(20.0));
    /// assert_eq!(clipped, NodeValue::new(10.0, 20.0));
    /// ```
    pub fn clip(self, minimum: NodeValue, maximum: NodeValue) -> Self {
        self.combine(minimum, f64::max).combine(maximum, f64::min)
    }

    /// Round both bounds to `decimals` decimal places.
    pub fn round_to(self, decimals: i32) -> Self {
        let factor = 10f64.powi(decimals);
        self.select(|v| (v * factor).round() / factor)
    }
}

fn almost_equal(a: f64, b: f64, tolerance: f64) -> bool {
    if a == b {
        // also covers matching infinities
        return true;
    }
    (a - b).abs() <= tolerance
}

impl PartialEq for NodeValue {
    fn eq(&self, other: &Self) -> bool {
        self.almost_equals(other, DEFAULT_TOLERANCE)
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        Self::new(value, value)
    }
}

impl From<bool> for NodeValue {
    fn from(value: bool) -> Self {
        Self::from(if value { 1.0 } else { 0.0 })
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minimum == self.maximum {
            write!(f, "{}", self.minimum)
        } else {
            write!(f, "{} to {}", self.minimum, self.maximum)
        }
    }
}

impl Add for NodeValue {
    type Output = NodeValue;
    fn add(self, rhs: NodeValue) -> NodeValue {
        self.combine(rhs, |a, b| a + b)
    }
}

impl Sub for NodeValue {
    type Output = NodeValue;
    fn sub(self, rhs: NodeValue) -> NodeValue {
        self.combine(rhs, |a, b| a - b)
    }
}

impl Mul for NodeValue {
    type Output = NodeValue;
    fn mul(self, rhs: NodeValue) -> NodeValue {
        self.combine(rhs, |a, b| a * b)
    }
}

impl Div for NodeValue {
    type Output = NodeValue;
    fn div(self, rhs: NodeValue) -> NodeValue {
        self.combine(rhs, |a, b| a / b)
    }
}

impl Neg for NodeValue {
    type Output = NodeValue;
    fn neg(self) -> NodeValue {
        self.select(|v| -v)
    }
}

impl Add<f64> for NodeValue {
    type Output = NodeValue;
    fn add(self, rhs: f64) -> NodeValue {
        self.select(|v| v + rhs)
    }
}

impl Sub<f64> for NodeValue {
    type Output = NodeValue;
    fn sub(self, rhs: f64) -> NodeValue {
        self.select(|v| v - rhs)
    }
}

impl Mul<f64> for NodeValue {
    type Output = NodeValue;
    fn mul(self, rhs: f64) -> NodeValue {
        self.select(|v| v * rhs)
    }
}

impl Div<f64> for NodeValue {
    type Output = NodeValue;
    fn div(self, rhs: f64) -> NodeValue {
        self.select(|v| v / rhs)
    }
}

/// Sum of the known values. Unknown only if every value is unknown.
///
/// # Examples
///
/// ```rust
/// use statgraph::node_value::sum;
/// use statgraph::NodeValue;
///
/// assert_eq!(sum(vec![Some(NodeValue::from(1.0)), None]), Some(NodeValue::from(1.0)));
/// assert_eq!(sum(vec![None, None]), None);
/// ```
pub fn sum(values: impl IntoIterator<Item = Option<NodeValue>>) -> Option<NodeValue> {
    values.into_iter().flatten().reduce(|a, b| a + b)
}

/// Product of the known values. Unknown only if every value is unknown.
pub fn product(values: impl IntoIterator<Item = Option<NodeValue>>) -> Option<NodeValue> {
    values.into_iter().flatten().reduce(|a, b| a * b)
}

/// Clip `value` into the given bounds. Unknown bounds are unbounded,
/// an unknown value stays unknown.
pub fn clip(
    value: Option<NodeValue>,
    minimum: Option<NodeValue>,
    maximum: Option<NodeValue>,
) -> Option<NodeValue> {
    let value = value?;
    let minimum = minimum.unwrap_or_else(|| NodeValue::from(f64::NEG_INFINITY));
    let maximum = maximum.unwrap_or_else(|| NodeValue::from(f64::INFINITY));
    Some(value.clip(minimum, maximum))
}

/// Approximate equality of two optional values.
pub fn values_equal(a: Option<NodeValue>, b: Option<NodeValue>, tolerance: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.almost_equals(&b, tolerance),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_is_component_wise() {
        let a = NodeValue::new(1.0, 2.0);
        let b = NodeValue::new(3.0, 5.0);
        assert_eq!(a + b, NodeValue::new(4.0, 7.0));
        assert_eq!(b - a, NodeValue::new(2.0, 3.0));
        assert_eq!(a * b, NodeValue::new(3.0, 10.0));
        assert_eq!(-a, NodeValue::new(-1.0, -2.0));
    }

    #[test]
    fn test_equality_tolerance() {
        let a = NodeValue::from(1.0);
        assert_eq!(a, NodeValue::from(1.0 + 1e-12));
        assert_ne!(a, NodeValue::from(1.0 + 1e-6));
        assert!(a.almost_equals(&NodeValue::from(1.1), 0.2));
    }

    #[test]
    fn test_clip() {
        let min = NodeValue::from(10.0);
        let max = NodeValue::from(20.0);
        assert_eq!(NodeValue::from(5.0).clip(min, max), NodeValue::from(10.0));
        assert_eq!(NodeValue::from(15.0).clip(min, max), NodeValue::from(15.0));
        assert_eq!(NodeValue::from(25.0).clip(min, max), NodeValue::from(20.0));
    }

    #[test]
    fn test_clip_with_unknown() {
        assert_eq!(clip(None, Some(NodeValue::zero()), None), None);
        assert_eq!(
            clip(Some(NodeValue::from(-5.0)), None, None),
            Some(NodeValue::from(-5.0))
        );
    }

    #[test]
    fn test_folds_skip_unknown() {
        let values = vec![Some(NodeValue::from(2.0)), None, Some(NodeValue::from(3.0))];
        assert_eq!(sum(values.clone()), Some(NodeValue::from(5.0)));
        assert_eq!(product(values), Some(NodeValue::from(6.0)));
        assert_eq!(sum(Vec::new()), None);
    }

    #[test]
    fn test_infinities_compare_equal() {
        let inf = NodeValue::from(f64::INFINITY);
        assert_eq!(inf, NodeValue::from(f64::INFINITY));
    }

    #[test]
    fn test_rounding_and_truthiness() {
        assert_eq!(NodeValue::from(1.23456).round_to(2), NodeValue::from(1.23));
        assert!(NodeValue::new(0.0, 1.0).is_true());
        assert!(!NodeValue::zero().is_true());
        assert_eq!(NodeValue::from(true), NodeValue::from(1.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeValue::from(3.0).to_string(), "3");
        assert_eq!(NodeValue::new(1.0, 2.0).to_string(), "1 to 2");
    }
}

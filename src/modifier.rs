//! Modifiers: the unit of addition and removal.

use crate::source::ModifierSource;
use crate::stat::Stat;
use crate::value::{values_match, IntoValue, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation role of a modifier.
///
/// Forms are combined in a fixed order: the base forms define a path's
/// base value, `Increase`/`Reduce` add up into one multiplier, each
/// `More`/`Less` multiplies separately, and `TotalOverride` replaces
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Form {
    BaseOverride,
    BaseSet,
    BaseAdd,
    BaseSubtract,
    /// Adds to the minimum of the base range only.
    MinBaseAdd,
    /// Adds to the maximum of the base range only.
    MaxBaseAdd,
    Increase,
    Reduce,
    More,
    Less,
    TotalOverride,
}

impl Form {
    pub const ALL: [Form; 11] = [
        Form::BaseOverride,
        Form::BaseSet,
        Form::BaseAdd,
        Form::BaseSubtract,
        Form::MinBaseAdd,
        Form::MaxBaseAdd,
        Form::Increase,
        Form::Reduce,
        Form::More,
        Form::Less,
        Form::TotalOverride,
    ];

    /// Forms contributing to a path's base value. Modifiers of these forms
    /// open a path for their (local) source.
    pub const BASE: [Form; 6] = [
        Form::BaseOverride,
        Form::BaseSet,
        Form::BaseAdd,
        Form::BaseSubtract,
        Form::MinBaseAdd,
        Form::MaxBaseAdd,
    ];

    pub fn is_base(self) -> bool {
        Self::BASE.contains(&self)
    }
}

/// A rule contributing to one or more stats.
///
/// Two modifiers are equal when they affect the same stats with the same
/// form and source, and their values match (same handle, or structurally
/// equal constants and per-stat values).
///
/// # Examples
///
/// ```rust
/// use statgraph::{Form, Modifier, ModifierSource, Stat};
///
/// let life = Stat::new("Life");
/// let a = Modifier::new(vec![life.clone()], Form::BaseAdd, 10.0, ModifierSource::global());
/// let b = Modifier::new(vec![life], Form::BaseAdd, 10.0, ModifierSource::global());
/// assert_eq!(a, b);
/// ```
#[derive(Clone)]
pub struct Modifier {
    stats: Vec<Stat>,
    form: Form,
    value: ValueRef,
    source: ModifierSource,
}

impl Modifier {
    pub fn new(stats: Vec<Stat>, form: Form, value: impl IntoValue, source: ModifierSource) -> Self {
        Self {
            stats,
            form,
            value: value.into_value(),
            source,
        }
    }

    /// A global modifier to a single stat.
    pub fn global(stat: &Stat, form: Form, value: impl IntoValue) -> Self {
        Self::new(vec![stat.clone()], form, value, ModifierSource::global())
    }

    pub fn stats(&self) -> &[Stat] {
        &self.stats
    }

    pub fn form(&self) -> Form {
        self.form
    }

    pub fn value(&self) -> &ValueRef {
        &self.value
    }

    pub fn source(&self) -> &ModifierSource {
        &self.source
    }
}

impl PartialEq for Modifier {
    fn eq(&self, other: &Self) -> bool {
        self.form == other.form
            && self.source == other.source
            && self.stats == other.stats
            && values_match(&self.value, &other.value)
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifier")
            .field("stats", &self.stats)
            .field("form", &self.form)
            .field("value", &self.value)
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FunctionalValue;
    use std::sync::Arc;

    #[test]
    fn test_base_forms() {
        assert!(Form::MinBaseAdd.is_base());
        assert!(Form::BaseOverride.is_base());
        assert!(!Form::Increase.is_base());
        assert!(!Form::TotalOverride.is_base());
    }

    #[test]
    fn test_equality_requires_same_source() {
        let stat = Stat::new("Armour");
        let global = Modifier::global(&stat, Form::Increase, 20.0);
        let given = Modifier::new(vec![stat], Form::Increase, 20.0, ModifierSource::given());
        assert_ne!(global, given);
    }

    #[test]
    fn test_equality_of_opaque_values() {
        let stat = Stat::new("Armour");
        let value: ValueRef = Arc::new(FunctionalValue::new("x", |_| Ok(None)));
        let a = Modifier::global(&stat, Form::BaseAdd, value.clone());
        let b = Modifier::global(&stat, Form::BaseAdd, value);
        let c = Modifier::global(
            &stat,
            Form::BaseAdd,
            Arc::new(FunctionalValue::new("x", |_| Ok(None))),
        );
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

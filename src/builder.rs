//! Modifier builder module.
//!
//! Provides `ModifierBuilder`, the immutable accumulator a parsing layer
//! fills piece by piece: one fragment of text contributes a form, another
//! a stat, another a value or a condition. Fragments are merged with
//! `merge_with` and the result is turned into concrete `Modifier`s with
//! `build`.
//!
//! All validation happens while accumulating, so a finished builder always
//! builds.

use crate::error::StatError;
use crate::modifier::{Form, Modifier};
use crate::source::ModifierSource;
use crate::stat::Stat;
use crate::value::{AndValue, ConditionalValue, IntoValue, ValueRef};
use std::fmt;
use std::sync::Arc;

/// Function applied to every stat of an entry when building.
pub type StatConverter = Arc<dyn Fn(Stat) -> Stat + Send + Sync>;

/// Function applied to the value of an entry when building.
pub type ValueConverter = Arc<dyn Fn(ValueRef) -> ValueRef + Send + Sync>;

/// One modifier under construction.
///
/// Form, stats and value may each be set once. Conditions accumulate and
/// are combined with a logical and.
///
/// # Examples
///
/// ```rust
/// use statgraph::builder::ModifierEntry;
/// use statgraph::{Form, StatError};
///
/// let entry = ModifierEntry::new().with_form(Form::BaseAdd).unwrap();
/// let err = entry.with_form(Form::More).unwrap_err();
/// assert_eq!(err, StatError::FieldAlreadySet("form"));
/// ```
#[derive(Clone, Default)]
pub struct ModifierEntry {
    form: Option<Form>,
    stats: Option<Vec<Stat>>,
    value: Option<ValueRef>,
    condition: Option<ValueRef>,
}

impl ModifierEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form(mut self, form: Form) -> Result<Self, StatError> {
        if self.form.is_some() {
            return Err(StatError::FieldAlreadySet("form"));
        }
        self.form = Some(form);
        Ok(self)
    }

    pub fn with_stat(self, stat: Stat) -> Result<Self, StatError> {
        self.with_stat_group(vec![stat])
    }

    /// Set several stats that one modifier applies to at once, such as the
    /// stats of a conversion.
    pub fn with_stat_group(mut self, stats: Vec<Stat>) -> Result<Self, StatError> {
        if self.stats.is_some() {
            return Err(StatError::FieldAlreadySet("stat"));
        }
        self.stats = Some(stats);
        Ok(self)
    }

    pub fn with_value(mut self, value: impl IntoValue) -> Result<Self, StatError> {
        if self.value.is_some() {
            return Err(StatError::FieldAlreadySet("value"));
        }
        self.value = Some(value.into_value());
        Ok(self)
    }

    pub fn with_condition(mut self, condition: ValueRef) -> Result<Self, StatError> {
        if self.condition.is_some() {
            return Err(StatError::FieldAlreadySet("condition"));
        }
        self.condition = Some(condition);
        Ok(self)
    }

    /// Add `condition` to the conditions of this entry; both must hold.
    fn and_condition(mut self, condition: ValueRef) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => Arc::new(AndValue::new(vec![existing, condition])),
            None => condition,
        });
        self
    }

    pub fn form(&self) -> Option<Form> {
        self.form
    }

    pub fn stats(&self) -> Option<&[Stat]> {
        self.stats.as_deref()
    }

    pub fn value(&self) -> Option<&ValueRef> {
        self.value.as_ref()
    }

    pub fn condition(&self) -> Option<&ValueRef> {
        self.condition.as_ref()
    }

    fn merge(self, other: Self) -> Result<Self, StatError> {
        let mut merged = ModifierEntry::new();
        if let Some(form) = self.form.or(other.form) {
            if self.form.is_some() && other.form.is_some() {
                return Err(StatError::FieldAlreadySet("form"));
            }
            merged = merged.with_form(form)?;
        }
        match (self.stats, other.stats) {
            (Some(_), Some(_)) => return Err(StatError::FieldAlreadySet("stat")),
            (Some(stats), None) | (None, Some(stats)) => merged = merged.with_stat_group(stats)?,
            (None, None) => {}
        }
        match (self.value, other.value) {
            (Some(_), Some(_)) => return Err(StatError::FieldAlreadySet("value")),
            (Some(value), None) | (None, Some(value)) => merged = merged.with_value(value)?,
            (None, None) => {}
        }
        for condition in self.condition.into_iter().chain(other.condition) {
            merged = merged.and_condition(condition);
        }
        Ok(merged)
    }

    fn is_complete(&self) -> bool {
        self.form.is_some() && self.stats.is_some() && self.value.is_some()
    }
}

impl fmt::Debug for ModifierEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierEntry")
            .field("form", &self.form)
            .field("stats", &self.stats)
            .field("value", &self.value)
            .field("condition", &self.condition)
            .finish()
    }
}

/// Immutable accumulator of modifier entries and converters.
///
/// Single-element operations (`with_form`, `with_stat`, ...) apply to every
/// entry, creating one if there is none. Multi-element operations
/// (`with_forms`, `with_stats`, ...) create one entry per element; once
/// a builder has several entries, every later multi-element operation must
/// supply exactly that many elements.
///
/// # Examples
///
/// ```rust
/// use statgraph::builder::ModifierBuilder;
/// use statgraph::{Form, ModifierSource, Stat};
///
/// // "+10 to Strength and Dexterity"
/// let modifiers = ModifierBuilder::new()
///     .with_form(Form::BaseAdd).unwrap()
///     .with_stats(vec![Stat::new("Strength"), Stat::new("Dexterity")]).unwrap()
///     .with_value(10.0).unwrap()
///     .build(&ModifierSource::global());
///
/// assert_eq!(modifiers.len(), 2);
/// assert_eq!(modifiers[1].stats(), &[Stat::new("Dexterity")]);
/// ```
#[derive(Clone)]
pub struct ModifierBuilder {
    entries: Vec<ModifierEntry>,
    stat_converter: StatConverter,
    value_converter: ValueConverter,
}

impl ModifierBuilder {
    /// An empty builder with identity converters.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            stat_converter: Arc::new(|stat| stat),
            value_converter: Arc::new(|value| value),
        }
    }

    pub fn entries(&self) -> &[ModifierEntry] {
        &self.entries
    }

    pub fn with_form(self, form: Form) -> Result<Self, StatError> {
        self.with_single(form, ModifierEntry::with_form)
    }

    pub fn with_forms(self, forms: Vec<Form>) -> Result<Self, StatError> {
        self.with_each(forms, ModifierEntry::with_form)
    }

    pub fn with_stat(self, stat: Stat) -> Result<Self, StatError> {
        self.with_single(stat, ModifierEntry::with_stat)
    }

    /// Every entry applies to all of `stats` at once.
    pub fn with_stat_group(self, stats: Vec<Stat>) -> Result<Self, StatError> {
        self.with_single(stats, ModifierEntry::with_stat_group)
    }

    /// One entry per stat.
    pub fn with_stats(self, stats: Vec<Stat>) -> Result<Self, StatError> {
        self.with_each(stats, ModifierEntry::with_stat)
    }

    pub fn with_value(self, value: impl IntoValue) -> Result<Self, StatError> {
        self.with_single(value.into_value(), |entry, value| entry.with_value(value))
    }

    pub fn with_values(self, values: Vec<ValueRef>) -> Result<Self, StatError> {
        self.with_each(values, |entry, value| entry.with_value(value))
    }

    pub fn with_condition(self, condition: ValueRef) -> Result<Self, StatError> {
        self.with_single(condition, |entry, condition| entry.with_condition(condition))
    }

    pub fn with_conditions(self, conditions: Vec<ValueRef>) -> Result<Self, StatError> {
        self.with_each(conditions, |entry, condition| entry.with_condition(condition))
    }

    /// Replace the stat converter.
    pub fn with_stat_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(Stat) -> Stat + Send + Sync + 'static,
    {
        self.stat_converter = Arc::new(converter);
        self
    }

    /// Replace the value converter.
    pub fn with_value_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(ValueRef) -> ValueRef + Send + Sync + 'static,
    {
        self.value_converter = Arc::new(converter);
        self
    }

    fn with_single<T: Clone>(
        mut self,
        element: T,
        apply: impl Fn(ModifierEntry, T) -> Result<ModifierEntry, StatError>,
    ) -> Result<Self, StatError> {
        if self.entries.is_empty() {
            self.entries.push(ModifierEntry::new());
        }
        self.entries = self
            .entries
            .into_iter()
            .map(|entry| apply(entry, element.clone()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    fn with_each<T>(
        mut self,
        elements: Vec<T>,
        apply: impl Fn(ModifierEntry, T) -> Result<ModifierEntry, StatError>,
    ) -> Result<Self, StatError> {
        let bases: Vec<ModifierEntry> = match self.entries.len() {
            0 => vec![ModifierEntry::new(); elements.len()],
            1 => vec![self.entries[0].clone(); elements.len()],
            expected if expected != elements.len() => {
                return Err(StatError::MismatchedEntryCount {
                    expected,
                    actual: elements.len(),
                })
            }
            _ => std::mem::take(&mut self.entries),
        };
        self.entries = bases
            .into_iter()
            .zip(elements)
            .map(|(entry, element)| apply(entry, element))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Combine two partial builders.
    ///
    /// At most one side may hold more than one entry; the single entry of
    /// the other side is merged into each of its entries. If either side is
    /// empty, the entries of the other are kept as they are. Converters are
    /// chained, `self`'s first.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::builder::ModifierBuilder;
    /// use statgraph::{Form, ModifierSource, Stat};
    ///
    /// let value_part = ModifierBuilder::new().with_value(20.0).unwrap();
    /// let stat_part = ModifierBuilder::new()
    ///     .with_form(Form::Increase).unwrap()
    ///     .with_stat(Stat::new("Evasion")).unwrap();
    ///
    /// let modifiers = value_part.merge_with(stat_part).unwrap().build(&ModifierSource::global());
    /// assert_eq!(modifiers.len(), 1);
    /// assert_eq!(modifiers[0].form(), Form::Increase);
    /// ```
    pub fn merge_with(self, other: ModifierBuilder) -> Result<Self, StatError> {
        let (left_stats, right_stats) = (self.stat_converter, other.stat_converter);
        let (left_values, right_values) = (self.value_converter, other.value_converter);
        let stat_converter: StatConverter = Arc::new(move |stat| right_stats(left_stats(stat)));
        let value_converter: ValueConverter =
            Arc::new(move |value| right_values(left_values(value)));

        let (single, many) = if self.entries.len() > other.entries.len() {
            (other.entries, self.entries)
        } else {
            (self.entries, other.entries)
        };
        if single.len() > 1 {
            return Err(StatError::MultipleMultiEntryModifiers {
                left: single.len(),
                right: many.len(),
            });
        }

        let entries = match single.into_iter().next() {
            None => many,
            Some(single) => many
                .into_iter()
                .map(|entry| single.clone().merge(entry))
                .collect::<Result<_, _>>()?,
        };
        Ok(Self {
            entries,
            stat_converter,
            value_converter,
        })
    }

    /// Merge all `builders`, starting from an empty one.
    pub fn aggregate(builders: impl IntoIterator<Item = ModifierBuilder>) -> Result<Self, StatError> {
        builders
            .into_iter()
            .try_fold(ModifierBuilder::new(), ModifierBuilder::merge_with)
    }

    /// Create one modifier per complete entry, attributed to `source`.
    ///
    /// Entries missing a form, stat or value are skipped. Converters are
    /// applied, and a condition makes the value unknown while it is false.
    pub fn build(&self, source: &ModifierSource) -> Vec<Modifier> {
        self.entries
            .iter()
            .filter(|entry| entry.is_complete())
            .filter_map(|entry| {
                let form = entry.form?;
                let stats = entry
                    .stats
                    .iter()
                    .flatten()
                    .map(|stat| (self.stat_converter)(stat.clone()))
                    .collect();
                let mut value = (self.value_converter)(entry.value.clone()?);
                if let Some(condition) = &entry.condition {
                    value = Arc::new(ConditionalValue::when(condition.clone(), value));
                }
                Some(Modifier::new(stats, form, value, source.clone()))
            })
            .collect()
    }
}

impl Default for ModifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModifierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierBuilder")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Constant;

    fn condition() -> ValueRef {
        Arc::new(Constant::new(1.0))
    }

    #[test]
    fn test_single_operations_create_one_entry() {
        let builder = ModifierBuilder::new()
            .with_form(Form::BaseAdd)
            .unwrap()
            .with_value(3.0)
            .unwrap();
        assert_eq!(builder.entries().len(), 1);
        assert_eq!(builder.entries()[0].form(), Some(Form::BaseAdd));
        assert!(builder.entries()[0].stats().is_none());
    }

    #[test]
    fn test_single_field_set_twice() {
        let builder = ModifierBuilder::new().with_stat(Stat::new("Life")).unwrap();
        assert_eq!(
            builder.with_stat(Stat::new("Mana")).unwrap_err(),
            StatError::FieldAlreadySet("stat")
        );
    }

    #[test]
    fn test_multi_operations_share_single_entry() {
        let builder = ModifierBuilder::new()
            .with_form(Form::More)
            .unwrap()
            .with_stats(vec![Stat::new("A"), Stat::new("B"), Stat::new("C")])
            .unwrap();
        assert_eq!(builder.entries().len(), 3);
        assert!(builder
            .entries()
            .iter()
            .all(|entry| entry.form() == Some(Form::More)));
    }

    #[test]
    fn test_multi_operations_must_match() {
        let builder = ModifierBuilder::new()
            .with_forms(vec![Form::BaseAdd, Form::Increase])
            .unwrap();
        let err = builder
            .with_values(vec![1f64.into_value(), 2f64.into_value(), 3f64.into_value()])
            .unwrap_err();
        assert_eq!(
            err,
            StatError::MismatchedEntryCount {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_merge_two_multi_entry_builders_fails() {
        let left = ModifierBuilder::new()
            .with_forms(vec![Form::BaseAdd, Form::More])
            .unwrap();
        let right = ModifierBuilder::new()
            .with_stats(vec![Stat::new("A"), Stat::new("B")])
            .unwrap();
        assert_eq!(
            left.merge_with(right).unwrap_err(),
            StatError::MultipleMultiEntryModifiers { left: 2, right: 2 }
        );
    }

    #[test]
    fn test_merge_rejects_duplicate_fields() {
        let left = ModifierBuilder::new().with_value(1.0).unwrap();
        let right = ModifierBuilder::new().with_value(2.0).unwrap();
        assert_eq!(
            left.merge_with(right).unwrap_err(),
            StatError::FieldAlreadySet("value")
        );
    }

    #[test]
    fn test_condition_is_set_once() {
        let err = ModifierBuilder::new()
            .with_condition(condition())
            .unwrap()
            .with_condition(condition())
            .unwrap_err();
        assert_eq!(err, StatError::FieldAlreadySet("condition"));

        let entry = ModifierEntry::new().with_condition(condition()).unwrap();
        assert!(entry.with_condition(condition()).is_err());
    }

    #[test]
    fn test_merge_conjoins_conditions() {
        let left = ModifierBuilder::new().with_condition(condition()).unwrap();
        let right = ModifierBuilder::new()
            .with_condition(condition())
            .unwrap()
            .with_form(Form::BaseAdd)
            .unwrap();
        let merged = left.merge_with(right).unwrap();
        let condition = merged.entries()[0].condition().unwrap();
        assert!(format!("{condition:?}").starts_with("AndValue"));
    }

    #[test]
    fn test_merge_with_empty_keeps_entries() {
        let full = ModifierBuilder::new()
            .with_stats(vec![Stat::new("A"), Stat::new("B")])
            .unwrap();
        let merged = ModifierBuilder::new().merge_with(full).unwrap();
        assert_eq!(merged.entries().len(), 2);
    }

    #[test]
    fn test_build_skips_incomplete_entries() {
        let builder = ModifierBuilder::new()
            .with_stats(vec![Stat::new("A"), Stat::new("B")])
            .unwrap()
            .with_forms(vec![Form::BaseAdd, Form::BaseAdd])
            .unwrap();
        assert!(builder.build(&ModifierSource::global()).is_empty());
    }

    #[test]
    fn test_converters_chain_left_then_right() {
        let left = ModifierBuilder::new()
            .with_stat(Stat::new("Fire"))
            .unwrap()
            .with_stat_converter(|stat| Stat::new(format!("{stat}.Left")));
        let right = ModifierBuilder::new()
            .with_form(Form::BaseAdd)
            .unwrap()
            .with_value(1.0)
            .unwrap()
            .with_stat_converter(|stat| Stat::new(format!("{stat}.Right")));
        let modifiers = left.merge_with(right).unwrap().build(&ModifierSource::global());
        assert_eq!(modifiers[0].stats()[0].id().as_str(), "Fire.Left.Right");
    }
}

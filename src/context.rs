//! Evaluation contexts.
//!
//! Values never touch the graph directly. They ask a
//! `ValueCalculationContext` for node values, modifier values and paths.
//! The calculator supplies a context that records every read as a
//! dependency; behaviors decorate that context to change what the wrapped
//! value sees.

use crate::aggregation::NodeType;
use crate::error::StatError;
use crate::modifier::Form;
use crate::node_value::NodeValue;
use crate::path::PathDefinition;
use crate::stat::Stat;

/// Capabilities available to a value while it is evaluated.
pub trait ValueCalculationContext {
    /// The path of the node being evaluated.
    fn current_path(&self) -> PathDefinition;

    /// Value of the node `(stat, node_type, path)`.
    fn get_value(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, StatError>;

    /// Values of the modifiers with `form` that apply to each `(stat, path)`.
    fn get_values(
        &self,
        form: Form,
        paths: &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, StatError>;

    /// The distinct paths currently known for `stat`. The main path is
    /// always first.
    fn get_paths(&self, stat: &Stat) -> Result<Vec<PathDefinition>, StatError>;
}

impl<'a> dyn ValueCalculationContext + 'a {
    /// Value of `stat`'s `Total` node.
    pub fn total(&self, stat: &Stat) -> Result<Option<NodeValue>, StatError> {
        self.get_value(stat, NodeType::Total, &PathDefinition::main())
    }

    /// Value of the `node_type` node on every path of `stat`.
    pub fn path_values(
        &self,
        stat: &Stat,
        node_type: NodeType,
    ) -> Result<Vec<Option<NodeValue>>, StatError> {
        self.get_paths(stat)?
            .iter()
            .map(|path| self.get_value(stat, node_type, path))
            .collect()
    }

    /// Values of the modifiers with `form` applying to `stat` on `path`.
    pub fn form_values(
        &self,
        form: Form,
        stat: &Stat,
        path: &PathDefinition,
    ) -> Result<Vec<Option<NodeValue>>, StatError> {
        self.get_values(form, &[(stat.clone(), path.clone())])
    }
}

/// Evaluates with a different current path.
pub struct PathContext<'a> {
    inner: &'a dyn ValueCalculationContext,
    path: PathDefinition,
}

impl<'a> PathContext<'a> {
    pub fn new(inner: &'a dyn ValueCalculationContext, path: PathDefinition) -> Self {
        Self { inner, path }
    }
}

impl ValueCalculationContext for PathContext<'_> {
    fn current_path(&self) -> PathDefinition {
        self.path.clone()
    }

    fn get_value(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, StatError> {
        self.inner.get_value(stat, node_type, path)
    }

    fn get_values(
        &self,
        form: Form,
        paths: &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, StatError> {
        self.inner.get_values(form, paths)
    }

    fn get_paths(&self, stat: &Stat) -> Result<Vec<PathDefinition>, StatError> {
        self.inner.get_paths(stat)
    }
}

/// Hides the paths rejected by a filter.
pub struct FilteredPathsContext<'a, F> {
    inner: &'a dyn ValueCalculationContext,
    filter: F,
}

impl<'a, F> FilteredPathsContext<'a, F>
where
    F: Fn(&PathDefinition) -> bool,
{
    pub fn new(inner: &'a dyn ValueCalculationContext, filter: F) -> Self {
        Self { inner, filter }
    }
}

impl<F> ValueCalculationContext for FilteredPathsContext<'_, F>
where
    F: Fn(&PathDefinition) -> bool,
{
    fn current_path(&self) -> PathDefinition {
        self.inner.current_path()
    }

    fn get_value(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, StatError> {
        self.inner.get_value(stat, node_type, path)
    }

    fn get_values(
        &self,
        form: Form,
        paths: &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, StatError> {
        self.inner.get_values(form, paths)
    }

    fn get_paths(&self, stat: &Stat) -> Result<Vec<PathDefinition>, StatError> {
        Ok(self
            .inner
            .get_paths(stat)?
            .into_iter()
            .filter(|path| (self.filter)(path))
            .collect())
    }
}

/// Rewrites modifier value lookups.
///
/// `rewrite` receives the wrapped context and the original request and
/// returns the values to hand out instead.
pub struct ModifiedValuesContext<'a, F> {
    inner: &'a dyn ValueCalculationContext,
    rewrite: F,
}

impl<'a, F> ModifiedValuesContext<'a, F>
where
    F: Fn(
        &dyn ValueCalculationContext,
        Form,
        &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, StatError>,
{
    pub fn new(inner: &'a dyn ValueCalculationContext, rewrite: F) -> Self {
        Self { inner, rewrite }
    }
}

impl<F> ValueCalculationContext for ModifiedValuesContext<'_, F>
where
    F: Fn(
        &dyn ValueCalculationContext,
        Form,
        &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, StatError>,
{
    fn current_path(&self) -> PathDefinition {
        self.inner.current_path()
    }

    fn get_value(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, StatError> {
        self.inner.get_value(stat, node_type, path)
    }

    fn get_values(
        &self,
        form: Form,
        paths: &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, StatError> {
        (self.rewrite)(self.inner, form, paths)
    }

    fn get_paths(&self, stat: &Stat) -> Result<Vec<PathDefinition>, StatError> {
        self.inner.get_paths(stat)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::ModifierSource;
    use crate::stat::StatId;
    use std::collections::HashMap;

    /// A context over fixed tables, for testing values in isolation.
    #[derive(Default)]
    pub(crate) struct FixedContext {
        path: PathDefinition,
        nodes: HashMap<(StatId, NodeType, PathDefinition), NodeValue>,
        forms: HashMap<(Form, StatId), Vec<Option<NodeValue>>>,
        paths: HashMap<StatId, Vec<PathDefinition>>,
    }

    impl FixedContext {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on_path(mut self, path: PathDefinition) -> Self {
            self.path = path;
            self
        }

        pub(crate) fn with_total(self, stat: &Stat, value: f64) -> Self {
            self.with_node(stat, NodeType::Total, PathDefinition::main(), value)
        }

        pub(crate) fn with_node(
            mut self,
            stat: &Stat,
            node_type: NodeType,
            path: PathDefinition,
            value: f64,
        ) -> Self {
            self.nodes
                .insert((stat.id().clone(), node_type, path), NodeValue::from(value));
            self
        }

        pub(crate) fn with_form_values(mut self, form: Form, stat: &Stat, values: &[f64]) -> Self {
            self.forms.insert(
                (form, stat.id().clone()),
                values.iter().map(|v| Some(NodeValue::from(*v))).collect(),
            );
            self
        }

        pub(crate) fn with_paths(mut self, stat: &Stat, paths: Vec<PathDefinition>) -> Self {
            self.paths.insert(stat.id().clone(), paths);
            self
        }
    }

    impl ValueCalculationContext for FixedContext {
        fn current_path(&self) -> PathDefinition {
            self.path.clone()
        }

        fn get_value(
            &self,
            stat: &Stat,
            node_type: NodeType,
            path: &PathDefinition,
        ) -> Result<Option<NodeValue>, StatError> {
            Ok(self
                .nodes
                .get(&(stat.id().clone(), node_type, path.clone()))
                .copied())
        }

        fn get_values(
            &self,
            form: Form,
            paths: &[(Stat, PathDefinition)],
        ) -> Result<Vec<Option<NodeValue>>, StatError> {
            Ok(paths
                .iter()
                .flat_map(|(stat, _)| {
                    self.forms
                        .get(&(form, stat.id().clone()))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect())
        }

        fn get_paths(&self, stat: &Stat) -> Result<Vec<PathDefinition>, StatError> {
            Ok(self
                .paths
                .get(stat.id())
                .cloned()
                .unwrap_or_else(|| vec![PathDefinition::main()]))
        }
    }

    #[test]
    fn test_total_helper_reads_main_path() {
        let life = Stat::new("Life");
        let context = FixedContext::new().with_total(&life, 50.0);
        let context: &dyn ValueCalculationContext = &context;
        assert_eq!(context.total(&life).unwrap(), Some(NodeValue::from(50.0)));
    }

    #[test]
    fn test_path_context_overrides_current_path() {
        let given = PathDefinition::new(&ModifierSource::given());
        let context = FixedContext::new();
        let decorated = PathContext::new(&context, given.clone());
        assert_eq!(decorated.current_path(), given);
        assert_eq!(context.current_path(), PathDefinition::main());
    }

    #[test]
    fn test_filtered_paths() {
        let stat = Stat::new("Fire");
        let skill = PathDefinition::new(&ModifierSource::skill("Fireball", ""));
        let context = FixedContext::new().with_paths(&stat, vec![PathDefinition::main(), skill.clone()]);
        let filtered = FilteredPathsContext::new(&context, |p: &PathDefinition| p.source().is_skill());
        assert_eq!(filtered.get_paths(&stat).unwrap(), vec![skill]);
    }

    #[test]
    fn test_modified_values() {
        let stat = Stat::new("Fire");
        let context = FixedContext::new().with_form_values(Form::BaseAdd, &stat, &[1.0, 2.0]);
        let doubled = ModifiedValuesContext::new(&context, |inner, form, paths| {
            let mut values = inner.get_values(form, paths)?;
            values.extend(inner.get_values(form, paths)?);
            Ok(values)
        });
        let ctx: &dyn ValueCalculationContext = &doubled;
        assert_eq!(
            ctx.form_values(Form::BaseAdd, &stat, &PathDefinition::main())
                .unwrap()
                .len(),
            4
        );
    }
}

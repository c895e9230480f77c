//! Computation paths.
//!
//! A path is one lineage by which value flows into a stat: the canonical
//! source it came from and the conversion stats it passed through on the way.

use crate::source::ModifierSource;
use crate::stat::Stat;
use serde::Serialize;
use std::fmt;

/// A (source, conversion chain) pair.
///
/// # Examples
///
/// ```rust
/// use statgraph::{ModifierSource, PathDefinition, Stat};
///
/// let main = PathDefinition::main();
/// assert!(main.is_main_path());
///
/// let converted = main.extended_by(Stat::new("Lightning"));
/// assert!(converted.is_conversion_path());
/// assert_eq!(converted.without_last_conversion(), main);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PathDefinition {
    source: ModifierSource,
    conversion_stats: Vec<Stat>,
}

impl PathDefinition {
    /// A path without conversions. The source is canonicalized.
    pub fn new(source: &ModifierSource) -> Self {
        Self::with_conversions(source, Vec::new())
    }

    pub fn with_conversions(source: &ModifierSource, conversion_stats: Vec<Stat>) -> Self {
        Self {
            source: source.canonical(),
            conversion_stats,
        }
    }

    /// The global path without conversions. Every stat has it.
    pub fn main() -> Self {
        Self::new(&ModifierSource::global())
    }

    pub fn source(&self) -> &ModifierSource {
        &self.source
    }

    pub fn conversion_stats(&self) -> &[Stat] {
        &self.conversion_stats
    }

    pub fn is_main_path(&self) -> bool {
        self.source.is_global() && self.conversion_stats.is_empty()
    }

    pub fn is_conversion_path(&self) -> bool {
        !self.conversion_stats.is_empty()
    }

    pub fn last_conversion(&self) -> Option<&Stat> {
        self.conversion_stats.last()
    }

    /// This path routed through one more conversion stat.
    pub fn extended_by(&self, stat: Stat) -> Self {
        let mut conversion_stats = self.conversion_stats.clone();
        conversion_stats.push(stat);
        Self {
            source: self.source.clone(),
            conversion_stats,
        }
    }

    /// The path the last conversion stat was reached by.
    pub fn without_last_conversion(&self) -> Self {
        let mut conversion_stats = self.conversion_stats.clone();
        conversion_stats.pop();
        Self {
            source: self.source.clone(),
            conversion_stats,
        }
    }
}

impl Default for PathDefinition {
    fn default() -> Self {
        Self::main()
    }
}

impl fmt::Display for PathDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        for stat in &self.conversion_stats {
            write!(f, " <- {stat}")?;
        }
        Ok(())
    }
}

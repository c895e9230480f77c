//! # statgraph - Incremental, Path-Aware Stat Computation Graph
//!
//! A stat engine for character build planners that provides:
//! - **Incremental** recomputation (only nodes downstream of a change are recomputed)
//! - **Path-aware** aggregation (local item values and conversions keep their own paths)
//! - **Batched** updates with one change notification per node and batch
//! - **Hardcode-free** design (stats are plain keys with optional metadata)
//!
//! ## Core Concepts
//!
//! ### Stat Pipeline
//!
//! Every stat is computed through a fixed chain of stages:
//!
//! ```text
//! [Modifiers] → [Base / Increase / More] → [PathTotal] → [Subtotal] → [Total]
//! ```
//!
//! 1. **Modifiers** attach a value of a given form to one or more stats
//! 2. **Paths** keep values from local sources and conversions separate
//! 3. **Behaviors** rewrite stages of other stats, e.g. for conversions
//! 4. **Nodes** cache stage values and notify subscribers when they change
//!
//! ### Key Features
//!
//! - **Dependency Graph**: Recorded while evaluating, used to invalidate dependents
//! - **Cycle Detection**: A batch that creates a cycle is rolled back
//! - **Pruning**: Unobserved nodes of stats without modifiers are dropped
//! - **Builders**: Modifiers can be assembled from partial fragments
//!
//! ## Example
//!
//! ```rust
//! use statgraph::*;
//!
//! let mut calculator = Calculator::new();
//! let life = Stat::new("Life");
//!
//! calculator
//!     .new_batch_update()
//!     .add_modifier(Modifier::global(&life, Form::BaseAdd, 100.0))
//!     .add_modifier(Modifier::global(&life, Form::BaseAdd, 50.0))
//!     .add_modifier(Modifier::global(&life, Form::Increase, 50.0))
//!     .do_update()
//!     .unwrap();
//!
//! let total = calculator.node(&life, NodeType::Total).unwrap();
//! assert_eq!(total.value(), Some(NodeValue::from(225.0))); // (100 + 50) * 1.5
//! ```
//!
//! ## Modules
//!
//! - [`calculator`] - Calculator and batch updates
//! - [`stat`] - Stat keys and metadata
//! - [`modifier`] - Modifier forms and modifiers
//! - [`value`] - Value expressions
//! - [`aggregation`] - Stages and their natural values
//! - [`transform`] - Behaviors that rewrite stages
//! - [`conversion`] - Conversion and gain stats
//! - [`builder`] - Modifier builders
//! - [`breakdown`] - Serializable stat breakdowns
//! - [`graph`] - Dependency graph management
//! - [`error`] - Error types

pub mod aggregation;
pub mod breakdown;
pub mod builder;
pub mod calculator;
pub mod config;
pub mod context;
pub mod conversion;
pub mod error;
pub mod graph;
pub mod modifier;
pub mod node;
pub mod node_value;
pub mod path;
pub mod registry;
mod repository;
pub mod source;
pub mod stat;
pub mod transform;
pub mod value;

// Re-export main types for convenience
pub use aggregation::NodeType;
pub use calculator::{BatchUpdate, Calculator};
pub use config::CalculatorConfig;
pub use error::StatError;
pub use modifier::{Form, Modifier};
pub use node::{CalculationNode, SubscriptionId, ValueChanged};
pub use node_value::NodeValue;
pub use path::PathDefinition;
pub use source::{ItemSlot, ModifierSource};
pub use stat::{DataType, ExplicitRegistrationType, Stat, StatId};

// Re-export builder and breakdown types
pub use breakdown::{PathBreakdown, StatBreakdown};
pub use builder::{ModifierBuilder, ModifierEntry};
pub use registry::{CollectionChange, ObservableCollection, RegisteredStat};

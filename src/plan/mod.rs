#![forbid(unsafe_code)]

//! Annotated plan trees (Stage 1 of the visualizer pipeline).
//!
//! Raw explain documents are converted bottom-up into an immutable arena of
//! [`PlanNode`]s. Parent and child links are [`PlanId`]s into that arena, so
//! the tree can be shared read-only between the layouts and the source
//! highlighter.

/// Recursive conversion of raw explain nodes into the plan arena.
///
/// Resolves collapsed-plan back-references, computes self values and
/// percentages, and feeds display spans into the context index.
pub mod builder;

/// Plan node records and the arena that owns them.
pub mod node;

pub use builder::{build_plan_tree, AnalyzedPlan, QueryTotals};
pub use node::{ExpandedSet, Metric, PlanId, PlanNode, PlanTree};

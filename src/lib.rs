//! Planscope turns query-engine explain documents into interactive
//! visualizations: an annotated plan tree, a deduplicated index of the source
//! spans each plan node came from, squarified treemap and flame graph
//! layouts, and the hover/selection state that correlates them.
//!
//! ```no_run
//! use planscope::{build_plan_tree, plan::ExpandedSet, PlanDocument, PlanReport};
//!
//! # fn main() -> planscope::Result<()> {
//! let doc = PlanDocument::from_json(&std::fs::read_to_string("plan.json").unwrap_or_default())?;
//! let plan = build_plan_tree(&doc)?;
//! println!("{}", PlanReport::from_plan(&plan, plan.default_metric(), &ExpandedSet::default()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Layout and view options.
pub mod config;
/// Deduplicated source spans.
pub mod context;
/// Serde model of the input document.
pub mod document;
/// Structured parse errors.
pub mod error;
/// Treemap and flame graph layouts.
pub mod layout;
/// Tracing subscriber setup.
pub mod logging;
/// Plan arena and builder.
pub mod plan;
/// Opt-in timing counters.
pub mod profile;
/// Printable plan summaries.
pub mod report;
/// Interaction state shared by the visualizations.
pub mod view;

pub use config::{FlameOptions, MetricPreference, TreemapOptions, ViewOptions};
pub use context::{Context, ContextId, ContextIndex};
pub use document::{Buffer, PlanDocument};
pub use error::{PlanParseError, PlanParseErrorWithCode, Result};
pub use layout::{layout_flame, layout_treemap, FlameViewport, Rect};
pub use plan::{build_plan_tree, AnalyzedPlan, Metric, PlanId, PlanNode, PlanTree};
pub use report::PlanReport;
pub use view::{PlanViewState, ViewAction, ViewSession};

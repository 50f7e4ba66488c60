//! Tunables for the layouts and the view state.
//!
//! Every field has a default, so a partial TOML table is enough to override
//! a single knob.

use serde::{Deserialize, Serialize};

use crate::plan::{AnalyzedPlan, Metric};

/// Treemap layout options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreemapOptions {
    /// Children whose pixel area falls below this are folded into one
    /// "N hidden" item.
    pub min_visible_area: f64,
    /// Inset, in pixels, between a rectangle and its children's content box.
    pub padding: f64,
    /// Maximum nesting depth to lay out; `None` recurses until nothing is visible.
    pub max_depth: Option<usize>,
}

impl Default for TreemapOptions {
    fn default() -> Self {
        Self {
            min_visible_area: 400.0,
            padding: 2.0,
            max_depth: None,
        }
    }
}

/// Flame graph layout options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlameOptions {
    /// Children narrower than this many pixels go to the hidden bucket.
    pub min_width: f64,
    /// Pixels subtracted from a node's width to get its content width.
    pub margin: f64,
    /// Hard upper bound on the zoom factor.
    pub max_zoom: f64,
}

impl Default for FlameOptions {
    fn default() -> Self {
        Self {
            min_width: 14.0,
            margin: 2.0,
            max_zoom: 1000.0,
        }
    }
}

/// Which metric to show when a plan is opened.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricPreference {
    /// Time when the plan was timed, cost otherwise.
    #[default]
    Auto,
    /// Time if available.
    Time,
    /// Always cost.
    Cost,
}

impl MetricPreference {
    /// Resolves the preference against a concrete plan. Time is never chosen
    /// for an untimed plan.
    pub fn resolve(self, plan: &AnalyzedPlan) -> Metric {
        match self {
            MetricPreference::Cost => Metric::Cost,
            MetricPreference::Auto | MetricPreference::Time => plan.default_metric(),
        }
    }
}

/// All view options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewOptions {
    /// Treemap layout options.
    pub treemap: TreemapOptions,
    /// Flame graph layout options.
    pub flame: FlameOptions,
    /// Initial metric.
    pub metric: MetricPreference,
}

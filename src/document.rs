#![allow(missing_docs)]

//! Serde model of the explain document produced by the query engine.
//!
//! The document is consumed once per analysis. Structural fields are typed;
//! everything else a node carries is kept verbatim in [`RawPlanNode::details`]
//! for detail panes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// One source text the plan's contexts point into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffer {
    /// Full text of the buffer.
    pub text: String,
    /// Human-readable label (e.g. `query`, `schema`).
    pub label: String,
}

impl From<(String, String)> for Buffer {
    fn from((text, label): (String, String)) -> Self {
        Self { text, label }
    }
}

/// Top-level explain document.
#[derive(Clone, Debug, Deserialize)]
pub struct PlanDocument {
    #[serde(default, deserialize_with = "deserialize_buffers")]
    pub buffers: Vec<Buffer>,
    pub plan: RawPlanNode,
}

impl PlanDocument {
    /// Parses a document from its JSON text.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Converts an already-parsed JSON value into a document.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

fn deserialize_buffers<'de, D>(deserializer: D) -> std::result::Result<Vec<Buffer>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let pairs: Vec<(String, String)> = Vec::deserialize(deserializer)?;
    Ok(pairs.into_iter().map(Buffer::from).collect())
}

/// Entry of a node's `plans` array.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum RawSubPlan {
    /// Back-reference into the replacement-target set in scope.
    Index(u64),
    /// Inline sub-plan.
    Node(Box<RawPlanNode>),
}

/// Source span attached to a raw plan node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawContext {
    pub buffer_idx: usize,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
}

/// A plan node exactly as the engine reported it.
///
/// `node_type` and `total_cost` are required but modelled as options so the
/// tree builder can report which node lacked them.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPlanNode {
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub full_total_time: Option<f64>,
    #[serde(default)]
    pub self_time: Option<f64>,
    #[serde(default)]
    pub self_cost: Option<f64>,
    #[serde(default)]
    pub collapsed_self_time: Option<f64>,
    #[serde(default)]
    pub collapsed_self_cost: Option<f64>,
    #[serde(default)]
    pub plans: Vec<RawSubPlan>,
    #[serde(default)]
    pub nearest_context_plan: Option<Box<RawPlanNode>>,
    #[serde(default)]
    pub collapsed_plans: Option<Vec<RawPlanNode>>,
    #[serde(default)]
    pub contexts: Option<Vec<RawContext>>,
    #[serde(default)]
    pub suggested_display_ctx_idx: Option<usize>,
    /// Remaining engine-specific fields, passed through untouched.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl RawPlanNode {
    /// Returns true if the node carries its own collapsing annotation.
    pub fn has_replacements(&self) -> bool {
        self.nearest_context_plan.is_some() || self.collapsed_plans.is_some()
    }
}

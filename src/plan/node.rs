#![allow(missing_docs)]

use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::ContextId;

static NEXT_PLAN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique plan identifier. Ids are handed out in build order and
/// never reused, even across documents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PlanId(pub u64);

impl PlanId {
    pub(crate) fn next() -> Self {
        PlanId(NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Set of collapsed-context nodes currently showing their full children.
pub type ExpandedSet = FxHashSet<PlanId>;

/// Which measurement drives layout weights and percentages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Wall-clock time from an instrumented run.
    Time,
    /// Planner cost estimate.
    Cost,
}

impl Metric {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Time => "time",
            Metric::Cost => "cost",
        }
    }
}

/// One execution-plan operator.
#[derive(Clone, Debug, Serialize)]
pub struct PlanNode {
    /// Process-unique identifier.
    pub id: PlanId,
    /// Operator name reported by the engine.
    pub node_type: String,
    /// Total time, absent when the query ran without timing instrumentation.
    pub total_time: Option<f64>,
    /// Total planner cost.
    pub total_cost: f64,
    /// Time not attributed to visible children. May be slightly negative.
    pub self_time: Option<f64>,
    /// Cost not attributed to visible children. May be slightly negative.
    pub self_cost: f64,
    /// `self_time` as a share of the whole query.
    pub self_time_percent: Option<f64>,
    /// `self_cost` as a share of the whole query.
    pub self_cost_percent: f64,
    /// Depth of the deepest visible descendant, 0 for leaves.
    pub child_depth: usize,
    /// Display span, if the node carried contexts.
    pub context_id: Option<ContextId>,
    /// Representative node this node's subtree was collapsed into.
    pub nearest_context_plan: Option<PlanId>,
    /// Children shown by the layouts.
    pub sub_plans: Vec<PlanId>,
    /// All children, including ones hidden behind context collapsing.
    pub full_sub_plans: Vec<PlanId>,
    /// True when `full_sub_plans` holds members absent from `sub_plans`.
    pub has_collapsed_plans: bool,
    /// Last node that attached this one as a visible child.
    pub parent: Option<PlanId>,
    /// Engine-specific fields passed through for detail display.
    pub details: Map<String, Value>,
}

impl PlanNode {
    /// Total for `metric`; an untimed node reports zero time.
    pub fn total(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Time => self.total_time.unwrap_or(0.0),
            Metric::Cost => self.total_cost,
        }
    }

    /// Self value for `metric`.
    pub fn self_value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Time => self.self_time.unwrap_or(0.0),
            Metric::Cost => self.self_cost,
        }
    }

    /// Self share of the query for `metric`.
    pub fn self_percent(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Time => self.self_time_percent.unwrap_or(0.0),
            Metric::Cost => self.self_cost_percent,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.sub_plans.is_empty()
    }
}

/// Immutable arena of plan nodes, ordered by id.
#[derive(Clone, Debug)]
pub struct PlanTree {
    nodes: Vec<PlanNode>,
    root: PlanId,
}

impl PlanTree {
    pub(crate) fn new(nodes: Vec<PlanNode>, root: PlanId) -> Self {
        debug_assert!(nodes.windows(2).all(|pair| pair[0].id < pair[1].id));
        Self { nodes, root }
    }

    pub fn root(&self) -> PlanId {
        self.root
    }

    pub fn root_node(&self) -> &PlanNode {
        &self[self.root]
    }

    /// Looks up a node; `None` for ids from another tree.
    pub fn get(&self, id: PlanId) -> Option<&PlanNode> {
        self.nodes
            .binary_search_by_key(&id, |node| node.id)
            .ok()
            .map(|pos| &self.nodes[pos])
    }

    pub fn contains(&self, id: PlanId) -> bool {
        self.get(id).is_some()
    }

    /// Number of distinct nodes, shared collapsed targets counted once.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in build (post-) order.
    pub fn iter(&self) -> impl Iterator<Item = &PlanNode> {
        self.nodes.iter()
    }

    /// Children currently shown for `id`: the full list when the node has
    /// collapsed plans and is expanded, the visible list otherwise.
    pub fn children(&self, id: PlanId, expanded: &ExpandedSet) -> &[PlanId] {
        match self.get(id) {
            Some(node) if node.has_collapsed_plans && expanded.contains(&id) => {
                &node.full_sub_plans
            }
            Some(node) => &node.sub_plans,
            None => &[],
        }
    }

    pub fn parent(&self, id: PlanId) -> Option<PlanId> {
        self.get(id).and_then(|node| node.parent)
    }

    /// Walks parent links upwards, nearest ancestor first.
    pub fn ancestors(&self, id: PlanId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
            remaining: self.nodes.len(),
        }
    }

    /// Returns true if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: PlanId, id: PlanId) -> bool {
        self.ancestors(id).any(|candidate| candidate == ancestor)
    }

    /// Nodes whose display span is `ctx`.
    pub fn plans_with_context(&self, ctx: ContextId) -> Vec<PlanId> {
        self.nodes
            .iter()
            .filter(|node| node.context_id == Some(ctx))
            .map(|node| node.id)
            .collect()
    }

    /// Smallest strictly positive total for `metric`, if any.
    pub fn min_positive_total(&self, metric: Metric) -> Option<f64> {
        self.nodes
            .iter()
            .map(|node| node.total(metric))
            .filter(|total| *total > 0.0)
            .min_by(f64::total_cmp)
    }
}

impl Index<PlanId> for PlanTree {
    type Output = PlanNode;

    fn index(&self, id: PlanId) -> &PlanNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("plan {id} does not belong to this tree"),
        }
    }
}

/// Iterator over a node's ancestors.
///
/// Bounded by the arena size so a malformed parent chain cannot spin.
pub struct Ancestors<'a> {
    tree: &'a PlanTree,
    next: Option<PlanId>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = PlanId;

    fn next(&mut self) -> Option<PlanId> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

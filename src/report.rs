//! Printable summary of a built plan.
//!
//! The report follows the visible tree (collapsed nodes show their
//! aggregated children unless expanded) and is what the `tree` command prints.

use std::fmt;

use serde::Serialize;

use crate::plan::{AnalyzedPlan, ExpandedSet, Metric, PlanId, PlanTree};

/// Whole-plan report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanReport {
    /// Metric the totals and percentages refer to.
    pub metric: Metric,
    /// Query-wide total time, when the plan was timed.
    pub total_time: Option<f64>,
    /// Query-wide total cost.
    pub total_cost: f64,
    /// Root of the visible tree.
    pub root: ReportNode,
}

/// One plan node in a [`PlanReport`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportNode {
    /// Arena id, usable as `--node` for the layout commands.
    pub id: PlanId,
    /// Operator name.
    pub node_type: String,
    /// Total under the report's metric.
    pub total: f64,
    /// Self value under the report's metric.
    pub self_value: f64,
    /// Self value as a fraction of the query total.
    pub self_percent: f64,
    /// Source text of the node's display context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// True if the node currently hides its full children behind an aggregate.
    pub collapsed: bool,
    /// Visible children.
    pub children: Vec<ReportNode>,
}

impl PlanReport {
    /// Builds the report for `plan` under `metric`. Nodes in `expanded`
    /// list their full children instead of the aggregated ones.
    pub fn from_plan(plan: &AnalyzedPlan, metric: Metric, expanded: &ExpandedSet) -> Self {
        let tree = &plan.tree;
        let walk = Walk {
            plan,
            tree,
            metric,
            expanded,
        };
        Self {
            metric,
            total_time: plan.totals.time,
            total_cost: plan.totals.cost,
            root: walk.node(tree.root()),
        }
    }

    /// Number of nodes in the report, duplicates included.
    pub fn node_count(&self) -> usize {
        fn count(node: &ReportNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }
}

struct Walk<'a> {
    plan: &'a AnalyzedPlan,
    tree: &'a PlanTree,
    metric: Metric,
    expanded: &'a ExpandedSet,
}

impl Walk<'_> {
    fn node(&self, id: PlanId) -> ReportNode {
        let node = &self.tree[id];
        let context = node
            .context_id
            .and_then(|ctx| self.plan.contexts.get(ctx))
            .map(|ctx| ctx.text.clone());
        ReportNode {
            id,
            node_type: node.node_type.clone(),
            total: node.total(self.metric),
            self_value: node.self_value(self.metric),
            self_percent: node.self_percent(self.metric),
            context,
            collapsed: node.has_collapsed_plans && !self.expanded.contains(&id),
            children: self
                .tree
                .children(id, self.expanded)
                .iter()
                .map(|child| self.node(*child))
                .collect(),
        }
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_time {
            Some(time) => writeln!(
                f,
                "total time {time:.3}, total cost {:.2}",
                self.total_cost
            )?,
            None => writeln!(f, "total cost {:.2}", self.total_cost)?,
        }
        write_node(f, &self.root, self.metric, 0)
    }
}

fn write_node(
    f: &mut fmt::Formatter<'_>,
    node: &ReportNode,
    metric: Metric,
    depth: usize,
) -> fmt::Result {
    let indent = "  ".repeat(depth);
    write!(
        f,
        "{indent}{} {} [{} {:.2}, self {:.1}%]",
        node.node_type,
        node.id,
        metric.as_str(),
        node.total,
        node.self_percent * 100.0
    )?;
    if node.collapsed {
        f.write_str(" (collapsed)")?;
    }
    if let Some(context) = &node.context {
        write!(f, " `{}`", one_line(context))?;
    }
    writeln!(f)?;
    for child in &node.children {
        write_node(f, child, metric, depth + 1)?;
    }
    Ok(())
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

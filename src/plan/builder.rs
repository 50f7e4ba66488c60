use serde::Serialize;
use tracing::{debug, info};

use crate::context::ContextIndex;
use crate::document::{Buffer, PlanDocument, RawPlanNode, RawSubPlan};
use crate::error::{PlanParseError, Result};
use crate::plan::node::{Metric, PlanId, PlanNode, PlanTree};
use crate::profile::{profile_timer, record_profile_timer, LayoutProfileKind};

/// Whole-query totals that self values are expressed against.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QueryTotals {
    /// Root total time, if the query was timed.
    pub time: Option<f64>,
    /// Root total cost.
    pub cost: f64,
}

/// A fully built plan: the node arena, its contexts, and the source buffers.
#[derive(Clone, Debug)]
pub struct AnalyzedPlan {
    /// Immutable plan arena.
    pub tree: PlanTree,
    /// Frozen context index.
    pub contexts: ContextIndex,
    /// Source texts the contexts point into.
    pub buffers: Vec<Buffer>,
    /// Totals the percentages were computed against.
    pub totals: QueryTotals,
}

impl AnalyzedPlan {
    /// Returns true if the plan carries timing data.
    pub fn is_timed(&self) -> bool {
        self.totals.time.is_some()
    }

    /// Metric used when the caller has no preference.
    pub fn default_metric(&self) -> Metric {
        if self.is_timed() {
            Metric::Time
        } else {
            Metric::Cost
        }
    }
}

/// Builds the plan tree for a whole document.
///
/// Query totals are taken from the root node. Fails without returning a
/// partial tree if any node is malformed or a back-reference cannot resolve.
pub fn build_plan_tree(doc: &PlanDocument) -> Result<AnalyzedPlan> {
    let timer = profile_timer();
    let root_type = doc.plan.node_type.as_deref();
    let cost = doc
        .plan
        .total_cost
        .ok_or_else(|| PlanParseError::missing("total_cost", root_type))?;
    let totals = QueryTotals {
        time: doc.plan.full_total_time,
        cost,
    };

    let mut builder = TreeBuilder::new(totals, doc.buffers.len());
    let root = builder.build(&doc.plan, None)?;
    let tree = PlanTree::new(builder.nodes, root);
    record_profile_timer(LayoutProfileKind::Build, timer);

    info!(
        nodes = tree.len(),
        contexts = builder.contexts.len(),
        depth = tree.root_node().child_depth,
        timed = totals.time.is_some(),
        "plan.build.completed"
    );
    Ok(AnalyzedPlan {
        tree,
        contexts: builder.contexts,
        buffers: doc.buffers.clone(),
        totals,
    })
}

/// State of one entry in a replacement-target set.
#[derive(Clone, Copy)]
enum Slot<'a> {
    /// `nearest_context_plan` was not supplied, so index 0 has no target.
    Absent,
    Pending(&'a RawPlanNode),
    Building,
    Built(PlanId),
}

/// Replacement targets `[nearest_context_plan, ...collapsed_plans]` of one
/// annotated node, memoized as they are built.
struct ReplacementTable<'a> {
    slots: Vec<Slot<'a>>,
}

impl<'a> ReplacementTable<'a> {
    fn for_node(raw: &'a RawPlanNode) -> Self {
        let mut slots = Vec::with_capacity(1 + raw.collapsed_plans.as_ref().map_or(0, Vec::len));
        slots.push(match raw.nearest_context_plan.as_deref() {
            Some(target) => Slot::Pending(target),
            None => Slot::Absent,
        });
        if let Some(collapsed) = raw.collapsed_plans.as_ref() {
            slots.extend(collapsed.iter().map(Slot::Pending));
        }
        Self { slots }
    }
}

struct TreeBuilder<'a> {
    totals: QueryTotals,
    buffers: usize,
    contexts: ContextIndex,
    nodes: Vec<PlanNode>,
    tables: Vec<ReplacementTable<'a>>,
}

impl<'a> TreeBuilder<'a> {
    fn new(totals: QueryTotals, buffers: usize) -> Self {
        Self {
            totals,
            buffers,
            contexts: ContextIndex::new(),
            nodes: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Builds `raw` and its subtree. `scope` is the replacement table numeric
    /// entries resolve against, inherited from the nearest annotated ancestor.
    fn build(&mut self, raw: &'a RawPlanNode, scope: Option<usize>) -> Result<PlanId> {
        let node_type = raw
            .node_type
            .as_deref()
            .ok_or_else(|| PlanParseError::missing("node_type", None))?;
        let total_cost = raw
            .total_cost
            .ok_or_else(|| PlanParseError::missing("total_cost", Some(node_type)))?;

        let scope = if raw.has_replacements() {
            self.tables.push(ReplacementTable::for_node(raw));
            Some(self.tables.len() - 1)
        } else {
            scope
        };

        let nearest_context_plan = match raw.nearest_context_plan {
            Some(_) => Some(self.resolve(scope, 0)?),
            None => None,
        };

        let mut full_sub_plans = Vec::with_capacity(raw.plans.len());
        let mut inline = Vec::new();
        for entry in &raw.plans {
            let id = match entry {
                RawSubPlan::Index(index) => self.resolve(scope, *index)?,
                RawSubPlan::Node(child) => {
                    let id = self.build(child, scope)?;
                    inline.push(id);
                    id
                }
            };
            full_sub_plans.push(id);
        }

        let mut sub_plans = match nearest_context_plan {
            Some(ncp) => {
                let mut visible = self.node(ncp).sub_plans.clone();
                visible.extend_from_slice(&inline);
                visible
            }
            None => full_sub_plans.clone(),
        };
        if raw.full_total_time.is_some() {
            sub_plans.sort_by(|a, b| {
                let (a, b) = (self.node(*a), self.node(*b));
                b.total(Metric::Time).total_cmp(&a.total(Metric::Time))
            });
        }

        let child_depth = sub_plans
            .iter()
            .map(|id| self.node(*id).child_depth + 1)
            .max()
            .unwrap_or(0);
        let has_collapsed_plans =
            nearest_context_plan.is_some() && !same_members(&full_sub_plans, &sub_plans);

        let total_time = raw.full_total_time;
        let self_time = raw.collapsed_self_time.or(raw.self_time).or_else(|| {
            total_time.map(|total| total - self.sum_children(&sub_plans, Metric::Time))
        });
        let self_cost = raw
            .collapsed_self_cost
            .or(raw.self_cost)
            .unwrap_or_else(|| total_cost - self.sum_children(&sub_plans, Metric::Cost));
        let self_time_percent = match (self_time, self.totals.time) {
            (Some(value), Some(query)) => Some(share(value, query)),
            _ => None,
        };
        let self_cost_percent = share(self_cost, self.totals.cost);

        let context_id = match raw.contexts.as_deref() {
            Some(candidates) if !candidates.is_empty() => {
                let display_idx = raw.suggested_display_ctx_idx.unwrap_or(0);
                let display = candidates.get(display_idx).ok_or(
                    PlanParseError::ContextOutOfRange {
                        index: display_idx,
                        len: candidates.len(),
                    },
                )?;
                // Without buffers there is no source to check spans against.
                if self.buffers > 0 && display.buffer_idx >= self.buffers {
                    return Err(PlanParseError::BufferOutOfRange {
                        buffer_idx: display.buffer_idx,
                        buffers: self.buffers,
                    });
                }
                self.contexts.index_raw(
                    candidates,
                    display_idx,
                    self_time_percent,
                    self_cost_percent,
                )
            }
            _ => None,
        };

        let id = PlanId::next();
        for child in &sub_plans {
            self.node_mut(*child).parent = Some(id);
        }
        debug!(
            plan = id.0,
            node_type,
            children = sub_plans.len(),
            collapsed = has_collapsed_plans,
            "plan.build.node"
        );
        self.nodes.push(PlanNode {
            id,
            node_type: node_type.to_string(),
            total_time,
            total_cost,
            self_time,
            self_cost,
            self_time_percent,
            self_cost_percent,
            child_depth,
            context_id,
            nearest_context_plan,
            sub_plans,
            full_sub_plans,
            has_collapsed_plans,
            parent: None,
            details: raw.details.clone(),
        });
        Ok(id)
    }

    /// Resolves a numeric entry, building its target on first use.
    fn resolve(&mut self, scope: Option<usize>, index: u64) -> Result<PlanId> {
        let Some(table) = scope else {
            return Err(PlanParseError::DanglingReference { index, targets: 0 });
        };
        let targets = self.tables[table].slots.len();
        let dangling = PlanParseError::DanglingReference { index, targets };
        let Some(pos) = usize::try_from(index).ok().filter(|pos| *pos < targets) else {
            return Err(dangling);
        };
        match self.tables[table].slots[pos] {
            Slot::Built(id) => Ok(id),
            Slot::Building => Err(PlanParseError::ReferenceCycle { index }),
            Slot::Absent => Err(dangling),
            Slot::Pending(target) => {
                self.tables[table].slots[pos] = Slot::Building;
                let id = self.build(target, Some(table))?;
                self.tables[table].slots[pos] = Slot::Built(id);
                Ok(id)
            }
        }
    }

    fn sum_children(&self, children: &[PlanId], metric: Metric) -> f64 {
        children.iter().map(|id| self.node(*id).total(metric)).sum()
    }

    // Nodes are pushed in id order, so lookups binary-search the arena.
    fn position(&self, id: PlanId) -> usize {
        match self.nodes.binary_search_by_key(&id, |node| node.id) {
            Ok(pos) => pos,
            Err(_) => unreachable!("plan {id} referenced before it was built"),
        }
    }

    fn node(&self, id: PlanId) -> &PlanNode {
        &self.nodes[self.position(id)]
    }

    fn node_mut(&mut self, id: PlanId) -> &mut PlanNode {
        let pos = self.position(id);
        &mut self.nodes[pos]
    }
}

/// Ratio guarded against a zero denominator.
fn share(value: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        value / total
    }
}

/// Membership comparison by identity; order is ignored.
fn same_members(a: &[PlanId], b: &[PlanId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

#![allow(missing_docs)]

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::ViewOptions;
use crate::context::ContextId;
use crate::layout::{
    layout_flame, layout_treemap, max_zoom, FlameRect, FlameViewport, Rect, TreemapLayout,
};
use crate::plan::{AnalyzedPlan, ExpandedSet, Metric, PlanId, PlanTree};

/// Direction of a treemap focus change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    In,
    Out,
}

/// Describes a pending treemap zoom animation.
///
/// Zooming in carries the clicked rectangle so the caller can grow it to full
/// size; zooming out animates towards the ancestor's previously stored rect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TreemapTransition {
    pub kind: TransitionKind,
    /// Node that was focused before the change.
    pub from: PlanId,
    /// Screen rectangle of the clicked node, for zoom-in only.
    pub start_rect: Option<Rect>,
}

/// Per-visualization interaction state.
///
/// Every setter updates the derived fields it affects before returning and
/// reports whether anything changed.
#[derive(Clone, Debug)]
pub struct PlanViewState {
    plan: Arc<AnalyzedPlan>,
    options: ViewOptions,
    metric: Metric,
    hovered: Option<PlanId>,
    hovered_context: Option<ContextId>,
    selected: Option<PlanId>,
    selected_context: Option<ContextId>,
    selected_parent_context: Option<ContextId>,
    focused: Option<PlanId>,
    transition: Option<TreemapTransition>,
    expanded: ExpandedSet,
    source_highlight: Option<ContextId>,
    flame: FlameViewport,
}

impl PlanViewState {
    /// Opens a view over `plan` with the given options and flame viewport width.
    pub fn new(plan: Arc<AnalyzedPlan>, options: ViewOptions, flame_width: f64) -> Self {
        let metric = options.metric.resolve(&plan);
        Self {
            plan,
            options,
            metric,
            hovered: None,
            hovered_context: None,
            selected: None,
            selected_context: None,
            selected_parent_context: None,
            focused: None,
            transition: None,
            expanded: ExpandedSet::default(),
            source_highlight: None,
            flame: FlameViewport::new(flame_width),
        }
    }

    pub fn plan(&self) -> &Arc<AnalyzedPlan> {
        &self.plan
    }

    pub fn tree(&self) -> &PlanTree {
        &self.plan.tree
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn hovered(&self) -> Option<PlanId> {
        self.hovered
    }

    pub fn hovered_context(&self) -> Option<ContextId> {
        self.hovered_context
    }

    pub fn selected(&self) -> Option<PlanId> {
        self.selected
    }

    pub fn selected_context(&self) -> Option<ContextId> {
        self.selected_context
    }

    /// Context shown as the selected node's breadcrumb parent.
    pub fn selected_parent_context(&self) -> Option<ContextId> {
        self.selected_parent_context
    }

    /// Treemap drill-in target; the root when nothing is focused.
    pub fn focused(&self) -> PlanId {
        self.focused.unwrap_or_else(|| self.plan.tree.root())
    }

    pub fn transition(&self) -> Option<&TreemapTransition> {
        self.transition.as_ref()
    }

    pub fn expanded(&self) -> &ExpandedSet {
        &self.expanded
    }

    pub fn is_expanded(&self, id: PlanId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn flame(&self) -> &FlameViewport {
        &self.flame
    }

    /// Context that drives highlighting for `id`: the nearest context plan's
    /// span while the node is collapsed, the node's own span otherwise.
    pub fn effective_context(&self, id: PlanId) -> Option<ContextId> {
        let tree = &self.plan.tree;
        let node = tree.get(id)?;
        match node.nearest_context_plan {
            Some(ncp) if !self.expanded.contains(&id) => tree
                .get(ncp)
                .and_then(|target| target.context_id)
                .or(node.context_id),
            _ => node.context_id,
        }
    }

    /// Effective context of `id`, or of its closest ancestor that has one.
    pub fn nearest_context(&self, id: PlanId) -> Option<ContextId> {
        self.effective_context(id).or_else(|| {
            self.plan
                .tree
                .ancestors(id)
                .find_map(|ancestor| self.effective_context(ancestor))
        })
    }

    /// Nearest context of the parent of `id`.
    pub fn parent_context(&self, id: PlanId) -> Option<ContextId> {
        self.plan
            .tree
            .parent(id)
            .and_then(|parent| self.nearest_context(parent))
    }

    /// Context to highlight in the source: plan hover wins over the
    /// selection, which wins over a highlight coming from the source side.
    pub fn highlighted_context(&self) -> Option<ContextId> {
        self.hovered_context
            .or(self.selected_context)
            .or(self.source_highlight)
    }

    /// Plans whose effective context is currently highlighted.
    pub fn highlighted_plans(&self) -> Vec<PlanId> {
        let Some(ctx) = self.highlighted_context() else {
            return Vec::new();
        };
        self.plan
            .tree
            .iter()
            .filter(|node| self.effective_context(node.id) == Some(ctx))
            .map(|node| node.id)
            .collect()
    }

    /// Breadcrumb from the root down to the focused node.
    pub fn focus_path(&self) -> Vec<PlanId> {
        let focused = self.focused();
        let mut path: Vec<PlanId> = self.plan.tree.ancestors(focused).collect();
        path.reverse();
        path.push(focused);
        path
    }

    /// Upper zoom bound for the flame graph under the current metric.
    pub fn max_flame_zoom(&self) -> f64 {
        max_zoom(
            &self.plan.tree,
            self.metric,
            self.flame.width,
            &self.options.flame,
        )
    }

    pub fn hover(&mut self, id: Option<PlanId>) -> bool {
        let id = id.filter(|id| self.plan.tree.contains(*id));
        if id == self.hovered {
            return false;
        }
        self.hovered = id;
        self.hovered_context = id.and_then(|id| self.effective_context(id));
        true
    }

    /// Selects `id`, or clears the selection if it is already selected.
    pub fn select(&mut self, id: PlanId) -> bool {
        if !self.plan.tree.contains(id) {
            return false;
        }
        if self.selected == Some(id) {
            return self.clear_selection();
        }
        self.selected = Some(id);
        self.refresh_selection_contexts();
        true
    }

    pub fn clear_selection(&mut self) -> bool {
        if self.selected.is_none() {
            return false;
        }
        self.selected = None;
        self.selected_context = None;
        self.selected_parent_context = None;
        true
    }

    /// Moves the treemap focus, recording the transition to animate.
    ///
    /// Focusing an ancestor of the current focus zooms out; anything else
    /// zooms in. Re-focusing the current node does nothing.
    pub fn focus(&mut self, id: PlanId, start_rect: Option<Rect>) -> bool {
        let tree = &self.plan.tree;
        if !tree.contains(id) {
            return false;
        }
        let current = self.focused();
        if id == current {
            return false;
        }
        let transition = if tree.is_ancestor(id, current) {
            TreemapTransition {
                kind: TransitionKind::Out,
                from: current,
                start_rect: None,
            }
        } else {
            TreemapTransition {
                kind: TransitionKind::In,
                from: current,
                start_rect,
            }
        };
        debug!(
            from = current.0,
            to = id.0,
            kind = ?transition.kind,
            "view.focus.transition"
        );
        self.focused = Some(id);
        self.transition = Some(transition);
        true
    }

    /// Focuses the parent of the current focus.
    pub fn zoom_out(&mut self) -> bool {
        match self.plan.tree.parent(self.focused()) {
            Some(parent) => self.focus(parent, None),
            None => false,
        }
    }

    /// Clears the transition once the caller's animation has finished.
    pub fn complete_transition(&mut self) -> bool {
        self.transition.take().is_some()
    }

    /// Shows or hides the full children of a node with collapsed plans.
    pub fn toggle_expanded(&mut self, id: PlanId) -> bool {
        let collapsible = self
            .plan
            .tree
            .get(id)
            .is_some_and(|node| node.has_collapsed_plans);
        if !collapsible {
            return false;
        }
        if !self.expanded.remove(&id) {
            self.expanded.insert(id);
        }
        // Effective contexts depend on expansion.
        self.hovered_context = self.hovered.and_then(|id| self.effective_context(id));
        self.refresh_selection_contexts();
        true
    }

    /// Highlights a context from the source side (source to plan direction).
    pub fn highlight_context(&mut self, ctx: Option<ContextId>) -> bool {
        let ctx = ctx.filter(|ctx| self.plan.contexts.get(*ctx).is_some());
        if ctx == self.source_highlight {
            return false;
        }
        self.source_highlight = ctx;
        true
    }

    /// Switches the metric; time is refused for untimed plans.
    pub fn set_metric(&mut self, metric: Metric) -> bool {
        if metric == self.metric || (metric == Metric::Time && !self.plan.is_timed()) {
            return false;
        }
        self.metric = metric;
        let max = self.max_flame_zoom();
        if self.flame.zoom > max {
            self.flame.set_zoom(max, 0.0, max);
        }
        true
    }

    pub fn set_flame_zoom(&mut self, zoom: f64, focal_px: f64) -> bool {
        let before = self.flame;
        let max = self.max_flame_zoom();
        self.flame.set_zoom(zoom, focal_px, max);
        self.flame != before
    }

    pub fn pan_flame(&mut self, dx: f64) -> bool {
        let before = self.flame.offset;
        self.flame.pan_by(dx);
        self.flame.offset != before
    }

    pub fn resize_flame(&mut self, width: f64) -> bool {
        let before = self.flame;
        self.flame.resize(width);
        let max = self.max_flame_zoom();
        if self.flame.zoom > max {
            self.flame.set_zoom(max, 0.0, max);
        }
        self.flame != before
    }

    /// Treemap of the focused node for a `width` x `height` surface.
    pub fn treemap_layout(&self, width: f64, height: f64) -> TreemapLayout {
        layout_treemap(
            &self.plan.tree,
            self.focused(),
            self.metric,
            (width, height),
            &self.options.treemap,
            &self.expanded,
        )
    }

    /// Flame graph of the whole plan under the current zoom and pan.
    pub fn flame_layout(&self) -> Vec<FlameRect> {
        layout_flame(
            &self.plan.tree,
            self.plan.tree.root(),
            &self.flame,
            self.metric,
            &self.options.flame,
            &self.expanded,
        )
    }

    fn refresh_selection_contexts(&mut self) {
        match self.selected {
            Some(id) => {
                self.selected_context = self.effective_context(id);
                self.selected_parent_context = self.parent_context(id);
            }
            None => {
                self.selected_context = None;
                self.selected_parent_context = None;
            }
        }
    }
}

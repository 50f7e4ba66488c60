#![allow(missing_docs)]

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::FlameOptions;
use crate::plan::{ExpandedSet, Metric, PlanId, PlanTree};
use crate::profile::{profile_timer, record_flame_culled, record_profile_timer, LayoutProfileKind};

/// One child positioned inside its parent's pixel span.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FlameChild {
    pub id: PlanId,
    /// Offset from the parent's left edge, in pixels.
    pub left: f64,
    pub width: f64,
}

/// Children too narrow to draw, merged into one trailing block.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HiddenBucket {
    pub count: usize,
    pub left: f64,
    pub width: f64,
}

/// One level of flame graph layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlameChildren {
    /// Visible children, widest first, left to right.
    pub children: Vec<FlameChild>,
    pub hidden: Option<HiddenBucket>,
    /// Parent width minus the fixed margin.
    pub content_width: f64,
    /// Width left over for the parent's own share.
    pub self_width: f64,
}

/// Lays out the direct children of `node` across `pixel_width` pixels.
///
/// Widths are proportional to each child's share of the parent total (or of
/// the children's sum, if that is larger). Children narrower than
/// `min_width` are accumulated into the hidden bucket. Visible widths, the
/// hidden width, and `self_width` always add up to `content_width`.
pub fn flame_children(
    tree: &PlanTree,
    node: PlanId,
    pixel_width: f64,
    metric: Metric,
    opts: &FlameOptions,
    expanded: &ExpandedSet,
) -> FlameChildren {
    let content_width = (pixel_width - opts.margin).max(0.0);
    let mut level = FlameChildren {
        content_width,
        self_width: content_width,
        ..FlameChildren::default()
    };
    let Some(parent) = tree.get(node) else {
        return level;
    };
    let mut weights: Vec<(PlanId, f64)> = tree
        .children(node, expanded)
        .iter()
        .filter_map(|id| tree.get(*id))
        .map(|child| (child.id, child.total(metric).max(0.0)))
        .collect();
    if weights.is_empty() {
        return level;
    }
    let child_sum: f64 = weights.iter().map(|(_, w)| w).sum();
    let denominator = parent.total(metric).max(child_sum);
    let scale = if denominator > 0.0 {
        content_width / denominator
    } else {
        0.0
    };
    weights.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut cursor = opts.margin / 2.0;
    let (mut hidden_count, mut hidden_width) = (0usize, 0.0);
    for (id, weight) in weights {
        let width = weight * scale;
        if width < opts.min_width {
            hidden_count += 1;
            hidden_width += width;
            continue;
        }
        level.children.push(FlameChild {
            id,
            left: cursor,
            width,
        });
        cursor += width;
    }
    if hidden_count > 0 {
        level.hidden = Some(HiddenBucket {
            count: hidden_count,
            left: cursor,
            width: hidden_width,
        });
    }
    level.self_width = content_width - child_sum * scale;
    level
}

/// Horizontal zoom and pan state of a flame graph.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FlameViewport {
    /// Width of the visible area in pixels.
    pub width: f64,
    /// Multiplier applied to the root's width, at least 1.
    pub zoom: f64,
    /// Pixels of the zoomed root scrolled off to the left.
    pub offset: f64,
}

impl FlameViewport {
    pub fn new(width: f64) -> Self {
        Self {
            width: width.max(0.0),
            zoom: 1.0,
            offset: 0.0,
        }
    }

    /// Width of the zoomed root.
    pub fn total_width(&self) -> f64 {
        self.width * self.zoom
    }

    pub fn max_offset(&self) -> f64 {
        ((self.zoom - 1.0) * self.width).max(0.0)
    }

    pub fn clamp_offset(&mut self) {
        self.offset = self.offset.clamp(0.0, self.max_offset());
    }

    /// Fraction of the root under screen pixel `px`.
    pub fn world_position(&self, px: f64) -> f64 {
        let total = self.total_width();
        if total > 0.0 {
            (self.offset + px) / total
        } else {
            0.0
        }
    }

    /// Changes the zoom factor while keeping the root position under
    /// `focal_px` fixed on screen (as far as the offset clamp allows).
    pub fn set_zoom(&mut self, zoom: f64, focal_px: f64, max_zoom: f64) {
        let zoom = if zoom.is_finite() { zoom } else { 1.0 };
        let zoom = zoom.clamp(1.0, max_zoom.max(1.0));
        let anchor = self.world_position(focal_px);
        self.zoom = zoom;
        self.offset = anchor * self.total_width() - focal_px;
        self.clamp_offset();
    }

    pub fn pan_by(&mut self, dx: f64) {
        self.offset += dx;
        self.clamp_offset();
    }

    /// Adapts to a new viewport width, keeping the left edge's root position.
    pub fn resize(&mut self, width: f64) {
        let anchor = self.world_position(0.0);
        self.width = width.max(0.0);
        self.offset = anchor * self.total_width();
        self.clamp_offset();
    }
}

/// What a flame rectangle stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlameEntry {
    Plan { id: PlanId },
    Hidden { count: usize },
}

/// One positioned flame graph block in screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FlameRect {
    pub entry: FlameEntry,
    /// Left edge relative to the viewport (negative when scrolled off).
    pub left: f64,
    pub width: f64,
    /// Row index, 0 for the root.
    pub depth: usize,
}

impl FlameRect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }
}

/// Lays out the flame graph rooted at `root`, top-down.
///
/// Children entirely outside the viewport are neither emitted nor recursed
/// into. A zero-width viewport yields nothing.
pub fn layout_flame(
    tree: &PlanTree,
    root: PlanId,
    viewport: &FlameViewport,
    metric: Metric,
    opts: &FlameOptions,
    expanded: &ExpandedSet,
) -> Vec<FlameRect> {
    let mut out = Vec::new();
    if !(viewport.width > 0.0) || !tree.contains(root) {
        return out;
    }
    let timer = profile_timer();
    let width = viewport.total_width();
    out.push(FlameRect {
        entry: FlameEntry::Plan { id: root },
        left: -viewport.offset,
        width,
        depth: 0,
    });
    let mut walk = FlameWalk {
        tree,
        metric,
        opts,
        expanded,
        out,
        culled: 0,
    };
    walk.place(
        root,
        -viewport.offset,
        width,
        0,
        (viewport.offset, viewport.offset + viewport.width),
    );
    record_profile_timer(LayoutProfileKind::Flame, timer);
    record_flame_culled(walk.culled);
    debug!(
        root = root.0,
        zoom = viewport.zoom,
        offset = viewport.offset,
        rects = walk.out.len(),
        culled = walk.culled,
        "layout.flame.completed"
    );
    walk.out
}

struct FlameWalk<'a> {
    tree: &'a PlanTree,
    metric: Metric,
    opts: &'a FlameOptions,
    expanded: &'a ExpandedSet,
    out: Vec<FlameRect>,
    culled: u64,
}

impl FlameWalk<'_> {
    /// `visible` is the viewport translated into `node`'s local coordinates.
    fn place(
        &mut self,
        node: PlanId,
        screen_left: f64,
        width: f64,
        depth: usize,
        visible: (f64, f64),
    ) {
        let level = flame_children(self.tree, node, width, self.metric, self.opts, self.expanded);
        for child in level.children {
            if child.left + child.width < visible.0 || child.left > visible.1 {
                self.culled += 1;
                trace!(plan = child.id.0, depth = depth + 1, "layout.flame.culled");
                continue;
            }
            self.out.push(FlameRect {
                entry: FlameEntry::Plan { id: child.id },
                left: screen_left + child.left,
                width: child.width,
                depth: depth + 1,
            });
            self.place(
                child.id,
                screen_left + child.left,
                child.width,
                depth + 1,
                (visible.0 - child.left, visible.1 - child.left),
            );
        }
        if let Some(hidden) = level.hidden {
            if hidden.left + hidden.width >= visible.0 && hidden.left <= visible.1 {
                self.out.push(FlameRect {
                    entry: FlameEntry::Hidden {
                        count: hidden.count,
                    },
                    left: screen_left + hidden.left,
                    width: hidden.width,
                    depth: depth + 1,
                });
            }
        }
    }
}

/// Zoom at which the narrowest positive node reaches `min_width`, clamped to
/// `[1, opts.max_zoom]`.
pub fn max_zoom(tree: &PlanTree, metric: Metric, viewport_width: f64, opts: &FlameOptions) -> f64 {
    let root_total = tree.root_node().total(metric);
    let Some(smallest) = tree.min_positive_total(metric) else {
        return 1.0;
    };
    if !(viewport_width > 0.0) || root_total <= 0.0 {
        return 1.0;
    }
    let zoom = opts.min_width * root_total / (smallest * viewport_width);
    zoom.clamp(1.0, opts.max_zoom.max(1.0))
}

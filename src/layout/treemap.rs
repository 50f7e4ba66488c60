#![allow(missing_docs)]

use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::TreemapOptions;
use crate::plan::{ExpandedSet, Metric, PlanId, PlanTree};
use crate::profile::{profile_timer, record_profile_timer, record_treemap_hidden, LayoutProfileKind};

/// Axis-aligned rectangle expressed as fractions of the parent's content box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// The whole parent.
    pub const FULL: Rect = Rect {
        top: 0.0,
        left: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// True if the interiors intersect by more than `eps` on both axes.
    pub fn overlaps(&self, other: &Rect, eps: f64) -> bool {
        let x = self.right().min(other.right()) - self.left.max(other.left);
        let y = self.bottom().min(other.bottom()) - self.top.max(other.top);
        x > eps && y > eps
    }
}

/// Input to [`squarify`]: a payload and its share of the parent area.
#[derive(Clone, Debug, PartialEq)]
pub struct TreemapItem<T> {
    pub item: T,
    pub area: f64,
}

/// Output of [`squarify`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreemapRect<T> {
    pub item: T,
    pub rect: Rect,
}

/// Which side of the remaining region the current strip is laid along.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strip {
    /// Strip spans the full remaining height at the left edge; items stack top to bottom.
    Column,
    /// Strip spans the full remaining width at the top edge; items run left to right.
    Row,
}

/// The still-unlaid part of the parent, in parent fractions.
struct Region {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    /// Width / height of the whole parent in real units.
    parent_ratio: f64,
}

impl Region {
    /// Aspect ratio of the remaining region in real units.
    fn ratio(&self) -> f64 {
        if self.height <= 0.0 {
            f64::INFINITY
        } else {
            self.width * self.parent_ratio / self.height
        }
    }

    fn strip(&self) -> Strip {
        if self.ratio() < 1.0 {
            Strip::Row
        } else {
            Strip::Column
        }
    }

    /// Worst aspect ratio of a group of areas laid as the next strip.
    ///
    /// Zero-area members produce degenerate rectangles and are skipped.
    fn worst_ratio(&self, areas: impl Iterator<Item = f64>, total: f64) -> f64 {
        let side = match self.strip() {
            Strip::Column => self.height,
            Strip::Row => self.width * self.parent_ratio,
        };
        let total = total * self.parent_ratio;
        if total <= 0.0 || side <= 0.0 {
            return 0.0;
        }
        let thickness = total / side;
        areas
            .filter(|area| *area > 0.0)
            .map(|area| {
                let length = area * self.parent_ratio / thickness;
                (thickness / length).max(length / thickness)
            })
            .fold(0.0, f64::max)
    }

    /// Turns the group into rectangles and shrinks the region past them.
    fn flush<T>(
        &mut self,
        group: &mut SmallVec<[(T, f64); 8]>,
        group_area: f64,
        out: &mut Vec<TreemapRect<T>>,
    ) {
        let strip = self.strip();
        let mut cursor = match strip {
            Strip::Column => self.top,
            Strip::Row => self.left,
        };
        let (span, thickness) = match strip {
            Strip::Column => (self.height, fraction(group_area, self.height).min(self.width)),
            Strip::Row => (self.width, fraction(group_area, self.width).min(self.height)),
        };
        for (item, area) in group.drain(..) {
            let length = span * fraction(area, group_area);
            let rect = match strip {
                Strip::Column => Rect {
                    top: cursor,
                    left: self.left,
                    width: thickness,
                    height: length,
                },
                Strip::Row => Rect {
                    top: self.top,
                    left: cursor,
                    width: length,
                    height: thickness,
                },
            };
            cursor += length;
            out.push(TreemapRect { item, rect });
        }
        match strip {
            Strip::Column => {
                self.left += thickness;
                self.width = (self.width - thickness).max(0.0);
            }
            Strip::Row => {
                self.top += thickness;
                self.height = (self.height - thickness).max(0.0);
            }
        }
    }
}

fn fraction(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

/// Lays out items with the squarified heuristic.
///
/// Items are consumed in the given order, which should be descending by area;
/// the heuristic does not re-sort. Areas are fractions of the parent summing to
/// at most 1. Returned rectangles are fractions of the parent, so a child's own
/// children can be laid out by a fresh call.
pub fn squarify<T>(parent_aspect_ratio: f64, items: Vec<TreemapItem<T>>) -> Vec<TreemapRect<T>> {
    let mut out = Vec::with_capacity(items.len());
    if items.is_empty() || !(parent_aspect_ratio > 0.0) || !parent_aspect_ratio.is_finite() {
        return out;
    }
    let mut region = Region {
        left: 0.0,
        top: 0.0,
        width: 1.0,
        height: 1.0,
        parent_ratio: parent_aspect_ratio,
    };
    let mut group: SmallVec<[(T, f64); 8]> = SmallVec::new();
    let mut group_area = 0.0;
    let mut group_worst = 0.0;

    for TreemapItem { item, area } in items {
        let area = if area > 0.0 { area } else { 0.0 };
        if !group.is_empty() {
            let areas = group.iter().map(|(_, a)| *a).chain(std::iter::once(area));
            let candidate_worst = region.worst_ratio(areas, group_area + area);
            if candidate_worst > group_worst {
                region.flush(&mut group, group_area, &mut out);
                group_area = 0.0;
            } else {
                group.push((item, area));
                group_area += area;
                group_worst = candidate_worst;
                continue;
            }
        }
        group.push((item, area));
        group_area = area;
        group_worst = region.worst_ratio(std::iter::once(area), area);
    }
    if !group.is_empty() {
        region.flush(&mut group, group_area, &mut out);
    }
    out
}

/// What a treemap rectangle stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreemapEntry {
    /// A visible child plan.
    Plan { id: PlanId },
    /// Children too small to draw individually.
    Hidden { count: usize },
    /// The parent's own, unattributed share.
    Residual,
}

/// One laid-out rectangle and, for plans, its own nested layout.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreemapNode {
    pub entry: TreemapEntry,
    /// Position within the parent's content box.
    pub rect: Rect,
    /// Nesting level, 1 for the direct children of the laid-out node.
    pub depth: usize,
    pub children: Vec<TreemapNode>,
}

/// Recursive treemap for one focused node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreemapLayout {
    pub root: PlanId,
    pub width: f64,
    pub height: f64,
    pub items: Vec<TreemapNode>,
}

impl TreemapLayout {
    /// Flattens the nested layout into absolute pixel rectangles, parents first.
    pub fn absolute(&self, padding: f64) -> Vec<(TreemapEntry, usize, Rect)> {
        let mut out = Vec::new();
        let frame = Rect {
            top: 0.0,
            left: 0.0,
            width: self.width,
            height: self.height,
        };
        flatten(&self.items, frame, padding, &mut out);
        out
    }

    /// Number of rectangles at every depth.
    pub fn len(&self) -> usize {
        fn count(nodes: &[TreemapNode]) -> usize {
            nodes.iter().map(|node| 1 + count(&node.children)).sum()
        }
        count(&self.items)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn flatten(
    nodes: &[TreemapNode],
    frame: Rect,
    padding: f64,
    out: &mut Vec<(TreemapEntry, usize, Rect)>,
) {
    for node in nodes {
        let px = Rect {
            top: frame.top + node.rect.top * frame.height,
            left: frame.left + node.rect.left * frame.width,
            width: node.rect.width * frame.width,
            height: node.rect.height * frame.height,
        };
        out.push((node.entry, node.depth, px));
        if !node.children.is_empty() {
            let content = Rect {
                top: px.top + padding,
                left: px.left + padding,
                width: (px.width - 2.0 * padding).max(0.0),
                height: (px.height - 2.0 * padding).max(0.0),
            };
            flatten(&node.children, content, padding, out);
        }
    }
}

/// Lays out the children of `node` inside a `width` x `height` pixel box,
/// recursing into every child large enough to show its own children.
///
/// A zero-size box yields an empty layout.
pub fn layout_treemap(
    tree: &PlanTree,
    node: PlanId,
    metric: Metric,
    (width, height): (f64, f64),
    opts: &TreemapOptions,
    expanded: &ExpandedSet,
) -> TreemapLayout {
    let timer = profile_timer();
    let items = layout_level(tree, node, metric, width, height, opts, expanded, 1);
    record_profile_timer(LayoutProfileKind::Treemap, timer);
    debug!(
        root = node.0,
        width,
        height,
        top_level = items.len(),
        "layout.treemap.completed"
    );
    TreemapLayout {
        root: node,
        width,
        height,
        items,
    }
}

#[allow(clippy::too_many_arguments)]
fn layout_level(
    tree: &PlanTree,
    node: PlanId,
    metric: Metric,
    width: f64,
    height: f64,
    opts: &TreemapOptions,
    expanded: &ExpandedSet,
    depth: usize,
) -> Vec<TreemapNode> {
    if !(width > 0.0 && height > 0.0) {
        return Vec::new();
    }
    if opts.max_depth.is_some_and(|max| depth > max) {
        return Vec::new();
    }
    let Some(parent) = tree.get(node) else {
        return Vec::new();
    };
    let children = tree.children(node, expanded);
    let weights: SmallVec<[(PlanId, f64); 16]> = children
        .iter()
        .filter_map(|id| tree.get(*id))
        .map(|child| (child.id, child.total(metric).max(0.0)))
        .collect();
    let child_sum: f64 = weights.iter().map(|(_, w)| w).sum();
    // Children reporting more than the parent (timer noise) are scaled to fit.
    let denominator = parent.total(metric).max(child_sum);
    if denominator <= 0.0 {
        return Vec::new();
    }

    let pixel_area = width * height;
    let mut items = Vec::with_capacity(weights.len() + 2);
    let (mut hidden_count, mut hidden_area) = (0usize, 0.0);
    for (id, weight) in weights {
        let area = weight / denominator;
        if area * pixel_area < opts.min_visible_area {
            hidden_count += 1;
            hidden_area += area;
        } else {
            items.push(TreemapItem {
                item: TreemapEntry::Plan { id },
                area,
            });
        }
    }
    if hidden_count > 0 {
        trace!(parent = node.0, hidden_count, "layout.treemap.hidden");
        record_treemap_hidden(hidden_count as u64);
        items.push(TreemapItem {
            item: TreemapEntry::Hidden {
                count: hidden_count,
            },
            area: hidden_area,
        });
    }
    let residual = 1.0 - child_sum / denominator;
    if residual > 1e-9 {
        items.push(TreemapItem {
            item: TreemapEntry::Residual,
            area: residual,
        });
    }
    items.sort_by(|a, b| b.area.total_cmp(&a.area));

    squarify(width / height, items)
        .into_iter()
        .map(|TreemapRect { item, rect }| {
            let children = match item {
                TreemapEntry::Plan { id } => layout_level(
                    tree,
                    id,
                    metric,
                    rect.width * width - 2.0 * opts.padding,
                    rect.height * height - 2.0 * opts.padding,
                    opts,
                    expanded,
                    depth + 1,
                ),
                _ => Vec::new(),
            };
            TreemapNode {
                entry: item,
                rect,
                depth,
                children,
            }
        })
        .collect()
}

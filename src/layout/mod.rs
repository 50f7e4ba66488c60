#![forbid(unsafe_code)]

//! Space-filling layouts over a built plan tree.
//!
//! Both layouts read finalized totals and depths from a [`PlanTree`] and
//! return plain geometry; drawing is left to the caller. Every call
//! recomputes its subtree from scratch.
//!
//! [`PlanTree`]: crate::plan::PlanTree

/// Proportional horizontal stacking with zoom, pan, and viewport culling.
pub mod flame;

/// Squarified treemap (Bruls, Huizing, van Wijk) and its recursive caller.
pub mod treemap;

pub use flame::{
    flame_children, layout_flame, max_zoom, FlameChild, FlameChildren, FlameEntry, FlameRect,
    FlameViewport, HiddenBucket,
};
pub use treemap::{
    layout_treemap, squarify, Rect, TreemapEntry, TreemapItem, TreemapLayout, TreemapNode,
    TreemapRect,
};

//! Deduplicated source spans attributed to plan nodes.
//!
//! Contexts are append-only: the first node that introduces a
//! `(buffer, start, end)` triple owns its id, percentages, and color. Later
//! nodes reporting the same triple reuse that id.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::trace;

use crate::document::RawContext;

/// Sequential identifier assigned to each distinct span, in first-seen order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ContextId(pub u32);

/// RGB color used to tint a span by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Renders the color as `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

const SEVERITY_STOPS: [Color; 5] = [
    Color::rgb(0x4c, 0xaf, 0x50),
    Color::rgb(0xcd, 0xdc, 0x39),
    Color::rgb(0xff, 0x98, 0x00),
    Color::rgb(0xf4, 0x43, 0x36),
    Color::rgb(0x8e, 0x1b, 0x1b),
];

/// Maps a share of the query (`0.0..=1.0`) onto the severity gradient.
///
/// Out-of-range and NaN inputs are clamped, so callers can pass residuals
/// that went slightly negative.
pub fn severity_color(percent: f64) -> Color {
    let p = if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 1.0)
    };
    let segments = (SEVERITY_STOPS.len() - 1) as f64;
    let scaled = p * segments;
    let idx = (scaled.floor() as usize).min(SEVERITY_STOPS.len() - 2);
    let t = scaled - idx as f64;
    let (a, b) = (SEVERITY_STOPS[idx], SEVERITY_STOPS[idx + 1]);
    let lerp = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    Color::rgb(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b))
}

/// One distinct span of source text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Context {
    /// Stable identifier.
    pub id: ContextId,
    /// Index of the buffer the span lives in.
    pub buffer_idx: usize,
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
    /// Text covered by the span.
    pub text: String,
    /// Self-time share of the introducing node, if the plan was timed.
    pub self_time_percent: Option<f64>,
    /// Self-cost share of the introducing node.
    pub self_cost_percent: f64,
    /// Severity tint derived from the introducing node's share.
    pub color: Color,
    /// Another buffer the widest context for this span lives in.
    pub linked_buf_idx: Option<usize>,
}

impl Context {
    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true for zero-width spans.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `offset` lies inside `[start, end)`.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Append-only registry of spans.
#[derive(Clone, Debug, Default)]
pub struct ContextIndex {
    contexts: Vec<Context>,
    by_span: FxHashMap<(usize, usize, usize), ContextId>,
}

impl ContextIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a span, returning the id of an identical earlier span if one exists.
    pub fn index_context(
        &mut self,
        buffer_idx: usize,
        start: usize,
        end: usize,
        text: &str,
        self_time_percent: Option<f64>,
        self_cost_percent: f64,
        linked_buf_idx: Option<usize>,
    ) -> ContextId {
        let key = (buffer_idx, start, end);
        if let Some(id) = self.by_span.get(&key) {
            trace!(ctx = id.0, buffer_idx, start, end, "context.index.reused");
            return *id;
        }
        let id = ContextId(self.contexts.len() as u32);
        let severity = self_time_percent.unwrap_or(self_cost_percent);
        self.contexts.push(Context {
            id,
            buffer_idx,
            start,
            end,
            text: text.to_string(),
            self_time_percent,
            self_cost_percent,
            color: severity_color(severity),
            linked_buf_idx,
        });
        self.by_span.insert(key, id);
        trace!(ctx = id.0, buffer_idx, start, end, "context.index.created");
        id
    }

    /// Registers the display span chosen out of a raw candidate list.
    ///
    /// The link points at the last candidate living in a different buffer
    /// than the display span.
    pub fn index_raw(
        &mut self,
        candidates: &[RawContext],
        display_idx: usize,
        self_time_percent: Option<f64>,
        self_cost_percent: f64,
    ) -> Option<ContextId> {
        let display = candidates.get(display_idx)?;
        let linked = candidates
            .iter()
            .rev()
            .find(|ctx| ctx.buffer_idx != display.buffer_idx)
            .map(|ctx| ctx.buffer_idx);
        Some(self.index_context(
            display.buffer_idx,
            display.start,
            display.end,
            &display.text,
            self_time_percent,
            self_cost_percent,
            linked,
        ))
    }

    /// Looks up a context by id.
    pub fn get(&self, id: ContextId) -> Option<&Context> {
        self.contexts.get(id.0 as usize)
    }

    /// All contexts in id order.
    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// Number of distinct spans.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns true if no span was registered.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Groups spans by buffer, each group sorted by `(start, end)`.
    ///
    /// Recomputed on every call; the ordering depends on the whole set.
    pub fn buffer_spans(&self) -> BTreeMap<usize, Vec<&Context>> {
        let mut groups: BTreeMap<usize, Vec<&Context>> = BTreeMap::new();
        for ctx in &self.contexts {
            groups.entry(ctx.buffer_idx).or_default().push(ctx);
        }
        for spans in groups.values_mut() {
            spans.sort_by_key(|ctx| (ctx.start, ctx.end));
        }
        groups
    }

    /// Spans of `buffer_idx` covering `offset`, narrowest first.
    pub fn spans_at(&self, buffer_idx: usize, offset: usize) -> Vec<&Context> {
        let mut hits: Vec<&Context> = self
            .contexts
            .iter()
            .filter(|ctx| ctx.buffer_idx == buffer_idx && ctx.contains(offset))
            .collect();
        hits.sort_by_key(|ctx| (ctx.len(), ctx.start));
        hits
    }
}

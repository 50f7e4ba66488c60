#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::Serialize;
use tracing::trace;

use crate::config::ViewOptions;
use crate::context::ContextId;
use crate::layout::Rect;
use crate::plan::{AnalyzedPlan, Metric, PlanId};

use super::state::PlanViewState;

/// One user interaction, applied atomically to the view state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ViewAction {
    Hover { id: Option<PlanId> },
    Select { id: PlanId },
    ClearSelection,
    Focus { id: PlanId, start_rect: Option<Rect> },
    ZoomOut,
    CompleteTransition,
    ToggleExpanded { id: PlanId },
    HighlightContext { context: Option<ContextId> },
    SetMetric { metric: Metric },
    SetFlameZoom { zoom: f64, focal_px: f64 },
    PanFlame { dx: f64 },
    ResizeFlame { width: f64 },
}

/// Sent to listeners after an action changed the state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ViewEvent {
    pub action: ViewAction,
    /// Increments once per effective action.
    pub revision: u64,
}

/// Handle returned by [`ViewSession::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ViewEvent, &PlanViewState) + Send + Sync>;

/// Shares one [`PlanViewState`] between the visualizations.
///
/// Actions take the write lock for the duration of a single setter, so
/// readers never see hover or selection without their derived contexts.
/// Listeners run after the lock is released and receive a snapshot, which
/// makes it safe for them to dispatch further actions.
pub struct ViewSession {
    state: RwLock<PlanViewState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    revision: AtomicU64,
}

impl ViewSession {
    pub fn new(plan: Arc<AnalyzedPlan>, options: ViewOptions, flame_width: f64) -> Self {
        Self::from_state(PlanViewState::new(plan, options, flame_width))
    }

    pub fn from_state(state: PlanViewState) -> Self {
        Self {
            state: RwLock::new(state),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            revision: AtomicU64::new(0),
        }
    }

    /// Read access to the current state.
    pub fn read(&self) -> RwLockReadGuard<'_, PlanViewState> {
        self.state.read()
    }

    pub fn snapshot(&self) -> PlanViewState {
        self.state.read().clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ViewEvent, &PlanViewState) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    /// Applies `action` and notifies listeners if the state changed.
    ///
    /// Returns the new revision, or `None` when the action was a no-op.
    pub fn dispatch(&self, action: ViewAction) -> Option<u64> {
        let (revision, snapshot) = {
            let mut state = self.state.write();
            if !apply(&mut state, action) {
                trace!(?action, "view.action.ignored");
                return None;
            }
            let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
            (revision, state.clone())
        };
        trace!(?action, revision, "view.action.applied");

        let event = ViewEvent { action, revision };
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event, &snapshot);
        }
        Some(revision)
    }
}

fn apply(state: &mut PlanViewState, action: ViewAction) -> bool {
    match action {
        ViewAction::Hover { id } => state.hover(id),
        ViewAction::Select { id } => state.select(id),
        ViewAction::ClearSelection => state.clear_selection(),
        ViewAction::Focus { id, start_rect } => state.focus(id, start_rect),
        ViewAction::ZoomOut => state.zoom_out(),
        ViewAction::CompleteTransition => state.complete_transition(),
        ViewAction::ToggleExpanded { id } => state.toggle_expanded(id),
        ViewAction::HighlightContext { context } => state.highlight_context(context),
        ViewAction::SetMetric { metric } => state.set_metric(metric),
        ViewAction::SetFlameZoom { zoom, focal_px } => state.set_flame_zoom(zoom, focal_px),
        ViewAction::PanFlame { dx } => state.pan_flame(dx),
        ViewAction::ResizeFlame { width } => state.resize_flame(width),
    }
}

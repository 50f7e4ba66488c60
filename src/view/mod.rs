#![forbid(unsafe_code)]

//! Selection and correlation state shared by the treemap, the flame graph,
//! and the source highlighter.

/// Thread-safe wrapper applying one action per user event and notifying listeners.
pub mod session;

/// Hover, selection, focus, expansion, and zoom state with derived queries.
pub mod state;

pub use session::{ListenerId, ViewAction, ViewEvent, ViewSession};
pub use state::{PlanViewState, TransitionKind, TreemapTransition};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A snapshot of plan-building and layout counters.
///
/// Profiling is enabled via the `PLANSCOPE_PROFILE` environment variable and
/// tracks how often the tree builder and both layouts run, plus how much work
/// culling and hidden-bucket aggregation saved.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct LayoutProfileSnapshot {
    /// Total nanoseconds spent building plan trees.
    pub build_ns: u64,
    /// Number of plan trees built.
    pub build_count: u64,
    /// Total nanoseconds spent in recursive treemap layouts.
    pub treemap_ns: u64,
    /// Number of treemap layouts.
    pub treemap_count: u64,
    /// Total nanoseconds spent in flame graph layouts.
    pub flame_ns: u64,
    /// Number of flame graph layouts.
    pub flame_count: u64,
    /// Flame graph children skipped because they were off screen.
    pub flame_culled: u64,
    /// Treemap children folded into hidden buckets.
    pub treemap_hidden: u64,
}

#[derive(Default)]
struct LayoutProfileCounters {
    build_ns: AtomicU64,
    build_count: AtomicU64,
    treemap_ns: AtomicU64,
    treemap_count: AtomicU64,
    flame_ns: AtomicU64,
    flame_count: AtomicU64,
    flame_culled: AtomicU64,
    treemap_hidden: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<LayoutProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("PLANSCOPE_PROFILE").is_some())
}

fn counters() -> Option<&'static LayoutProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(LayoutProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum LayoutProfileKind {
    /// Plan tree construction.
    Build,
    /// Recursive treemap layout.
    Treemap,
    /// Recursive flame graph layout.
    Flame,
}

pub(crate) fn record_profile_timer(kind: LayoutProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        LayoutProfileKind::Build => (&counters.build_ns, &counters.build_count),
        LayoutProfileKind::Treemap => (&counters.treemap_ns, &counters.treemap_count),
        LayoutProfileKind::Flame => (&counters.flame_ns, &counters.flame_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_flame_culled(count: u64) {
    if let Some(counters) = counters() {
        counters.flame_culled.fetch_add(count, Ordering::Relaxed);
    }
}

pub(crate) fn record_treemap_hidden(count: u64) {
    if let Some(counters) = counters() {
        counters.treemap_hidden.fetch_add(count, Ordering::Relaxed);
    }
}

/// Retrieves a snapshot of the current counters.
///
/// # Arguments
///
/// * `reset` - If `true`, resets all counters to zero after reading them.
///
/// # Returns
///
/// `None` when profiling is disabled.
///
/// # Example
///
/// ```no_run
/// use planscope::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(false) {
///     println!("flame layouts: {}", snapshot.flame_count);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<LayoutProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(LayoutProfileSnapshot {
        build_ns: load(&counters.build_ns),
        build_count: load(&counters.build_count),
        treemap_ns: load(&counters.treemap_ns),
        treemap_count: load(&counters.treemap_count),
        flame_ns: load(&counters.flame_ns),
        flame_count: load(&counters.flame_count),
        flame_culled: load(&counters.flame_culled),
        treemap_hidden: load(&counters.treemap_hidden),
    })
}

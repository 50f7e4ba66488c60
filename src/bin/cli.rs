//! Binary entry point for the planscope CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use planscope::{
    build_plan_tree,
    layout::{FlameEntry, TreemapEntry},
    logging::init_logging,
    plan::ExpandedSet,
    AnalyzedPlan, Context, Metric, MetricPreference, PlanDocument, PlanId, PlanParseError,
    PlanParseErrorWithCode, PlanReport, PlanViewState, Rect, ViewAction, ViewOptions, ViewSession,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use config::CliConfig;
use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "planscope",
    version,
    about = "Inspect query execution plans as trees, treemaps, and flame graphs",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        help = "Metric driving layout weights (defaults to time when available)"
    )]
    metric: Option<MetricArg>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "PLANSCOPE_CONFIG",
        help = "CLI config file (defaults to the per-user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Tracing filter directive, e.g. debug or planscope=trace [default: warn]"
    )]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum, help = "Color theme for text output")]
    theme: Option<Theme>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LayoutArgs {
    #[arg(value_name = "FILE")]
    plan_path: PathBuf,

    #[arg(
        long = "expand",
        value_name = "ID",
        action = ArgAction::Append,
        help = "Show the full children of a collapsed node (repeatable)"
    )]
    expand: Vec<u64>,
}

#[derive(Args, Debug)]
struct TreemapCmd {
    #[command(flatten)]
    layout: LayoutArgs,

    #[arg(long, default_value_t = 1200.0, help = "Viewport width in pixels")]
    width: f64,

    #[arg(long, default_value_t = 800.0, help = "Viewport height in pixels")]
    height: f64,

    #[arg(long, value_name = "ID", help = "Focus this node instead of the root")]
    node: Option<u64>,
}

#[derive(Args, Debug)]
struct FlameCmd {
    #[command(flatten)]
    layout: LayoutArgs,

    #[arg(long, default_value_t = 1200.0, help = "Viewport width in pixels")]
    width: f64,

    #[arg(long, default_value_t = 1.0, help = "Zoom factor (clamped to the plan's bound)")]
    zoom: f64,

    #[arg(
        long,
        value_name = "PX",
        default_value_t = 0.0,
        help = "Screen position kept fixed while zooming"
    )]
    focal: f64,

    #[arg(long, value_name = "PX", help = "Pan offset applied after zooming")]
    offset: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print the annotated plan tree")]
    Tree(LayoutArgs),

    #[command(about = "List source contexts grouped by buffer")]
    Contexts {
        #[arg(value_name = "FILE")]
        plan_path: PathBuf,
    },

    #[command(about = "Lay out a squarified treemap")]
    Treemap(TreemapCmd),

    #[command(about = "Lay out a flame graph")]
    Flame(FlameCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum MetricArg {
    Auto,
    Time,
    Cost,
}

impl From<MetricArg> for MetricPreference {
    fn from(metric: MetricArg) -> Self {
        match metric {
            MetricArg::Auto => MetricPreference::Auto,
            MetricArg::Time => MetricPreference::Time,
            MetricArg::Cost => MetricPreference::Cost,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read plan {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid plan {path}: {message}")]
    Plan { path: PathBuf, message: String },
    #[error("plan node #{0} not found")]
    NodeNotFound(u64),
    #[error("viewport must be positive, got {width}x{height}")]
    EmptyViewport { width: f64, height: f64 },
}

impl CliError {
    fn plan(path: &Path, err: &PlanParseError) -> Self {
        CliError::Plan {
            path: path.to_path_buf(),
            message: PlanParseErrorWithCode(err).to_string(),
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    let level = cli
        .log_level
        .as_deref()
        .or(config.log_level())
        .unwrap_or("warn");
    init_logging(level)?;
    debug!(config = ?config.path(), "cli.config.loaded");

    let ui = Ui::new(cli.theme.or(config.theme()).unwrap_or(Theme::Auto));
    let mut view = config.view().clone();
    if let Some(metric) = cli.metric {
        view.metric = metric.into();
    }

    match cli.command {
        Command::Tree(args) => {
            let plan = load_plan(&args.plan_path)?;
            let metric = resolve_metric(&ui, &plan, view.metric);
            let expanded = expanded_set(&plan, &args.expand)?;
            let report = PlanReport::from_plan(&plan, metric, &expanded);
            emit(cli.format, &report, || {
                print_summary(&ui, &plan, metric);
                ui.spacer();
                print!("{report}");
            })?;
        }
        Command::Contexts { plan_path } => {
            let plan = load_plan(&plan_path)?;
            let report = ContextsReport::from_plan(&plan);
            emit(cli.format, &report, || print_contexts_text(&ui, &report))?;
        }
        Command::Treemap(cmd) => {
            if !(cmd.width > 0.0 && cmd.height > 0.0) {
                return Err(CliError::EmptyViewport {
                    width: cmd.width,
                    height: cmd.height,
                }
                .into());
            }
            let plan = Arc::new(load_plan(&cmd.layout.plan_path)?);
            let metric = resolve_metric(&ui, &plan, view.metric);
            let session = open_session(&plan, view, metric, &cmd.layout.expand, cmd.width)?;
            if let Some(node) = cmd.node {
                let id = find_node(&plan, node)?;
                session.dispatch(ViewAction::Focus {
                    id,
                    start_rect: None,
                });
                session.dispatch(ViewAction::CompleteTransition);
            }
            let state = session.snapshot();
            let report = TreemapReport::from_state(&state, cmd.width, cmd.height);
            emit(cli.format, &report, || print_treemap_text(&ui, &report))?;
        }
        Command::Flame(cmd) => {
            if !(cmd.width > 0.0) {
                return Err(CliError::EmptyViewport {
                    width: cmd.width,
                    height: 0.0,
                }
                .into());
            }
            let plan = Arc::new(load_plan(&cmd.layout.plan_path)?);
            let metric = resolve_metric(&ui, &plan, view.metric);
            let session = open_session(&plan, view, metric, &cmd.layout.expand, cmd.width)?;
            session.dispatch(ViewAction::SetFlameZoom {
                zoom: cmd.zoom,
                focal_px: cmd.focal,
            });
            if let Some(offset) = cmd.offset {
                let current = session.read().flame().offset;
                session.dispatch(ViewAction::PanFlame {
                    dx: offset - current,
                });
            }
            let state = session.snapshot();
            let report = FlameReport::from_state(&state);
            emit(cli.format, &report, || print_flame_text(&ui, &report))?;
        }
    }
    Ok(())
}

fn load_plan(path: &Path) -> Result<AnalyzedPlan, CliError> {
    let input = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = PlanDocument::from_json(&input).map_err(|err| CliError::plan(path, &err))?;
    let plan = build_plan_tree(&doc).map_err(|err| CliError::plan(path, &err))?;
    info!(
        path = %path.display(),
        nodes = plan.tree.len(),
        "cli.plan.loaded"
    );
    Ok(plan)
}

fn resolve_metric(ui: &Ui, plan: &AnalyzedPlan, preference: MetricPreference) -> Metric {
    let metric = preference.resolve(plan);
    if preference == MetricPreference::Time && metric != Metric::Time {
        ui.warn("plan has no timing data; showing cost instead");
    }
    metric
}

fn find_node(plan: &AnalyzedPlan, raw: u64) -> Result<PlanId, CliError> {
    let id = PlanId(raw);
    if plan.tree.contains(id) {
        Ok(id)
    } else {
        Err(CliError::NodeNotFound(raw))
    }
}

fn expanded_set(plan: &AnalyzedPlan, expand: &[u64]) -> Result<ExpandedSet, CliError> {
    let mut expanded = ExpandedSet::default();
    for raw in expand {
        let id = find_node(plan, *raw)?;
        if plan.tree[id].has_collapsed_plans {
            expanded.insert(id);
        } else {
            debug!(plan = *raw, "cli.expand.ignored");
        }
    }
    Ok(expanded)
}

fn open_session(
    plan: &Arc<AnalyzedPlan>,
    mut view: ViewOptions,
    metric: Metric,
    expand: &[u64],
    flame_width: f64,
) -> Result<ViewSession, CliError> {
    view.metric = match metric {
        Metric::Time => MetricPreference::Time,
        Metric::Cost => MetricPreference::Cost,
    };
    let session = ViewSession::new(Arc::clone(plan), view, flame_width);
    for raw in expand {
        let id = find_node(plan, *raw)?;
        if session.dispatch(ViewAction::ToggleExpanded { id }).is_none() {
            debug!(plan = *raw, "cli.expand.ignored");
        }
    }
    Ok(session)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_summary(ui: &Ui, plan: &AnalyzedPlan, metric: Metric) {
    let time = plan
        .totals
        .time
        .map(|t| format!("{t:.3}"))
        .unwrap_or_else(|| "-".to_string());
    ui.section(
        "Plan",
        [
            ("nodes", plan.tree.len().to_string()),
            ("depth", plan.tree.root_node().child_depth.to_string()),
            ("contexts", plan.contexts.len().to_string()),
            ("metric", metric.as_str().to_string()),
            ("total time", time),
            ("total cost", format!("{:.2}", plan.totals.cost)),
        ],
    );
}

#[derive(Debug, Serialize)]
struct ContextsReport<'a> {
    buffers: Vec<BufferContexts<'a>>,
}

#[derive(Debug, Serialize)]
struct BufferContexts<'a> {
    index: usize,
    label: Option<&'a str>,
    contexts: Vec<&'a Context>,
}

impl<'a> ContextsReport<'a> {
    fn from_plan(plan: &'a AnalyzedPlan) -> Self {
        let buffers = plan
            .contexts
            .buffer_spans()
            .into_iter()
            .map(|(index, contexts)| BufferContexts {
                index,
                label: plan.buffers.get(index).map(|buffer| buffer.label.as_str()),
                contexts,
            })
            .collect();
        Self { buffers }
    }
}

fn print_contexts_text(ui: &Ui, report: &ContextsReport<'_>) {
    if report.buffers.is_empty() {
        ui.warn("plan carries no source contexts");
        return;
    }
    for (pos, buffer) in report.buffers.iter().enumerate() {
        if pos > 0 {
            ui.spacer();
        }
        let title = match buffer.label {
            Some(label) if !label.is_empty() => format!("Buffer {} ({label})", buffer.index),
            _ => format!("Buffer {}", buffer.index),
        };
        ui.swatches(
            &title,
            buffer.contexts.iter().map(|ctx| {
                let share = ctx.self_time_percent.unwrap_or(ctx.self_cost_percent);
                (
                    ctx.color,
                    format!(
                        "{:>4} [{}..{}] {:>5.1}% {}",
                        ctx.id.0,
                        ctx.start,
                        ctx.end,
                        share * 100.0,
                        one_line(&ctx.text)
                    ),
                )
            }),
        );
    }
}

#[derive(Debug, Serialize)]
struct TreemapReport {
    focus: PlanId,
    width: f64,
    height: f64,
    rects: Vec<TreemapRectOut>,
}

#[derive(Debug, Serialize)]
struct TreemapRectOut {
    entry: TreemapEntry,
    depth: usize,
    label: String,
    rect: Rect,
}

impl TreemapReport {
    fn from_state(state: &PlanViewState, width: f64, height: f64) -> Self {
        let layout = state.treemap_layout(width, height);
        let rects = layout
            .absolute(state.options().treemap.padding)
            .into_iter()
            .map(|(entry, depth, rect)| TreemapRectOut {
                entry,
                depth,
                label: match entry {
                    TreemapEntry::Plan { id } => state.tree()[id].node_type.clone(),
                    TreemapEntry::Hidden { count } => format!("{count} hidden"),
                    TreemapEntry::Residual => "(self)".to_string(),
                },
                rect,
            })
            .collect();
        Self {
            focus: state.focused(),
            width,
            height,
            rects,
        }
    }
}

fn print_treemap_text(ui: &Ui, report: &TreemapReport) {
    ui.section(
        "Treemap",
        [
            ("focus", report.focus.to_string()),
            ("viewport", format!("{}x{}", report.width, report.height)),
            ("rects", report.rects.len().to_string()),
        ],
    );
    ui.spacer();
    ui.list(
        "Rectangles",
        report.rects.iter().map(|out| {
            format!(
                "{}{} @ ({:.1}, {:.1}) {:.1}x{:.1}",
                "  ".repeat(out.depth.saturating_sub(1)),
                out.label,
                out.rect.left,
                out.rect.top,
                out.rect.width,
                out.rect.height
            )
        }),
    );
}

#[derive(Debug, Serialize)]
struct FlameReport {
    width: f64,
    zoom: f64,
    offset: f64,
    max_zoom: f64,
    rects: Vec<FlameRectOut>,
}

#[derive(Debug, Serialize)]
struct FlameRectOut {
    entry: FlameEntry,
    depth: usize,
    label: String,
    left: f64,
    width: f64,
}

impl FlameReport {
    fn from_state(state: &PlanViewState) -> Self {
        let rects = state
            .flame_layout()
            .into_iter()
            .map(|rect| FlameRectOut {
                entry: rect.entry,
                depth: rect.depth,
                label: match rect.entry {
                    FlameEntry::Plan { id } => state.tree()[id].node_type.clone(),
                    FlameEntry::Hidden { count } => format!("{count} hidden"),
                },
                left: rect.left,
                width: rect.width,
            })
            .collect();
        let viewport = state.flame();
        Self {
            width: viewport.width,
            zoom: viewport.zoom,
            offset: viewport.offset,
            max_zoom: state.max_flame_zoom(),
            rects,
        }
    }
}

fn print_flame_text(ui: &Ui, report: &FlameReport) {
    ui.section(
        "Flame graph",
        [
            ("width", format!("{}", report.width)),
            ("zoom", format!("{:.2} (max {:.2})", report.zoom, report.max_zoom)),
            ("offset", format!("{:.1}", report.offset)),
            ("rects", report.rects.len().to_string()),
        ],
    );
    ui.spacer();
    ui.list(
        "Blocks",
        report.rects.iter().map(|out| {
            format!(
                "{}{} @ {:.1} +{:.1}",
                "  ".repeat(out.depth),
                out.label,
                out.left,
                out.width
            )
        }),
    );
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

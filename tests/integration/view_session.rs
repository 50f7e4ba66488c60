#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use planscope::{
    build_plan_tree,
    view::{TransitionKind, ViewEvent},
    AnalyzedPlan, Metric, PlanDocument, PlanId, ViewAction, ViewOptions, ViewSession,
};
use serde_json::json;

fn plan() -> Arc<AnalyzedPlan> {
    let doc = PlanDocument::from_value(json!({
        "buffers": [["select Movie { title, actors: { name } } filter .year > 2000", "query"]],
        "plan": {
            "node_type": "Root",
            "total_cost": 100.0,
            "full_total_time": 10.0,
            "contexts": [{"buffer_idx": 0, "start": 0, "end": 61, "text": "select"}],
            "plans": [
                {
                    "node_type": "Actors",
                    "total_cost": 60.0,
                    "full_total_time": 6.0,
                    "nearest_context_plan": {
                        "node_type": "Subquery",
                        "total_cost": 60.0,
                        "full_total_time": 6.0,
                        "contexts": [{"buffer_idx": 0, "start": 22, "end": 40, "text": "actors: { name }"}],
                        "plans": [
                            {"node_type": "IndexScan", "total_cost": 40.0, "full_total_time": 4.0},
                            {"node_type": "Filter", "total_cost": 15.0, "full_total_time": 1.5}
                        ]
                    },
                    "contexts": [{"buffer_idx": 0, "start": 33, "end": 37, "text": "name"}],
                    "plans": [0]
                },
                {
                    "node_type": "Filter",
                    "total_cost": 1.0,
                    "full_total_time": 0.05,
                    "contexts": [{"buffer_idx": 0, "start": 42, "end": 61, "text": "filter .year > 2000"}]
                }
            ]
        }
    }))
    .expect("document parses");
    Arc::new(build_plan_tree(&doc).expect("plan builds"))
}

fn find(plan: &AnalyzedPlan, name: &str) -> PlanId {
    plan.tree
        .iter()
        .find(|node| node.node_type == name)
        .map(|node| node.id)
        .unwrap_or_else(|| panic!("node {name} missing"))
}

#[test]
fn treemap_drill_down_and_back() {
    let plan = plan();
    let session = ViewSession::new(Arc::clone(&plan), ViewOptions::default(), 800.0);
    let events: Arc<Mutex<Vec<ViewEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    session.subscribe(move |event, _| sink.lock().push(*event));

    let root = plan.tree.root();
    let actors = find(&plan, "Actors");
    let scan = find(&plan, "IndexScan");

    let layout = session.read().treemap_layout(800.0, 600.0);
    assert!(!layout.is_empty());
    let clicked = layout
        .items
        .iter()
        .find(|node| node.entry == planscope::layout::TreemapEntry::Plan { id: actors })
        .map(|node| node.rect)
        .expect("actors drawn at the top level");

    session.dispatch(ViewAction::Focus {
        id: actors,
        start_rect: Some(clicked),
    });
    {
        let state = session.read();
        let transition = state.transition().expect("zoom in pending");
        assert_eq!(transition.kind, TransitionKind::In);
        assert_eq!(transition.from, root);
        assert_eq!(transition.start_rect, Some(clicked));
        assert_eq!(state.focus_path(), vec![root, actors]);
    }
    assert_eq!(
        session.dispatch(ViewAction::Focus {
            id: actors,
            start_rect: None
        }),
        None
    );
    session.dispatch(ViewAction::CompleteTransition);
    session.dispatch(ViewAction::Focus {
        id: scan,
        start_rect: None,
    });
    session.dispatch(ViewAction::Focus {
        id: root,
        start_rect: None,
    });
    {
        let state = session.read();
        let transition = state.transition().expect("zoom out pending");
        assert_eq!(transition.kind, TransitionKind::Out);
        assert_eq!(transition.from, scan);
    }

    let revisions: Vec<u64> = events.lock().iter().map(|event| event.revision).collect();
    assert_eq!(revisions, vec![1, 2, 3, 4]);
}

#[test]
fn source_and_plan_highlighting_agree() {
    let plan = plan();
    let session = ViewSession::new(Arc::clone(&plan), ViewOptions::default(), 800.0);
    let actors = find(&plan, "Actors");
    let subquery = find(&plan, "Subquery");
    let subquery_ctx = plan.tree[subquery].context_id;

    session.dispatch(ViewAction::Select { id: actors });
    {
        let state = session.read();
        assert_eq!(state.selected_context(), subquery_ctx);
        assert_eq!(state.selected_parent_context(), plan.tree.root_node().context_id);
        assert_eq!(state.highlighted_context(), subquery_ctx);
        assert!(state.highlighted_plans().contains(&actors));
    }

    session.dispatch(ViewAction::ToggleExpanded { id: actors });
    {
        let state = session.read();
        assert!(state.is_expanded(actors));
        assert_eq!(state.selected_context(), plan.tree[actors].context_id);
    }

    // A hover over the source picks the innermost span and maps it back.
    let name_span = plan.contexts.spans_at(0, 34)[0].id;
    session.dispatch(ViewAction::Select { id: actors });
    session.dispatch(ViewAction::HighlightContext {
        context: Some(name_span),
    });
    let state = session.snapshot();
    assert_eq!(state.selected(), None);
    assert_eq!(state.highlighted_plans(), vec![actors]);
}

#[test]
fn timed_plans_default_to_time_and_switch_metrics() {
    let plan = plan();
    let session = ViewSession::new(Arc::clone(&plan), ViewOptions::default(), 600.0);
    assert_eq!(session.read().metric(), Metric::Time);
    assert!(session
        .dispatch(ViewAction::SetMetric {
            metric: Metric::Cost
        })
        .is_some());
    assert_eq!(session.read().metric(), Metric::Cost);

    let max = session.read().max_flame_zoom();
    assert!(max > 1.0);
    session.dispatch(ViewAction::SetFlameZoom {
        zoom: max,
        focal_px: 600.0,
    });
    let rects = session.read().flame_layout();
    assert!(rects.iter().all(|rect| rect.right() >= 0.0 && rect.left <= 600.0));
}

#[test]
fn readers_never_see_partial_updates() {
    let plan = plan();
    let session = Arc::new(ViewSession::new(
        Arc::clone(&plan),
        ViewOptions::default(),
        800.0,
    ));
    let ids: Vec<PlanId> = plan.tree.iter().map(|node| node.id).collect();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checks = 0usize;
                while !done.load(Ordering::Acquire) {
                    let state = session.read();
                    let hovered = state.hovered();
                    let expected = hovered.and_then(|id| state.effective_context(id));
                    assert_eq!(state.hovered_context(), expected);
                    if let Some(selected) = state.selected() {
                        assert_eq!(state.selected_context(), state.effective_context(selected));
                        assert_eq!(
                            state.selected_parent_context(),
                            state.parent_context(selected)
                        );
                    }
                    checks += 1;
                }
                checks
            })
        })
        .collect();

    let actors = find(&plan, "Actors");
    for round in 0..500 {
        let id = ids[round % ids.len()];
        session.dispatch(ViewAction::Hover { id: Some(id) });
        session.dispatch(ViewAction::Select { id });
        if round % 7 == 0 {
            session.dispatch(ViewAction::ToggleExpanded { id: actors });
        }
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().expect("reader panicked");
    }
}

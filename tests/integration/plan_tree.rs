#![allow(missing_docs)]

use std::collections::HashSet;

use planscope::{build_plan_tree, AnalyzedPlan, PlanDocument, PlanId, PlanParseError};
use serde_json::{json, Value};

fn build(value: Value) -> AnalyzedPlan {
    let doc = PlanDocument::from_value(value).expect("document parses");
    build_plan_tree(&doc).expect("plan builds")
}

fn find(plan: &AnalyzedPlan, name: &str) -> PlanId {
    plan.tree
        .iter()
        .find(|node| node.node_type == name)
        .map(|node| node.id)
        .unwrap_or_else(|| panic!("node {name} missing"))
}

fn names(plan: &AnalyzedPlan, ids: &[PlanId]) -> Vec<String> {
    ids.iter()
        .map(|id| plan.tree[*id].node_type.clone())
        .collect()
}

#[test]
fn two_node_plan_percentages_and_depth() {
    let plan = build(json!({
        "plan": {
            "node_type": "root",
            "total_cost": 100.0,
            "self_cost": 70.0,
            "plans": [{"node_type": "child", "total_cost": 30.0, "self_cost": 30.0}]
        }
    }));
    let root = plan.tree.root_node();
    let child = &plan.tree[find(&plan, "child")];
    assert!((root.self_cost_percent - 0.7).abs() < 1e-12);
    assert!((child.self_cost_percent - 0.3).abs() < 1e-12);
    assert_eq!(root.child_depth, 1);
    assert_eq!(child.child_depth, 0);
}

#[test]
fn repeated_span_reuses_sibling_context() {
    let plan = build(json!({
        "buffers": [["select Movie { title } order by .title", "query"]],
        "plan": {
            "node_type": "Root",
            "total_cost": 10.0,
            "plans": [
                {
                    "node_type": "First",
                    "total_cost": 6.0,
                    "self_cost": 6.0,
                    "contexts": [{"buffer_idx": 0, "start": 7, "end": 22, "text": "Movie { title }"}]
                },
                {
                    "node_type": "Second",
                    "total_cost": 1.0,
                    "self_cost": 1.0,
                    "contexts": [{"buffer_idx": 0, "start": 7, "end": 22, "text": "Movie { title }"}]
                }
            ]
        }
    }));
    let first = &plan.tree[find(&plan, "First")];
    let second = &plan.tree[find(&plan, "Second")];
    assert!(first.context_id.is_some());
    assert_eq!(first.context_id, second.context_id);
    assert_eq!(plan.contexts.len(), 1);

    // The first node to introduce a span owns its percentages.
    let ctx = plan
        .contexts
        .get(first.context_id.expect("context assigned"))
        .expect("context stored");
    assert!((ctx.self_cost_percent - 0.6).abs() < 1e-12);
}

#[test]
fn collapsed_node_shows_context_plan_children_then_own_entries() {
    let plan = build(json!({
        "plan": {
            "node_type": "Root",
            "total_cost": 20.0,
            "plans": [{
                "node_type": "Group",
                "total_cost": 20.0,
                "nearest_context_plan": {
                    "node_type": "Near",
                    "total_cost": 15.0,
                    "plans": [
                        {"node_type": "A", "total_cost": 10.0},
                        {"node_type": "B", "total_cost": 5.0}
                    ]
                },
                "plans": [0, {"node_type": "C", "total_cost": 5.0}]
            }]
        }
    }));
    let group = &plan.tree[find(&plan, "Group")];
    assert_eq!(names(&plan, &group.sub_plans), vec!["A", "B", "C"]);
    assert_eq!(names(&plan, &group.full_sub_plans), vec!["Near", "C"]);
    assert!(group.has_collapsed_plans);
    assert_eq!(group.nearest_context_plan, Some(find(&plan, "Near")));
    assert_eq!(group.child_depth, 1);
}

#[test]
fn context_plan_matching_full_children_is_not_collapsed() {
    let plan = build(json!({
        "plan": {
            "node_type": "Root",
            "total_cost": 3.0,
            "nearest_context_plan": {"node_type": "Near", "total_cost": 3.0},
            "plans": [{"node_type": "Only", "total_cost": 3.0}]
        }
    }));
    let root = plan.tree.root_node();
    assert_eq!(names(&plan, &root.sub_plans), vec!["Only"]);
    assert_eq!(root.sub_plans, root.full_sub_plans);
    assert!(!root.has_collapsed_plans);
}

#[test]
fn visible_children_come_from_full_children_or_context_plan() {
    let plan = build(json!({
        "plan": {
            "node_type": "Root",
            "total_cost": 40.0,
            "full_total_time": 4.0,
            "collapsed_plans": [{"node_type": "Shared", "total_cost": 5.0, "full_total_time": 0.5}],
            "plans": [
                {"node_type": "Left", "total_cost": 10.0, "full_total_time": 1.0, "plans": [1]},
                {
                    "node_type": "Right",
                    "total_cost": 25.0,
                    "full_total_time": 2.5,
                    "nearest_context_plan": {
                        "node_type": "Near",
                        "total_cost": 20.0,
                        "full_total_time": 2.0,
                        "plans": [{"node_type": "Deep", "total_cost": 20.0, "full_total_time": 2.0}]
                    },
                    "plans": [0, {"node_type": "Tail", "total_cost": 5.0, "full_total_time": 0.5}]
                }
            ]
        }
    }));
    for node in plan.tree.iter() {
        let full: HashSet<PlanId> = node.full_sub_plans.iter().copied().collect();
        match node.nearest_context_plan {
            None => {
                assert_eq!(node.full_sub_plans.len(), node.sub_plans.len());
                assert!(node.sub_plans.iter().all(|id| full.contains(id)));
                assert!(!node.has_collapsed_plans);
            }
            Some(ncp) => {
                let near: HashSet<PlanId> = plan.tree[ncp].sub_plans.iter().copied().collect();
                assert!(node
                    .sub_plans
                    .iter()
                    .all(|id| full.contains(id) || near.contains(id)));
            }
        }
    }
    // Timed runs sort visible children by time, descending.
    assert_eq!(
        names(&plan, &plan.tree.root_node().sub_plans),
        vec!["Right", "Left"]
    );
    assert_eq!(
        names(&plan, &plan.tree[find(&plan, "Right")].sub_plans),
        vec!["Deep", "Tail"]
    );
}

#[test]
fn shared_child_keeps_last_assigned_parent() {
    let plan = build(json!({
        "plan": {
            "node_type": "Root",
            "total_cost": 10.0,
            "collapsed_plans": [{"node_type": "Shared", "total_cost": 1.0}],
            "plans": [
                {"node_type": "P1", "total_cost": 4.0, "plans": [1]},
                {"node_type": "P2", "total_cost": 4.0, "plans": [1]}
            ]
        }
    }));
    let shared = find(&plan, "Shared");
    let p1 = &plan.tree[find(&plan, "P1")];
    let p2 = &plan.tree[find(&plan, "P2")];
    assert_eq!(p1.sub_plans, vec![shared]);
    assert_eq!(p2.sub_plans, vec![shared]);
    // Post-order walk: P2 attaches the shared node after P1 did.
    assert_eq!(plan.tree.parent(shared), Some(p2.id));
    assert_eq!(plan.tree.parent(p1.id), Some(plan.tree.root()));
    assert_eq!(plan.tree.len(), 4);
}

#[test]
fn contexts_are_unique_per_span_and_grouped_by_buffer() {
    let plan = build(json!({
        "buffers": [["select 1", "query"], ["function f() {}", "schema"]],
        "plan": {
            "node_type": "Root",
            "total_cost": 4.0,
            "contexts": [{"buffer_idx": 0, "start": 0, "end": 8, "text": "select 1"}],
            "plans": [
                {
                    "node_type": "Call",
                    "total_cost": 2.0,
                    "contexts": [
                        {"buffer_idx": 1, "start": 9, "end": 15, "text": "f() {}"},
                        {"buffer_idx": 0, "start": 7, "end": 8, "text": "1"}
                    ],
                    "suggested_display_ctx_idx": 1
                },
                {
                    "node_type": "Body",
                    "total_cost": 1.0,
                    "contexts": [{"buffer_idx": 1, "start": 0, "end": 15, "text": "function f() {}"}]
                }
            ]
        }
    }));
    let spans: HashSet<_> = plan
        .contexts
        .contexts()
        .iter()
        .map(|ctx| (ctx.buffer_idx, ctx.start, ctx.end))
        .collect();
    assert_eq!(spans.len(), plan.contexts.len());

    let call = &plan.tree[find(&plan, "Call")];
    let call_ctx = plan
        .contexts
        .get(call.context_id.expect("display context"))
        .expect("context stored");
    assert_eq!((call_ctx.buffer_idx, call_ctx.start), (0, 7));
    assert_eq!(call_ctx.linked_buf_idx, Some(1));

    let groups = plan.contexts.buffer_spans();
    let query: Vec<(usize, usize)> = groups[&0].iter().map(|c| (c.start, c.end)).collect();
    assert_eq!(query, vec![(0, 8), (7, 8)]);
    assert_eq!(groups[&1].len(), 1);

    let innermost = plan.contexts.spans_at(0, 7);
    assert_eq!(innermost[0].text, "1");
}

#[test]
fn malformed_documents_fail_without_partial_tree() {
    let cases = [
        (json!({"plan": {"node_type": "Root"}}), "MissingField"),
        (json!({"plan": {"total_cost": 1.0}}), "MissingField"),
        (json!({"plan": []}), "MalformedJson"),
        (
            json!({"plan": {"node_type": "Root", "total_cost": 1.0, "plans": [7]}}),
            "DanglingReference",
        ),
        (
            json!({"plan": {
                "node_type": "Root",
                "total_cost": 1.0,
                "collapsed_plans": [{"node_type": "Loop", "total_cost": 1.0, "plans": [1]}],
                "plans": [1]
            }}),
            "ReferenceCycle",
        ),
    ];
    for (value, code) in cases {
        let err: PlanParseError = PlanDocument::from_value(value)
            .and_then(|doc| build_plan_tree(&doc))
            .expect_err("document must be rejected");
        assert_eq!(err.code(), code, "{err}");
    }
}

#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_plan(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(format!("{name}.json"));
    fs::write(&path, serde_json::to_string_pretty(value).expect("serialize plan"))
        .expect("write plan");
    path
}

fn sample_plan() -> Value {
    json!({
        "buffers": [["select User { name, friends: { name } }", "query"]],
        "plan": {
            "node_type": "Root",
            "total_cost": 100.0,
            "full_total_time": 12.0,
            "contexts": [{"buffer_idx": 0, "start": 0, "end": 39, "text": "select User { name, friends: { name } }"}],
            "plans": [
                {
                    "node_type": "Friends",
                    "total_cost": 70.0,
                    "full_total_time": 9.0,
                    "nearest_context_plan": {
                        "node_type": "Lateral",
                        "total_cost": 70.0,
                        "full_total_time": 9.0,
                        "plans": [{"node_type": "Scan", "total_cost": 65.0, "full_total_time": 8.0}]
                    },
                    "contexts": [{"buffer_idx": 0, "start": 20, "end": 37, "text": "friends: { name }"}],
                    "plans": [0],
                    "relation_name": "default::User"
                },
                {"node_type": "Project", "total_cost": 5.0, "full_total_time": 1.0}
            ]
        }
    })
}

fn cli(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("planscope");
    // Keep the developer's own config out of the way.
    cmd.env("PLANSCOPE_CONFIG", dir.path().join("missing.toml"));
    cmd
}

fn failure_stderr(cmd: &mut assert_cmd::Command) -> String {
    let output = cmd.assert().failure().code(1).get_output().stderr.clone();
    String::from_utf8(output).expect("utf8")
}

fn json_output(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn tree_emits_json_report() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "tree", &sample_plan());
    let json = json_output(cli(&dir).args(["--format", "json", "tree"]).arg(&path));
    assert_eq!(json["metric"], "time");
    assert_eq!(json["total_cost"], 100.0);
    assert_eq!(json["root"]["node_type"], "Root");
    let friends = &json["root"]["children"][0];
    assert_eq!(friends["node_type"], "Friends");
    assert_eq!(friends["collapsed"], true);
    assert_eq!(friends["children"][0]["node_type"], "Scan");
}

#[test]
fn tree_text_and_metric_override() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "text", &sample_plan());
    let output = cli(&dir)
        .args(["--theme", "plain", "--metric", "cost", "tree"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("metric: cost"), "{text}");
    assert!(text.contains("Friends"));
    assert!(text.contains("(collapsed)"));
}

#[test]
fn tree_expand_shows_full_children() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "expand", &sample_plan());
    let folded = json_output(cli(&dir).args(["--format", "json", "tree"]).arg(&path));
    let friends = folded["root"]["children"][0]["id"]
        .as_u64()
        .expect("friends id");

    let json = json_output(
        cli(&dir)
            .args(["--format", "json", "tree", "--expand"])
            .arg(friends.to_string())
            .arg(&path),
    );
    let row = &json["root"]["children"][0];
    assert_eq!(row["id"], friends);
    assert_eq!(row["collapsed"], false);
    assert_eq!(row["children"][0]["node_type"], "Lateral");
}

#[test]
fn contexts_are_grouped_by_buffer() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "contexts", &sample_plan());
    let json = json_output(cli(&dir).args(["--format", "json", "contexts"]).arg(&path));
    let buffers = json["buffers"].as_array().expect("buffers array");
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0]["label"], "query");
    let starts: Vec<u64> = buffers[0]["contexts"]
        .as_array()
        .expect("contexts array")
        .iter()
        .map(|ctx| ctx["start"].as_u64().expect("start"))
        .collect();
    assert_eq!(starts, vec![0, 20]);
    assert!(buffers[0]["contexts"][0]["color"]["r"].is_number());
}

#[test]
fn treemap_rects_fit_the_viewport() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "treemap", &sample_plan());
    let json = json_output(
        cli(&dir)
            .args(["--format", "json", "treemap", "--width", "400", "--height", "300"])
            .arg(&path),
    );
    let rects = json["rects"].as_array().expect("rects array");
    assert!(!rects.is_empty());
    for rect in rects {
        let r = &rect["rect"];
        let (left, top) = (r["left"].as_f64().unwrap(), r["top"].as_f64().unwrap());
        let (width, height) = (r["width"].as_f64().unwrap(), r["height"].as_f64().unwrap());
        assert!(left >= -1e-6 && top >= -1e-6);
        assert!(left + width <= 400.0 + 1e-6 && top + height <= 300.0 + 1e-6);
    }
    assert!(rects.iter().any(|rect| rect["label"] == "Friends"));
}

#[test]
fn flame_zoom_is_clamped() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "flame", &sample_plan());
    let json = json_output(
        cli(&dir)
            .args(["--format", "json", "flame", "--width", "600", "--zoom", "1000000"])
            .arg(&path),
    );
    let zoom = json["zoom"].as_f64().expect("zoom");
    let max_zoom = json["max_zoom"].as_f64().expect("max zoom");
    assert!(zoom <= max_zoom + 1e-9);
    assert_eq!(json["rects"][0]["depth"], 0);
}

#[test]
fn config_file_sets_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "config", &sample_plan());
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        "theme = \"plain\"\n\n[view]\nmetric = \"cost\"\n",
    )
    .expect("write config");
    let json = json_output(
        cargo_bin_cmd!("planscope")
            .args(["--format", "json", "--config"])
            .arg(&config)
            .arg("tree")
            .arg(&path),
    );
    assert_eq!(json["metric"], "cost");
}

#[test]
fn malformed_plans_exit_with_error() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(
        &dir,
        "broken",
        &json!({"plan": {"node_type": "Root", "total_cost": 1.0, "plans": [3]}}),
    );
    let stderr = failure_stderr(cli(&dir).arg("tree").arg(&path));
    assert!(stderr.contains("[DanglingReference]"), "{stderr}");

    let stderr = failure_stderr(cli(&dir).arg("tree").arg(dir.path().join("absent.json")));
    assert!(stderr.starts_with("error: failed to read plan"), "{stderr}");
}

#[test]
fn unknown_nodes_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, "node", &sample_plan());
    let stderr = failure_stderr(cli(&dir).args(["treemap", "--node", "999999999"]).arg(&path));
    assert!(stderr.contains("plan node #999999999 not found"), "{stderr}");
}

use predicates::prelude::*;
use serde_json::{json, Value};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const LAYOUT: &str = r#"
filter = "f"

[views]
View = ["DefaultView"]

[[fields]]
name = "x"
views = ["DefaultView"]

[[fields]]
name = "y"
views = ["View"]
group = "wrapped"

[[fields]]
name = "z"
views = ["View"]
group = "wrapped"
"#;

struct Workspace {
    dir: TempDir,
    layout: PathBuf,
    ndjson: PathBuf,
}

fn workspace() -> Result<Workspace, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let layout = dir.path().join("layout.toml");
    let ndjson = dir.path().join("input.ndjson");
    fs::write(&layout, LAYOUT)?;
    fs::write(
        &ndjson,
        "{\"x\":42,\"y\":4711,\"z\":10}\n\n{\"x\":1,\"y\":2,\"z\":3}\n",
    )?;
    Ok(Workspace { dir, layout, ndjson })
}

fn jwrap() -> Result<assert_cmd::Command, Box<dyn Error>> {
    Ok(assert_cmd::Command::cargo_bin("jwrap")?)
}

fn reshape(ws: &Workspace, extra: &[&str]) -> Result<Vec<Value>, Box<dyn Error>> {
    let output = jwrap()?
        .args([
            "reshape",
            ws.ndjson.to_str().unwrap(),
            "--layout",
            ws.layout.to_str().unwrap(),
        ])
        .args(extra)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output)?;
    Ok(stdout
        .lines()
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()?)
}

#[test]
fn reshape_wraps_grouped_fields() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let records = reshape(&ws, &[])?;
    assert_eq!(
        records,
        vec![
            json!({"x": 42, "wrapped": {"y": 4711, "z": 10}}),
            json!({"x": 1, "wrapped": {"y": 2, "z": 3}}),
        ]
    );
    Ok(())
}

#[test]
fn reshape_preserves_key_order() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let output = jwrap()?
        .args([
            "reshape",
            ws.ndjson.to_str().unwrap(),
            "--layout",
            ws.layout.to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let first_line = String::from_utf8(output)?.lines().next().unwrap().to_string();
    assert_eq!(first_line, r#"{"x":42,"wrapped":{"y":4711,"z":10}}"#);
    Ok(())
}

#[test]
fn reshape_view_omits_group_outside_view() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let records = reshape(&ws, &["--view", "DefaultView"])?;
    assert_eq!(records[0], json!({"x": 42}));

    let records = reshape(&ws, &["--view", "View"])?;
    assert_eq!(records[0], json!({"x": 42, "wrapped": {"y": 4711, "z": 10}}));
    Ok(())
}

#[test]
fn reshape_exclude_applies_to_group_and_members() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let records = reshape(&ws, &["--exclude", "wrapped"])?;
    assert_eq!(records[0], json!({"x": 42}));

    let records = reshape(&ws, &["--exclude", "x,z"])?;
    assert_eq!(records[0], json!({"wrapped": {"y": 4711}}));
    Ok(())
}

#[test]
fn reshape_only_keeps_listed_names() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let records = reshape(&ws, &["--only", "wrapped,y"])?;
    assert_eq!(records[0], json!({"wrapped": {"y": 4711}}));
    Ok(())
}

#[test]
fn reshape_strict_filters_require_registration() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    jwrap()?
        .args([
            "reshape",
            ws.ndjson.to_str().unwrap(),
            "--layout",
            ws.layout.to_str().unwrap(),
            "--strict-filters",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No filter configured with id 'f'"));
    Ok(())
}

#[test]
fn reshape_json_array_round_trip() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let input = ws.dir.path().join("input.json");
    let output = ws.dir.path().join("output.json");
    fs::write(&input, r#"[{"x":42,"y":4711,"z":10},{"x":7}]"#)?;

    jwrap()?
        .args([
            "reshape",
            input.to_str().unwrap(),
            "--layout",
            ws.layout.to_str().unwrap(),
            "--output-array",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let value: Value = serde_json::from_str(&fs::read_to_string(&output)?)?;
    assert_eq!(
        value,
        json!([{"x": 42, "wrapped": {"y": 4711, "z": 10}}, {"x": 7}])
    );
    Ok(())
}

#[test]
fn reshape_reports_unwritable_output() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let output = ws.dir.path().join("missing").join("out.ndjson");

    jwrap()?
        .args([
            "reshape",
            ws.ndjson.to_str().unwrap(),
            "--layout",
            ws.layout.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to write"))
        .stderr(predicate::str::contains("I/O error"));
    Ok(())
}

#[test]
fn reshape_rejects_non_object_records() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let input = ws.dir.path().join("bad.ndjson");
    fs::write(&input, "{\"x\":1}\n[1,2]\n")?;

    jwrap()?
        .args([
            "reshape",
            input.to_str().unwrap(),
            "--layout",
            ws.layout.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("record 2 is not a JSON object"));
    Ok(())
}

#[test]
fn reshape_reports_invalid_layout() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let layout = ws.dir.path().join("broken.toml");
    fs::write(
        &layout,
        "[[fields]]\nname = \"x\"\n\n[rule]\ngroup = \"wrapped\"\nmembers = [\"missing\"]\n",
    )?;

    jwrap()?
        .args([
            "reshape",
            ws.ndjson.to_str().unwrap(),
            "--layout",
            layout.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown field 'missing'"));
    Ok(())
}

#[test]
fn inspect_prints_virtual_properties() -> Result<(), Box<dyn Error>> {
    let ws = workspace()?;
    let output = jwrap()?
        .args(["inspect", "--layout", ws.layout.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["filter"], "f");
    assert_eq!(summary["fields"][0]["name"], "x");
    assert_eq!(summary["fields"][1]["name"], "wrapped");
    assert_eq!(summary["fields"][1]["virtual"], true);
    assert_eq!(summary["fields"][1]["members"][1]["name"], "z");
    Ok(())
}

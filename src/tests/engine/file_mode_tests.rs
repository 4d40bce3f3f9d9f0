//! End-to-end runs with the local-file backends built from arguments.

use std::fs;

use serde_json::{Value, json};
use tempfile::tempdir;

use crate::builder::StageBuilder;
use crate::engine::{Transform, transform_fn};
use crate::tests::support::stage_args;

fn mark_seen() -> impl Transform {
    transform_fn(|message, ctx| {
        let mut value = message.json().cloned().ok_or("not JSON")?;
        value[ctx.settings.get_or("field", "seen")] = json!(true);
        Ok(vec![ctx.message(value)])
    })
}

fn records(text: &str) -> Vec<Value> {
    text.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
}

#[test]
fn file_mode_writes_one_output_per_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("records.json"), "{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n").unwrap();
    fs::write(input.join("ignored.txt"), "not a record\n").unwrap();

    let args = stage_args(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);
    let mut stage = StageBuilder::from_args(&args).unwrap().build(mark_seen()).unwrap();
    let report = stage.run().unwrap();

    assert_eq!(report.units, 1);
    assert_eq!(report.messages, 3);
    assert_eq!(
        records(&fs::read_to_string(output.join("records.json")).unwrap()),
        [
            json!({"n": 1, "seen": true}),
            json!({"n": 2, "seen": true}),
            json!({"n": 3, "seen": true}),
        ]
    );
    assert!(!output.join("ignored.json").exists());
}

#[test]
fn default_output_dir_is_next_to_the_input() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.json"), "{}\n").unwrap();

    let args = stage_args(&["-i", dir.path().to_str().unwrap(), "a.json"]);
    let mut stage = StageBuilder::from_args(&args).unwrap().build(mark_seen()).unwrap();
    stage.run().unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("out/a.json")).unwrap(),
        "{\"seen\":true}\n"
    );
}

#[test]
fn settings_file_reaches_the_transform() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.json"), "{}\n").unwrap();
    let settings = dir.path().join("stage.json");
    fs::write(&settings, r#"{"field": "checked"}"#).unwrap();

    let args = stage_args(&[
        "-i",
        dir.path().to_str().unwrap(),
        "-c",
        settings.to_str().unwrap(),
        "a.json",
    ]);
    let mut stage = StageBuilder::from_args(&args).unwrap().build(mark_seen()).unwrap();
    stage.run().unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("out/a.json")).unwrap(),
        "{\"checked\":true}\n"
    );
}

#[test]
fn second_run_refuses_to_overwrite_and_fails() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.json"), "{}\n").unwrap();
    let args = stage_args(&["-i", dir.path().to_str().unwrap(), "a.json"]);

    let mut first = StageBuilder::from_args(&args).unwrap().build(mark_seen()).unwrap();
    assert_eq!(first.run().unwrap().exit_code(), 0);

    let mut second = StageBuilder::from_args(&args).unwrap().build(mark_seen()).unwrap();
    let report = second.run().unwrap();
    assert_eq!(report.failed_units, 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("out/a.json")).unwrap(),
        "{\"seen\":true}\n"
    );
}

#[test]
fn whole_file_messages_with_empty_delimiter() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("doc.json"), "{\n  \"nested\": {\"x\": 1}\n}\n").unwrap();
    let args = stage_args(&["-i", dir.path().to_str().unwrap(), "-e", "", "doc.json"]);

    let mut stage = StageBuilder::from_args(&args).unwrap().build(mark_seen()).unwrap();
    stage.run().unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("out/doc.json")).unwrap(),
        "{\"nested\":{\"x\":1},\"seen\":true}\n"
    );
}

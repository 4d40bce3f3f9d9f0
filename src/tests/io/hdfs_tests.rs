//! Tests for the HDFS consumer and producer over a local mirror.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use crate::channel::Frame;
use crate::error::{Phase, StageError};
use crate::io::{Advance, Consumer, HdfsConsumer, HdfsProducer, Producer, UnitInfo};
use crate::message::Codec;
use crate::tests::support::{LocalMirrorFs, dir_entries};

#[test]
fn consumer_stages_remote_file_without_keeping_a_local_copy() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    fs.seed("/data/a.json", "{\"a\":1}\n{\"a\":2}\n");

    let mut consumer =
        HdfsConsumer::new(fs.clone(), Some(PathBuf::from("/data")), vec![], b"\n").unwrap();
    let staging = consumer.staging_path().unwrap().to_path_buf();

    assert_eq!(consumer.advance().unwrap(), Advance::Unit);
    assert!(dir_entries(&staging).is_empty());

    let unit = consumer.current_unit().unwrap().clone();
    assert_eq!(unit.name, "a.json");
    assert_eq!(unit.directory, PathBuf::from("/data"));
    assert_eq!(unit.remote_path.as_deref(), Some(Path::new("/data/a.json")));

    let channel = consumer.channel().unwrap();
    assert_eq!(channel.next_frame().unwrap(), Frame::Data(b"{\"a\":1}".to_vec()));
    assert_eq!(channel.next_frame().unwrap(), Frame::Data(b"{\"a\":2}".to_vec()));
    assert_eq!(channel.next_frame().unwrap(), Frame::EndOfUnit);

    assert_eq!(consumer.advance().unwrap(), Advance::Done);
    consumer.close().unwrap();
    assert!(!staging.exists());
    assert_eq!(fs.calls(), ["ls /data", "get /data/a.json"]);
}

#[test]
fn failed_fetch_skips_the_unit() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    fs.seed("/data/a.json", "{}\n");

    let mut consumer = HdfsConsumer::new(
        fs,
        Some(PathBuf::from("/data")),
        vec![PathBuf::from("missing.json"), PathBuf::from("a.json")],
        b"\n",
    )
    .unwrap();
    let staging = consumer.staging_path().unwrap().to_path_buf();

    match consumer.advance() {
        Err(StageError::Unit(e)) => {
            assert_eq!(e.phase, Phase::Fetch);
            assert_eq!(e.target, "/data/missing.json");
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert!(dir_entries(&staging).is_empty());
    assert_eq!(consumer.advance().unwrap(), Advance::Unit);
    assert_eq!(consumer.current_unit().unwrap().name, "a.json");
    consumer.close().unwrap();
}

#[test]
fn directory_listing_takes_every_plain_file() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    fs.seed("/data/part-00000", "{}\n");
    fs.seed("/data/part-00001", "{}\n");
    fs.seed("/data/_logs/history", "x\n");

    let mut consumer =
        HdfsConsumer::new(fs.clone(), Some(PathBuf::from("/data")), vec![], b"\n").unwrap();
    let mut seen = Vec::new();
    while consumer.advance().unwrap() == Advance::Unit {
        seen.push(consumer.current_unit().unwrap().name.clone());
    }
    assert_eq!(seen, ["part-00000", "part-00001"]);
    consumer.close().unwrap();
}

#[test]
fn failed_listing_is_fatal() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()).failing_listing());
    let mut consumer =
        HdfsConsumer::new(fs, Some(PathBuf::from("/data")), vec![], b"\n").unwrap();
    assert!(matches!(consumer.advance(), Err(StageError::Fatal(_))));
    consumer.close().unwrap();
}

#[test]
fn remote_names_are_read_line_by_line() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    fs.seed("/data/a.json", "{}\n");
    fs.seed("/data/b.json", "{}\n");

    let names = Cursor::new(b"b.json\n\n  a.json  \n".to_vec());
    let mut consumer = HdfsConsumer::new(fs.clone(), Some(PathBuf::from("/data")), vec![], b"\n")
        .unwrap()
        .with_names(Box::new(names));

    let mut seen = Vec::new();
    while consumer.advance().unwrap() == Advance::Unit {
        seen.push(consumer.current_unit().unwrap().name.clone());
    }
    assert_eq!(seen, ["b.json", "a.json"]);
    assert!(fs.calls().iter().all(|c| !c.starts_with("ls")));
    consumer.close().unwrap();
}

#[test]
fn producer_relocates_output_next_to_remote_input() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    let mut producer = HdfsProducer::new(fs.clone(), PathBuf::from("out"), ".json", b"\n", b"").unwrap();
    let staging = producer.staging_path().unwrap().to_path_buf();

    let unit = UnitInfo::staged(Path::new("/data/a.json"), Path::new("/tmp/1-a.json"));
    producer.begin_unit(Some(&unit)).unwrap();
    assert_eq!(producer.current_destination(), Some(Path::new("/data/out/a.json")));
    producer.write(Codec::Json.message(json!({"a": 1}))).unwrap();
    producer.flush().unwrap();
    producer.close().unwrap();

    assert_eq!(fs.read("/data/out/a.json"), "{\"a\":1}\n");
    assert_eq!(fs.calls(), ["mkdir /data/out", "put /data/out/a.json"]);
    assert!(!staging.exists());
}

#[test]
fn producer_relocates_previous_output_when_the_unit_changes() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    let mut producer =
        HdfsProducer::new(fs.clone(), PathBuf::from("/results"), ".json", b"\n", b"").unwrap();
    let staging = producer.staging_path().unwrap().to_path_buf();

    for name in ["a", "b"] {
        let remote = format!("/data/{name}.json");
        let unit = UnitInfo::staged(Path::new(&remote), Path::new("/tmp/x"));
        producer.begin_unit(Some(&unit)).unwrap();
        producer.write(Codec::Json.message(json!(name))).unwrap();
        producer.flush().unwrap();
    }
    assert_eq!(fs.read("/results/a.json"), "\"a\"\n");
    assert_eq!(dir_entries(&staging), ["2-b.json"]);

    producer.close().unwrap();
    assert_eq!(fs.read("/results/b.json"), "\"b\"\n");
}

#[test]
fn output_without_remote_input_goes_to_temporary_directory() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    let producer = HdfsProducer::new(fs, PathBuf::from("out"), ".json", b"\n", b"").unwrap();

    let dir = producer.remote_dir_for(None);
    assert!(dir.starts_with("/user/DKB/temp"));
    assert!(dir.ends_with("out"));
}

#[test]
fn relocation_failure_is_reported_at_close() {
    let root = tempdir().unwrap();
    let fs = Arc::new(LocalMirrorFs::new(root.path()));
    fs.seed("/data/out/a.json", "existing");
    let mut producer = HdfsProducer::new(fs.clone(), PathBuf::from("out"), ".json", b"\n", b"").unwrap();
    let staging = producer.staging_path().unwrap().to_path_buf();

    let unit = UnitInfo::staged(Path::new("/data/a.json"), Path::new("/tmp/x"));
    producer.begin_unit(Some(&unit)).unwrap();
    producer.write(Codec::Json.message(json!(1))).unwrap();
    producer.flush().unwrap();

    let err = producer.close().unwrap_err();
    assert_eq!(err.len(), 1);
    assert_eq!(err.errors[0].phase, Phase::Relocate);
    assert_eq!(fs.read("/data/out/a.json"), "existing");
    assert!(!staging.exists());
}

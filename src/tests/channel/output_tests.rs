//! Tests for buffered output channels.

use serde_json::json;

use crate::channel::OutputChannel;
use crate::error::StageError;
use crate::io::SharedBuffer;
use crate::message::Codec;

fn channel(eom: &[u8], eop: &[u8]) -> (OutputChannel, SharedBuffer) {
    let sink = SharedBuffer::new();
    let ch = OutputChannel::new("test", Box::new(sink.clone()), eom, eop);
    (ch, sink)
}

#[test]
fn flush_writes_buffered_messages_in_order() {
    let (mut ch, sink) = channel(b"\n", b"");
    ch.write(Codec::Json.message(json!({"a": 1})));
    ch.write(Codec::Json.message(json!({"a": 2})));
    assert_eq!(ch.buffered(), 2);
    assert!(sink.contents().is_empty());

    assert_eq!(ch.flush().unwrap(), 2);
    assert_eq!(sink.contents_string(), "{\"a\":1}\n{\"a\":2}\n");
    assert_eq!(ch.buffered(), 0);
}

#[test]
fn discard_drops_buffer_without_writing() {
    let (mut ch, sink) = channel(b"\n", b"");
    ch.write_all(vec![Codec::Json.message(json!(1)), Codec::Json.message(json!(2))]);
    assert_eq!(ch.discard(), 2);
    assert_eq!(ch.flush().unwrap(), 0);
    assert!(sink.contents().is_empty());
}

#[test]
fn end_of_process_marker_follows_flushed_output() {
    let (mut ch, sink) = channel(b"<EOM>", b"\0");
    ch.write(Codec::Ttl.message("<a> <b> <c> ."));
    ch.flush().unwrap();
    ch.signal_end_of_process().unwrap();
    assert_eq!(sink.contents(), b"<a> <b> <c> .<EOM>\0".to_vec());
}

#[test]
fn empty_end_of_process_marker_writes_nothing() {
    let (mut ch, sink) = channel(b"\n", b"");
    ch.signal_end_of_process().unwrap();
    assert!(sink.contents().is_empty());
}

#[test]
fn encode_failure_writes_nothing_from_the_batch() {
    let (mut ch, sink) = channel(b"\n", b"");
    ch.write(Codec::Json.message(json!({"ok": true})));
    ch.write(Codec::Json.message("not json"));

    assert!(matches!(ch.flush(), Err(StageError::Message(_))));
    assert!(sink.contents().is_empty());
    assert_eq!(ch.buffered(), 0);
}

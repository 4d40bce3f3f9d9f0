//! Tests for the in-memory backends.

use serde_json::json;

use crate::channel::Frame;
use crate::io::{Advance, Consumer, InMemoryConsumer, InMemoryProducer, Producer, SharedBuffer};
use crate::message::Codec;

#[test]
fn consumer_yields_units_in_order() {
    let mut consumer = InMemoryConsumer::new(b"\n")
        .with_unit("one.json", "1\n")
        .with_unit("dir/two.json", "2\n");

    assert_eq!(consumer.advance().unwrap(), Advance::Unit);
    assert_eq!(consumer.current_unit().unwrap().name, "one.json");
    assert_eq!(consumer.channel().unwrap().next_frame().unwrap(), Frame::Data(b"1".to_vec()));

    assert_eq!(consumer.advance().unwrap(), Advance::Unit);
    assert_eq!(consumer.current_unit().unwrap().stem(), "two");

    assert_eq!(consumer.advance().unwrap(), Advance::Done);
    assert!(consumer.channel().is_none());
}

#[test]
fn producer_records_units_and_writes_to_sink() {
    let mut producer = InMemoryProducer::new(b"\n", b"#");
    let sink = producer.sink();

    producer.begin_unit(None).unwrap();
    producer.write(Codec::Json.message(json!({"k": "v"}))).unwrap();
    producer.flush().unwrap();
    producer.signal_end_of_process().unwrap();
    producer.close().unwrap();

    assert_eq!(sink.contents_string(), "{\"k\":\"v\"}\n#");
    assert_eq!(producer.units().to_vec(), vec![None]);
    assert!(producer.is_closed());
}

#[test]
fn write_before_begin_unit_is_rejected() {
    let mut producer = InMemoryProducer::new(b"\n", b"");
    assert!(producer.write(Codec::Json.message(json!(1))).is_err());
}

#[test]
fn shared_buffer_clones_see_the_same_bytes() {
    let buffer = SharedBuffer::new();
    let mut writer = buffer.clone();
    std::io::Write::write_all(&mut writer, b"abc").unwrap();
    assert_eq!(buffer.contents(), b"abc".to_vec());
    buffer.clear();
    assert!(writer.contents().is_empty());
}

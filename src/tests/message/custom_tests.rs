//! Tests for user-defined codecs.

use serde_json::{Value, json};

use crate::message::{Codec, Content, CustomCodec, MessageError, MessageKind};

/// `key=value;key=value` records.
fn pairs_codec() -> CustomCodec {
    CustomCodec::new("pairs", ".kv")
        .with_decode(|bytes| {
            let text = std::str::from_utf8(bytes)?;
            let mut map = serde_json::Map::new();
            for pair in text.split(';').filter(|p| !p.is_empty()) {
                let (k, v) = pair.split_once('=').ok_or("missing '='")?;
                let v = if v == "true" { Value::Bool(true) } else { Value::String(v.into()) };
                map.insert(k.to_string(), v);
            }
            Ok(Value::Object(map))
        })
        .with_encode(|value| {
            let map = value.as_object().ok_or("not an object")?;
            let mut fields: Vec<String> = map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}={s}"),
                    other => format!("{k}={other}"),
                })
                .collect();
            fields.sort();
            Ok(fields.join(";").into_bytes())
        })
}

#[test]
fn custom_codec_decodes_and_encodes() {
    let codec = Codec::Custom(pairs_codec());
    let mut m = codec.from_raw(b"a=1;b=2".to_vec());
    assert_eq!(m.decode().unwrap(), Content::Json(json!({"a": "1", "b": "2"})));
    assert_eq!(m.kind(), MessageKind::Custom("pairs"));

    let mut out = codec.message(json!({"x": "y"}));
    assert_eq!(out.encode().unwrap(), b"x=y".to_vec());
    assert_eq!(codec.extension(), ".kv");
}

#[test]
fn custom_codec_carries_incomplete_flag() {
    let codec = Codec::Custom(pairs_codec());
    let mut out = codec.message(json!({"x": "y"}));
    out.set_incomplete(true);
    let raw = out.encode().unwrap();
    assert_eq!(raw, b"_incomplete=true;x=y".to_vec());

    let mut back = codec.from_raw(raw);
    assert_eq!(back.decode().unwrap(), Content::Json(json!({"x": "y"})));
    assert!(back.is_incomplete());
}

#[test]
fn custom_decode_failure_is_reported_with_codec_name() {
    let codec = Codec::Custom(pairs_codec());
    let err = codec.from_raw(b"novalue".to_vec()).decode().unwrap_err();
    assert!(matches!(err, MessageError::Decode { kind: MessageKind::Custom("pairs"), .. }));
    assert!(err.to_string().contains("missing '='"));
}

#[test]
fn missing_closure_is_unsupported() {
    let codec = Codec::Custom(CustomCodec::new("read-only", ""));
    let err = codec.message(json!({})).encode().unwrap_err();
    assert!(matches!(err, MessageError::Unsupported { op: "encoding", .. }));
    assert_eq!(codec.extension(), ".out");
}

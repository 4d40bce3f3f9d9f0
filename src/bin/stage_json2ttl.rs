//! Sample stage: turns JSON records into TTL statements.
//!
//! Each scalar field of a record becomes one statement about the subject
//! `<{prefix}{id}>`. The prefix comes from the `prefix` setting.

use serde_json::Value;
use stageio::{Codec, Message, StageContext, TransformError};

const DEFAULT_PREFIX: &str = "http://example.org/";

fn literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        Value::Number(n) => Some(format!("\"{n}\"^^<http://www.w3.org/2001/XMLSchema#double>")),
        _ => None,
    }
}

fn json2ttl(message: &Message, ctx: &StageContext<'_>) -> Result<Vec<Message>, TransformError> {
    let record = message
        .json()
        .and_then(Value::as_object)
        .ok_or("record is not a JSON object")?;
    let id = match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err("record has no usable 'id' field".into()),
    };
    let prefix = ctx.settings.get_or("prefix", DEFAULT_PREFIX);

    Ok(record
        .iter()
        .filter(|(key, _)| key.as_str() != "id")
        .filter_map(|(key, value)| {
            literal(value).map(|object| format!("<{prefix}{id}> <{prefix}{key}> {object} ."))
        })
        .map(|statement| ctx.message(statement))
        .collect())
}

fn main() {
    stageio::run_main("stage_json2ttl", Codec::Json, Codec::Ttl, json2ttl)
}

//! Sample stage: adds `"seen": true` to every JSON record.

use stageio::{Codec, Message, StageContext, TransformError};

fn mark_seen(message: &Message, ctx: &StageContext<'_>) -> Result<Vec<Message>, TransformError> {
    let mut record = message.json().cloned().ok_or("record is not JSON")?;
    let fields = record
        .as_object_mut()
        .ok_or("record is not a JSON object")?;
    let field = ctx.settings.get_or("field", "seen").to_string();
    fields.insert(field, serde_json::Value::Bool(true));
    Ok(vec![ctx.message(record)])
}

fn main() {
    stageio::run_main("stage_mark_seen", Codec::Json, Codec::Json, mark_seen)
}

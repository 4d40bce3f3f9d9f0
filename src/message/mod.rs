//! Typed, codec-aware messages.
//!
//! This module provides:
//! - `MessageKind`: The content kind a codec produces
//! - `Content`: A decoded message body (JSON tree or text statement)
//! - `Codec`: Tagged dispatch over the built-in and custom codecs
//! - `Message`: One logical record with cached decode/encode and an
//!   out-of-band "incomplete" marker

mod custom;

pub use custom::{CustomCodec, DecodeFn, EncodeFn};

use serde_json::Value;
use thiserror::Error;

/// Reserved key carrying the incomplete marker inside encoded JSON objects.
pub const INCOMPLETE_KEY: &str = "_incomplete";

/// Extension used when no codec-specific one applies.
pub const DEFAULT_EXTENSION: &str = ".out";

/// Represents the content kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Tree-shaped JSON documents
    Json,
    /// Opaque text statements (Turtle)
    Ttl,
    /// Custom codec with a unique name
    Custom(&'static str),
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Json => write!(f, "JSON"),
            MessageKind::Ttl => write!(f, "TTL"),
            MessageKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl MessageKind {
    /// Parse a built-in kind from a string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(MessageKind::Json),
            "ttl" | "turtle" => Some(MessageKind::Ttl),
            _ => None,
        }
    }
}

/// Decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Json(Value),
    Text(String),
}

impl Content {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Content::Json(v) => Some(v),
            Content::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Json(_) => None,
        }
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Json(value)
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

/// Errors raised while converting between wire bytes and content.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Cannot decode {kind} message: {reason}")]
    Decode { kind: MessageKind, reason: String },

    #[error("Cannot encode {kind} message: {reason}")]
    Encode { kind: MessageKind, reason: String },

    #[error("{kind} codec does not support {op}")]
    Unsupported { kind: MessageKind, op: &'static str },
}

/// Codec resolved once at configuration time.
#[derive(Debug, Clone)]
pub enum Codec {
    Json,
    Ttl,
    Custom(CustomCodec),
}

impl Codec {
    pub fn kind(&self) -> MessageKind {
        match self {
            Codec::Json => MessageKind::Json,
            Codec::Ttl => MessageKind::Ttl,
            Codec::Custom(c) => MessageKind::Custom(c.name),
        }
    }

    /// File extension (with the leading dot) for files carrying this codec.
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Json => ".json",
            Codec::Ttl => ".ttl",
            Codec::Custom(c) if c.extension.is_empty() => DEFAULT_EXTENSION,
            Codec::Custom(c) => c.extension,
        }
    }

    /// Build a message that still has to be decoded.
    pub fn from_raw(&self, raw: impl Into<Vec<u8>>) -> Message {
        Message::from_raw(self.clone(), raw)
    }

    /// Build a message from native content; encoding is deferred.
    pub fn message(&self, content: impl Into<Content>) -> Message {
        Message::from_content(self.clone(), content)
    }

    fn decode_bytes(&self, raw: &[u8]) -> Result<(Content, bool), MessageError> {
        match self {
            Codec::Json => {
                let value = serde_json::from_slice(raw).map_err(|e| MessageError::Decode {
                    kind: MessageKind::Json,
                    reason: e.to_string(),
                })?;
                Ok(strip_incomplete(value))
            }
            Codec::Ttl => match std::str::from_utf8(raw) {
                Ok(text) => Ok((Content::Text(text.to_string()), false)),
                Err(e) => Err(MessageError::Decode {
                    kind: MessageKind::Ttl,
                    reason: e.to_string(),
                }),
            },
            Codec::Custom(custom) => custom.decode(raw).map(strip_incomplete),
        }
    }

    fn encode_content(&self, content: &Content, incomplete: bool) -> Result<Vec<u8>, MessageError> {
        match (self, content) {
            (Codec::Json, Content::Json(value)) => {
                let value = inject_incomplete(value, incomplete);
                serde_json::to_vec(value.as_ref()).map_err(|e| MessageError::Encode {
                    kind: MessageKind::Json,
                    reason: e.to_string(),
                })
            }
            (Codec::Ttl, Content::Text(text)) => Ok(text.clone().into_bytes()),
            (Codec::Custom(custom), Content::Json(value)) => {
                custom.encode(inject_incomplete(value, incomplete).as_ref())
            }
            (Codec::Ttl, Content::Json(_)) => Err(MessageError::Encode {
                kind: MessageKind::Ttl,
                reason: "content is a JSON tree, not a text statement".into(),
            }),
            (codec, Content::Text(_)) => Err(MessageError::Encode {
                kind: codec.kind(),
                reason: "content is a text statement, not a JSON tree".into(),
            }),
        }
    }
}

fn strip_incomplete(mut value: Value) -> (Content, bool) {
    let flag = match value.as_object_mut() {
        Some(map) => map
            .remove(INCOMPLETE_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        None => false,
    };
    (Content::Json(value), flag)
}

fn inject_incomplete(value: &Value, incomplete: bool) -> std::borrow::Cow<'_, Value> {
    match value {
        Value::Object(map) if incomplete => {
            let mut map = map.clone();
            map.insert(INCOMPLETE_KEY.to_string(), Value::Bool(true));
            std::borrow::Cow::Owned(Value::Object(map))
        }
        _ => std::borrow::Cow::Borrowed(value),
    }
}

/// One logical record carried by exactly one frame.
///
/// A message built from raw bytes decodes lazily, one built from content
/// encodes lazily. Both results are cached, and accessors hand out copies,
/// never references into the cache that a caller could mutate.
#[derive(Debug, Clone)]
pub struct Message {
    codec: Codec,
    raw: Option<Vec<u8>>,
    decoded: Option<Content>,
    incomplete: bool,
    // Set when the flag changed before the raw form was decoded.
    flag_pinned: bool,
}

impl Message {
    pub fn from_raw(codec: Codec, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            codec,
            raw: Some(raw.into()),
            decoded: None,
            incomplete: false,
            flag_pinned: false,
        }
    }

    pub fn from_content(codec: Codec, content: impl Into<Content>) -> Self {
        Self {
            codec,
            raw: None,
            decoded: Some(content.into()),
            incomplete: false,
            flag_pinned: false,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.codec.kind()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Decode the raw form, caching the result.
    ///
    /// For JSON-shaped kinds the reserved incomplete key is removed from the
    /// returned content and reflected by [`Message::is_incomplete`].
    pub fn decode(&mut self) -> Result<Content, MessageError> {
        if let Some(content) = &self.decoded {
            return Ok(content.clone());
        }
        let raw = self.raw.as_deref().unwrap_or_default();
        let (content, flag) = self.codec.decode_bytes(raw)?;
        if self.flag_pinned {
            self.raw = None;
            self.flag_pinned = false;
        } else {
            self.incomplete = flag;
        }
        self.decoded = Some(content.clone());
        Ok(content)
    }

    /// Encode to wire bytes (without the end-of-message delimiter).
    pub fn encode(&mut self) -> Result<Vec<u8>, MessageError> {
        if self.flag_pinned {
            self.decode()?;
        }
        if let Some(raw) = &self.raw {
            return Ok(raw.clone());
        }
        let raw = match &self.decoded {
            Some(content) => self.codec.encode_content(content, self.incomplete)?,
            None => Vec::new(),
        };
        self.raw = Some(raw.clone());
        Ok(raw)
    }

    /// Decoded content, if it is already available.
    pub fn content(&self) -> Option<&Content> {
        self.decoded.as_ref()
    }

    pub fn json(&self) -> Option<&Value> {
        self.decoded.as_ref().and_then(Content::as_json)
    }

    pub fn text(&self) -> Option<&str> {
        self.decoded.as_ref().and_then(Content::as_text)
    }

    /// Raw wire form, if it is already available.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn set_incomplete(&mut self, flag: bool) {
        if self.decoded.is_some() {
            if self.incomplete != flag {
                self.raw = None;
            }
        } else {
            self.flag_pinned = true;
        }
        self.incomplete = flag;
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn file_extension(&self) -> &'static str {
        self.codec.extension()
    }
}

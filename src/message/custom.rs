//! Custom codecs for user-defined message kinds.
//!
//! A custom codec converts wire bytes to and from a `serde_json::Value`
//! tree, so the incomplete marker and the transform API work the same way
//! as for the built-in JSON codec.

use std::sync::Arc;

use serde_json::Value;

use super::{MessageError, MessageKind};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for a custom decode function.
pub type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<Value, BoxError> + Send + Sync>;

/// Type alias for a custom encode function.
pub type EncodeFn = Arc<dyn Fn(&Value) -> Result<Vec<u8>, BoxError> + Send + Sync>;

/// A codec built from user closures.
///
/// # Example
///
/// ```rust,ignore
/// use stageio::message::{Codec, CustomCodec};
///
/// let csv_line = CustomCodec::new("csv-line", ".csv")
///     .with_decode(|bytes| {
///         let text = std::str::from_utf8(bytes)?;
///         Ok(text.split(',').map(|f| f.trim().into()).collect())
///     })
///     .with_encode(|value| Ok(value.to_string().into_bytes()));
///
/// let codec = Codec::Custom(csv_line);
/// ```
#[derive(Clone)]
pub struct CustomCodec {
    /// Unique name for this codec
    pub name: &'static str,
    /// Output file extension, leading dot included
    pub extension: &'static str,
    decode_fn: Option<DecodeFn>,
    encode_fn: Option<EncodeFn>,
}

impl std::fmt::Debug for CustomCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCodec")
            .field("name", &self.name)
            .field("extension", &self.extension)
            .field("has_decode", &self.decode_fn.is_some())
            .field("has_encode", &self.encode_fn.is_some())
            .finish()
    }
}

impl CustomCodec {
    pub fn new(name: &'static str, extension: &'static str) -> Self {
        Self {
            name,
            extension,
            decode_fn: None,
            encode_fn: None,
        }
    }

    pub fn with_decode<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.decode_fn = Some(Arc::new(f));
        self
    }

    pub fn with_encode<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    {
        self.encode_fn = Some(Arc::new(f));
        self
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value, MessageError> {
        let kind = MessageKind::Custom(self.name);
        let decode_fn = self.decode_fn.as_ref().ok_or(MessageError::Unsupported {
            kind,
            op: "decoding",
        })?;
        decode_fn(bytes).map_err(|e| MessageError::Decode {
            kind,
            reason: e.to_string(),
        })
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, MessageError> {
        let kind = MessageKind::Custom(self.name);
        let encode_fn = self.encode_fn.as_ref().ok_or(MessageError::Unsupported {
            kind,
            op: "encoding",
        })?;
        encode_fn(value).map_err(|e| MessageError::Encode {
            kind,
            reason: e.to_string(),
        })
    }
}

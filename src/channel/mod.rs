//! Delimited byte channels.
//!
//! An `InputChannel` splits one open byte channel into frames bounded by the
//! end-of-message delimiter and decodes them into messages. An
//! `OutputChannel` buffers messages and joins their encoded form with the
//! same delimiter, plus an end-of-process marker per unit of work.

mod input;
mod output;

pub use input::{Frame, Incoming, InputChannel, Liveness};
pub use output::OutputChannel;

const PREVIEW_LEN: usize = 64;

/// Printable, truncated preview of a frame for diagnostics.
pub(crate) fn preview(bytes: &[u8]) -> String {
    if bytes.len() <= PREVIEW_LEN {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!(
            "{}... ({} bytes)",
            String::from_utf8_lossy(&bytes[..PREVIEW_LEN]),
            bytes.len()
        )
    }
}

pub(crate) fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

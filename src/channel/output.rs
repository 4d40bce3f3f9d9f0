use std::io::{self, Write};

use tracing::debug;

use crate::error::{Phase, StageError, UnitError};
use crate::message::Message;

/// Output side of a delimited channel.
///
/// Messages are buffered until [`OutputChannel::flush`]; a failed input
/// record drops its buffered output with [`OutputChannel::discard`].
pub struct OutputChannel {
    id: String,
    writer: Box<dyn Write + Send>,
    eom: Vec<u8>,
    eop: Vec<u8>,
    buffer: Vec<Message>,
}

impl std::fmt::Debug for OutputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputChannel")
            .field("id", &self.id)
            .field("eom", &String::from_utf8_lossy(&self.eom))
            .field("eop", &String::from_utf8_lossy(&self.eop))
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl OutputChannel {
    pub fn new(id: impl Into<String>, writer: Box<dyn Write + Send>, eom: &[u8], eop: &[u8]) -> Self {
        Self {
            id: id.into(),
            writer,
            eom: eom.to_vec(),
            eop: eop.to_vec(),
            buffer: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn write(&mut self, message: Message) {
        self.buffer.push(message);
    }

    pub fn write_all(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.buffer.extend(messages);
    }

    /// Write every buffered message followed by the delimiter, in order.
    ///
    /// All messages are encoded before the first byte is written, so an
    /// encode failure writes nothing and empties the buffer. A write failure
    /// can leave a prefix of the batch written.
    pub fn flush(&mut self) -> Result<usize, StageError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let mut frames = Vec::with_capacity(self.buffer.len());
        for message in &mut self.buffer {
            match message.encode() {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    self.buffer.clear();
                    return Err(StageError::Message(e));
                }
            }
        }
        self.buffer.clear();
        for frame in &frames {
            self.writer
                .write_all(frame)
                .and_then(|_| self.writer.write_all(&self.eom))
                .map_err(|e| self.write_error(e))?;
        }
        self.writer.flush().map_err(|e| self.write_error(e))?;
        Ok(frames.len())
    }

    /// Drop the buffered messages without writing them.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 {
            debug!(dest = %self.id, dropped, "Discarding buffered output");
        }
        self.buffer.clear();
        dropped
    }

    pub fn signal_end_of_process(&mut self) -> Result<(), StageError> {
        if self.eop.is_empty() {
            return Ok(());
        }
        self.writer
            .write_all(&self.eop)
            .and_then(|_| self.writer.flush())
            .map_err(|e| self.write_error(e))
    }

    /// Discard anything still buffered and flush the underlying writer.
    pub fn close(mut self) -> Result<(), UnitError> {
        self.discard();
        self.writer
            .flush()
            .map_err(|e| UnitError::new(Phase::Close, self.id.clone(), e))
    }

    fn write_error(&self, e: io::Error) -> StageError {
        StageError::Unit(UnitError::new(Phase::Write, self.id.clone(), e))
    }
}

use std::fs::File;
use std::io::{self, Read, Seek};
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

use tracing::warn;

use super::{is_blank, preview};
use crate::error::{Phase, StageError, UnitError};
use crate::message::{Codec, Message, MessageError};
use crate::signal;

// Larger than std's stdin buffer, so stdin reads bypass it and the
// readiness probe sees every byte that has not been consumed yet.
const CHUNK_SIZE: usize = 64 * 1024;
const POLL_TIMEOUT_MS: i32 = 10;

/// Result of the liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No frame has been requested yet
    Unknown,
    /// More data is available or may still arrive
    Readable,
    /// The channel is permanently exhausted
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Frame bytes, delimiter excluded
    Data(Vec<u8>),
    EndOfUnit,
}

#[derive(Debug)]
pub enum Incoming {
    Message(Message),
    /// The frame could not be decoded with the configured codec
    Malformed { raw: Vec<u8>, error: MessageError },
    EndOfUnit,
}

enum Probe {
    File(File),
    #[cfg(unix)]
    Poll(RawFd),
    Opaque,
}

/// Input side of a delimited channel.
pub struct InputChannel {
    id: String,
    reader: Box<dyn Read + Send>,
    probe: Probe,
    eom: Vec<u8>,
    pending: Vec<u8>,
    // Start of the unconsumed region of `pending`.
    head: usize,
    // No delimiter starts before this offset.
    scan_from: usize,
    chunk: Vec<u8>,
    eof: bool,
    started: bool,
}

impl std::fmt::Debug for InputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputChannel")
            .field("id", &self.id)
            .field("eom", &String::from_utf8_lossy(&self.eom))
            .field("pending", &(self.pending.len() - self.head))
            .field("eof", &self.eof)
            .finish()
    }
}

impl InputChannel {
    fn with_probe(id: String, reader: Box<dyn Read + Send>, probe: Probe, eom: Vec<u8>) -> Self {
        Self {
            id,
            reader,
            probe,
            eom,
            pending: Vec::new(),
            head: 0,
            scan_from: 0,
            chunk: vec![0; CHUNK_SIZE],
            eof: false,
            started: false,
        }
    }

    /// Channel over an open file; liveness compares offset and size.
    pub fn from_file(id: impl Into<String>, file: File, eom: &[u8]) -> io::Result<Self> {
        let probe = Probe::File(file.try_clone()?);
        Ok(Self::with_probe(id.into(), Box::new(file), probe, eom.to_vec()))
    }

    /// Channel over the process's standard input.
    pub fn from_stdin(eom: &[u8]) -> Self {
        let stdin = io::stdin();
        #[cfg(unix)]
        let probe = Probe::Poll(stdin.as_raw_fd());
        #[cfg(not(unix))]
        let probe = Probe::Opaque;
        Self::with_probe("<stdin>".into(), Box::new(stdin), probe, eom.to_vec())
    }

    pub fn from_reader(id: impl Into<String>, reader: Box<dyn Read + Send>, eom: &[u8]) -> Self {
        Self::with_probe(id.into(), reader, Probe::Opaque, eom.to_vec())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn end_of_message(&self) -> &[u8] {
        &self.eom
    }

    /// Read the next frame, blocking until a delimiter or the end of input.
    ///
    /// With an empty delimiter the whole channel is one frame. Empty frames
    /// are returned like any other, so every delimiter on the channel yields
    /// exactly one frame. Bytes left after the last delimiter are dropped
    /// with a warning.
    pub fn next_frame(&mut self) -> Result<Frame, StageError> {
        self.started = true;
        loop {
            if let Some(frame) = self.split_frame() {
                return Ok(Frame::Data(frame));
            }
            if self.eof {
                return Ok(self.drain_tail().map_or(Frame::EndOfUnit, Frame::Data));
            }
            self.fill()?;
        }
    }

    /// Read the next frame and decode it with `codec`.
    ///
    /// A frame that fails to decode is logged and returned as
    /// `Incoming::Malformed` so the caller can skip it.
    pub fn next_message(&mut self, codec: &Codec) -> Result<Incoming, StageError> {
        let raw = match self.next_frame()? {
            Frame::EndOfUnit => return Ok(Incoming::EndOfUnit),
            Frame::Data(raw) => raw,
        };
        let mut message = codec.from_raw(raw);
        match message.decode() {
            Ok(_) => Ok(Incoming::Message(message)),
            Err(error) => {
                let raw = message.raw().map(<[u8]>::to_vec).unwrap_or_default();
                warn!(
                    source = %self.id,
                    frame = %preview(&raw),
                    "Failed to read input message as {}: {}",
                    codec.kind(),
                    error
                );
                Ok(Incoming::Malformed { raw, error })
            }
        }
    }

    /// Tell "more data may arrive" apart from "channel exhausted".
    ///
    /// Never blocks on a file. On standard input it polls with a short
    /// timeout; no data within the timeout still counts as readable.
    pub fn is_readable(&mut self) -> Result<Liveness, StageError> {
        if !self.started {
            return Ok(Liveness::Unknown);
        }
        if self.has_frame_ready() {
            return Ok(Liveness::Readable);
        }
        if self.eof {
            return Ok(Liveness::Exhausted);
        }
        match &mut self.probe {
            Probe::File(file) => {
                let position = file.stream_position().and_then(|offset| {
                    file.metadata().map(|meta| offset < meta.len())
                });
                match position {
                    Ok(true) => Ok(Liveness::Readable),
                    Ok(false) => Ok(Liveness::Exhausted),
                    Err(e) => Err(self.read_error(e)),
                }
            }
            #[cfg(unix)]
            Probe::Poll(fd) => {
                let fd = *fd;
                match wait_readable(fd, POLL_TIMEOUT_MS) {
                    Ok(false) => Ok(Liveness::Readable),
                    Ok(true) => self.probe_by_reading(),
                    Err(e) => Err(self.read_error(e)),
                }
            }
            Probe::Opaque => self.probe_by_reading(),
        }
    }

    fn probe_by_reading(&mut self) -> Result<Liveness, StageError> {
        self.fill()?;
        if self.has_frame_ready() || !self.eof {
            Ok(Liveness::Readable)
        } else {
            Ok(Liveness::Exhausted)
        }
    }

    fn has_frame_ready(&self) -> bool {
        if self.eom.is_empty() {
            self.eof && self.head < self.pending.len()
        } else {
            find(&self.pending[self.scan_from..], &self.eom).is_some()
        }
    }

    fn split_frame(&mut self) -> Option<Vec<u8>> {
        if self.eom.is_empty() {
            return None;
        }
        match find(&self.pending[self.scan_from..], &self.eom) {
            Some(pos) => {
                let end = self.scan_from + pos;
                let frame = self.pending[self.head..end].to_vec();
                self.head = end + self.eom.len();
                self.scan_from = self.head;
                Some(frame)
            }
            None => {
                let tail_start = self.pending.len().saturating_sub(self.eom.len() - 1);
                self.scan_from = tail_start.max(self.head);
                None
            }
        }
    }

    fn drain_tail(&mut self) -> Option<Vec<u8>> {
        let tail = self.pending.split_off(self.head);
        self.pending.clear();
        self.head = 0;
        self.scan_from = 0;
        if tail.is_empty() {
            return None;
        }
        if self.eom.is_empty() {
            return Some(tail);
        }
        if !is_blank(&tail) {
            warn!(
                source = %self.id,
                dangling = %preview(&tail),
                "Input ended without a final end-of-message marker, dropping {} trailing bytes",
                tail.len()
            );
        }
        None
    }

    fn fill(&mut self) -> Result<(), StageError> {
        if self.head > 0 {
            self.pending.drain(..self.head);
            self.scan_from -= self.head;
            self.head = 0;
        }
        loop {
            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&self.chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if let Some(sig) = signal::received() {
                        return Err(StageError::Interrupted(sig));
                    }
                }
                Err(e) => return Err(self.read_error(e)),
            }
        }
    }

    fn read_error(&self, e: io::Error) -> StageError {
        match signal::received() {
            Some(sig) if e.kind() == io::ErrorKind::Interrupted => StageError::Interrupted(sig),
            _ => StageError::Unit(UnitError::new(Phase::Read, self.id.clone(), e)),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(unix)]
fn wait_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        // SAFETY: `pfd` is a valid pollfd and the count is 1.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted && signal::received().is_none() {
                continue;
            }
            return Err(err);
        }
        // POLLHUP and POLLERR count as ready: the next read reports them.
        return Ok(ret > 0);
    }
}

//! In-memory backends for testing.

use std::collections::VecDeque;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::{Advance, Consumer, Producer, UnitInfo};
use crate::channel::{InputChannel, OutputChannel};
use crate::error::{AggregateError, StageError};

/// Consumer over a fixed list of named in-memory units.
#[derive(Debug)]
pub struct InMemoryConsumer {
    units: VecDeque<(String, Vec<u8>)>,
    eom: Vec<u8>,
    channel: Option<InputChannel>,
    unit: Option<UnitInfo>,
}

impl InMemoryConsumer {
    pub fn new(eom: &[u8]) -> Self {
        Self {
            units: VecDeque::new(),
            eom: eom.to_vec(),
            channel: None,
            unit: None,
        }
    }

    /// Append a unit named `name` (used as its path) holding `data`.
    pub fn with_unit(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.units.push_back((name.into(), data.into()));
        self
    }
}

impl Consumer for InMemoryConsumer {
    fn id(&self) -> &str {
        "memory"
    }

    fn advance(&mut self) -> Result<Advance, StageError> {
        self.channel = None;
        self.unit = None;
        let Some((name, data)) = self.units.pop_front() else {
            return Ok(Advance::Done);
        };
        self.unit = Some(UnitInfo::local(Path::new(&name)));
        self.channel = Some(InputChannel::from_reader(name, Box::new(Cursor::new(data)), &self.eom));
        Ok(Advance::Unit)
    }

    fn channel(&mut self) -> Option<&mut InputChannel> {
        self.channel.as_mut()
    }

    fn current_unit(&self) -> Option<&UnitInfo> {
        self.unit.as_ref()
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        self.channel = None;
        self.unit = None;
        Ok(())
    }
}

/// Cloneable byte buffer implementing `Write`.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    pub fn clear(&self) {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Producer writing every unit into one [`SharedBuffer`].
#[derive(Debug)]
pub struct InMemoryProducer {
    sink: SharedBuffer,
    eom: Vec<u8>,
    eop: Vec<u8>,
    channel: Option<OutputChannel>,
    units: Vec<Option<String>>,
    closed: bool,
}

impl InMemoryProducer {
    pub fn new(eom: &[u8], eop: &[u8]) -> Self {
        Self {
            sink: SharedBuffer::new(),
            eom: eom.to_vec(),
            eop: eop.to_vec(),
            channel: None,
            units: Vec::new(),
            closed: false,
        }
    }

    /// Handle on the bytes written so far; stays valid after the producer
    /// is moved into a stage.
    pub fn sink(&self) -> SharedBuffer {
        self.sink.clone()
    }

    /// Names of the units seen by `begin_unit`, in order.
    pub fn units(&self) -> &[Option<String>] {
        &self.units
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Producer for InMemoryProducer {
    fn id(&self) -> &str {
        "memory"
    }

    fn begin_unit(&mut self, unit: Option<&UnitInfo>) -> Result<(), StageError> {
        self.units.push(unit.map(|u| u.name.clone()));
        if self.channel.is_none() {
            self.channel = Some(OutputChannel::new(
                "memory",
                Box::new(self.sink.clone()),
                &self.eom,
                &self.eop,
            ));
        }
        Ok(())
    }

    fn channel(&mut self) -> Option<&mut OutputChannel> {
        self.channel.as_mut()
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        self.closed = true;
        match self.channel.take() {
            Some(channel) => channel.close().map_err(AggregateError::single),
            None => Ok(()),
        }
    }
}

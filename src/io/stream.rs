//! Standard input/output backends.
//!
//! Both bind once and never rotate: the stream is a single unit of work.

use std::io;

use super::{Advance, Consumer, Producer, UnitInfo};
use crate::channel::{InputChannel, OutputChannel};
use crate::error::{AggregateError, StageError};

#[derive(Debug)]
pub struct StreamConsumer {
    eom: Vec<u8>,
    channel: Option<InputChannel>,
    bound: bool,
}

impl StreamConsumer {
    pub fn new(eom: &[u8]) -> Self {
        Self {
            eom: eom.to_vec(),
            channel: None,
            bound: false,
        }
    }
}

impl Consumer for StreamConsumer {
    fn id(&self) -> &str {
        "stream"
    }

    fn advance(&mut self) -> Result<Advance, StageError> {
        if self.bound {
            self.channel = None;
            return Ok(Advance::Done);
        }
        self.bound = true;
        self.channel = Some(InputChannel::from_stdin(&self.eom));
        Ok(Advance::Unit)
    }

    fn channel(&mut self) -> Option<&mut InputChannel> {
        self.channel.as_mut()
    }

    fn current_unit(&self) -> Option<&UnitInfo> {
        None
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        self.channel = None;
        Ok(())
    }
}

#[derive(Debug)]
pub struct StreamProducer {
    eom: Vec<u8>,
    eop: Vec<u8>,
    channel: Option<OutputChannel>,
}

impl StreamProducer {
    pub fn new(eom: &[u8], eop: &[u8]) -> Self {
        Self {
            eom: eom.to_vec(),
            eop: eop.to_vec(),
            channel: None,
        }
    }
}

impl Producer for StreamProducer {
    fn id(&self) -> &str {
        "stream"
    }

    fn begin_unit(&mut self, _unit: Option<&UnitInfo>) -> Result<(), StageError> {
        if self.channel.is_none() {
            self.channel = Some(OutputChannel::new(
                "<stdout>",
                Box::new(io::stdout()),
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
        match self.channel.take() {
            Some(channel) => channel.close().map_err(AggregateError::single),
            None => Ok(()),
        }
    }
}


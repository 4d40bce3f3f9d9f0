//! Source and destination backends.
//!
//! This module provides:
//! - `Consumer`: Trait for sources that advance over units of work
//! - `Producer`: Trait for destinations that mirror the consumer's units
//! - Local-file, standard stream and distributed-filesystem implementations
//! - In-memory implementations for testing

mod file;
mod hdfs;
mod memory;
mod stream;

use std::fmt;
use std::path::{Path, PathBuf};

pub use file::{FileConsumer, FileProducer};
pub use hdfs::{HdfsConsumer, HdfsProducer};
pub use memory::{InMemoryConsumer, InMemoryProducer, SharedBuffer};
pub use stream::{StreamConsumer, StreamProducer};

use crate::channel::{InputChannel, Liveness, OutputChannel};
use crate::error::{AggregateError, Phase, StageError, UnitError};
use crate::message::Message;

/// Describes the current unit of work of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    /// File name, without directory
    pub name: String,
    /// Directory of the unit (the remote one for staged files)
    pub directory: PathBuf,
    /// Local path the channel is reading
    pub full_path: PathBuf,
    /// Remote location, for units staged from the distributed filesystem
    pub remote_path: Option<PathBuf>,
}

impl UnitInfo {
    pub fn local(path: &Path) -> Self {
        Self {
            name: file_name(path),
            directory: parent_dir(path),
            full_path: path.to_path_buf(),
            remote_path: None,
        }
    }

    pub fn staged(remote: &Path, local: &Path) -> Self {
        Self {
            name: file_name(remote),
            directory: parent_dir(remote),
            full_path: local.to_path_buf(),
            remote_path: Some(remote.to_path_buf()),
        }
    }

    /// Name without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Outcome of [`Consumer::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A new unit is open; read it through [`Consumer::channel`]
    Unit,
    /// No units remain
    Done,
}

pub trait Consumer: Send + fmt::Debug {
    fn id(&self) -> &str;

    /// Close the current unit and open the next one.
    ///
    /// `StageError::Unit` means that unit was skipped and the caller may
    /// advance again; any other error ends the run.
    fn advance(&mut self) -> Result<Advance, StageError>;

    fn channel(&mut self) -> Option<&mut InputChannel>;

    fn current_unit(&self) -> Option<&UnitInfo>;

    fn is_readable(&mut self) -> Result<Liveness, StageError> {
        match self.channel() {
            Some(channel) => channel.is_readable(),
            None => Ok(Liveness::Unknown),
        }
    }

    /// Release the current unit. Safe to call more than once.
    fn close(&mut self) -> Result<(), AggregateError>;
}

pub trait Producer: Send + fmt::Debug {
    fn id(&self) -> &str;

    /// Point the producer at the output matching `unit`.
    fn begin_unit(&mut self, unit: Option<&UnitInfo>) -> Result<(), StageError>;

    fn channel(&mut self) -> Option<&mut OutputChannel>;

    /// Path of the current output file, if the destination is file-backed.
    fn current_destination(&self) -> Option<&Path> {
        None
    }

    fn write(&mut self, message: Message) -> Result<(), StageError> {
        self.bound_channel()?.write(message);
        Ok(())
    }

    fn write_all(&mut self, messages: Vec<Message>) -> Result<(), StageError> {
        self.bound_channel()?.write_all(messages);
        Ok(())
    }

    fn flush(&mut self) -> Result<usize, StageError> {
        self.bound_channel()?.flush()
    }

    fn discard(&mut self) -> usize {
        self.channel().map(OutputChannel::discard).unwrap_or(0)
    }

    fn signal_end_of_process(&mut self) -> Result<(), StageError> {
        match self.channel() {
            Some(channel) => channel.signal_end_of_process(),
            None => Ok(()),
        }
    }

    /// Flush and release the current output. Safe to call more than once.
    fn close(&mut self) -> Result<(), AggregateError>;

    #[doc(hidden)]
    fn bound_channel(&mut self) -> Result<&mut OutputChannel, StageError> {
        let id = self.id().to_string();
        self.channel().ok_or_else(|| {
            StageError::Unit(UnitError::new(
                Phase::Write,
                id,
                "no output is open (begin_unit was not called)",
            ))
        })
    }
}

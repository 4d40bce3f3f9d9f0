//! Error types for stage execution.
//!
//! This module provides:
//! - `Phase`: Indicates where in a unit's lifecycle an error occurred
//! - `UnitError`: A single backend error with context
//! - `AggregateError`: A collection of errors gathered during teardown
//! - `StageError`: The top-level error returned by configuration and `Stage::run`

use std::fmt;

use thiserror::Error;

use crate::message::MessageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configure,
    /// Enumerating the units of work (directory or remote listing)
    List,
    Open,
    /// Staging a remote file to a local copy
    Fetch,
    Read,
    Decode,
    Encode,
    Transform,
    Write,
    /// Moving a staged output file to remote storage
    Relocate,
    Close,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Configure => write!(f, "Configure"),
            Phase::List => write!(f, "List"),
            Phase::Open => write!(f, "Open"),
            Phase::Fetch => write!(f, "Fetch"),
            Phase::Read => write!(f, "Read"),
            Phase::Decode => write!(f, "Decode"),
            Phase::Encode => write!(f, "Encode"),
            Phase::Transform => write!(f, "Transform"),
            Phase::Write => write!(f, "Write"),
            Phase::Relocate => write!(f, "Relocate"),
            Phase::Close => write!(f, "Close"),
        }
    }
}

#[derive(Debug)]
pub struct UnitError {
    /// Phase in which the error occurred
    pub phase: Phase,
    /// Identifier of the target (file path, remote path, "<stdin>", ...)
    pub target: String,
    /// The underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl UnitError {
    pub fn new(
        phase: Phase,
        target: impl Into<String>,
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            phase,
            target: target.into(),
            error: error.into(),
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.phase, self.target, self.error)
    }
}

impl std::error::Error for UnitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// An aggregate of backend errors.
///
/// Teardown closes every backend even when one of them fails, so the
/// individual failures are collected here instead of short-circuiting.
#[derive(Debug, Error)]
pub struct AggregateError {
    /// Collection of individual errors
    pub errors: Vec<UnitError>,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stage teardown encountered {} error(s):", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            writeln!(f, "  #{}: {}", i + 1, e)?;
        }
        Ok(())
    }
}

impl AggregateError {
    /// Create a new aggregate error with a single error.
    pub fn single(error: UnitError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Turn a list of collected errors into a result.
    pub fn check(errors: Vec<UnitError>) -> Result<(), AggregateError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AggregateError { errors })
        }
    }

    /// Check if there are no errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl From<UnitError> for AggregateError {
    fn from(error: UnitError) -> Self {
        Self::single(error)
    }
}

/// Top-level stage error.
///
/// `Unit` only ends the current unit of work: the orchestrator logs it and
/// advances. Every other variant ends the run.
#[derive(Debug, Error)]
pub enum StageError {
    /// Invalid flag combination or unreadable stage settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command-line parsing failed (or help/version was requested)
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("{0}")]
    Unit(UnitError),

    #[error("{0}")]
    Fatal(UnitError),

    /// A buffered message could not be encoded for output
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("Interrupted by signal {0}")]
    Interrupted(i32),
}

impl StageError {
    pub fn config(message: impl Into<String>) -> Self {
        StageError::Config(message.into())
    }

    /// Whether the error only affects the current unit of work.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(self, StageError::Unit(_))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            StageError::Usage(e) => e.exit_code(),
            _ => 1,
        }
    }
}

#[cfg(feature = "miette")]
mod miette_impl;

#[cfg(feature = "miette")]
pub use miette_impl::*;

//! Miette integration for pretty error reporting.

use miette::{Diagnostic, Severity};
use thiserror::Error;

use super::{AggregateError, Phase, StageError, UnitError};

/// A diagnostic wrapper for stage errors compatible with miette.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct StageDiagnostic {
    /// The error message
    pub message: String,

    #[source]
    /// The underlying error source
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,

    #[help]
    /// Help text for the user
    pub help: Option<String>,

    #[diagnostic(severity)]
    /// Severity level
    pub severity: Severity,
}

fn help_for(phase: Phase) -> &'static str {
    match phase {
        Phase::List | Phase::Open => "Check the input directory and the file list",
        Phase::Fetch | Phase::Relocate => "Check that the hadoop client is installed and the remote path exists",
        Phase::Decode | Phase::Encode => "Check the message codec and the delimiters (-e/-E)",
        _ => "Check the stage arguments",
    }
}

impl From<UnitError> for StageDiagnostic {
    fn from(e: UnitError) -> Self {
        StageDiagnostic {
            message: format!("[{}] on '{}'", e.phase, e.target),
            help: Some(help_for(e.phase).into()),
            source: Some(e.error),
            severity: Severity::Error,
        }
    }
}

impl From<StageError> for StageDiagnostic {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Unit(unit) => {
                let mut diag = StageDiagnostic::from(unit);
                diag.severity = Severity::Warning;
                diag
            }
            StageError::Fatal(unit) => StageDiagnostic::from(unit),
            StageError::Config(message) => StageDiagnostic {
                message,
                source: None,
                help: Some("Run the stage with --help to see the accepted flags".into()),
                severity: Severity::Error,
            },
            other => StageDiagnostic {
                message: other.to_string(),
                source: None,
                help: None,
                severity: Severity::Error,
            },
        }
    }
}

impl From<AggregateError> for StageDiagnostic {
    fn from(agg: AggregateError) -> Self {
        let count = agg.len();
        match agg.errors.into_iter().next() {
            Some(first) => {
                let mut diag = StageDiagnostic::from(first);
                if count > 1 {
                    diag.message = format!("{} (and {} more)", diag.message, count - 1);
                }
                diag
            }
            None => StageDiagnostic {
                message: "Unknown teardown error".into(),
                source: None,
                help: None,
                severity: Severity::Error,
            },
        }
    }
}

impl From<AggregateError> for miette::Report {
    fn from(agg: AggregateError) -> Self {
        miette::Report::new(StageDiagnostic::from(agg))
    }
}

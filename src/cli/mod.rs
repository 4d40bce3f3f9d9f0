//! Command-line surface shared by every stage binary.
//!
//! `StageArgs` can be flattened into a stage's own `clap` parser, or parsed
//! directly with [`try_parse_from`].
//!
//! # Example
//!
//! ```rust,ignore
//! use clap::Parser;
//! use stageio::cli::StageArgs;
//!
//! #[derive(Parser)]
//! struct Cli {
//!     #[command(flatten)]
//!     stage: StageArgs,
//!
//!     /// Stage-specific flag
//!     #[arg(long)]
//!     dry_run: bool,
//! }
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, CommandFactory, FromArgMatches, Parser};

use crate::config::{BackendKind, Mode};

#[derive(Debug, Clone, Default, Args)]
pub struct StageArgs {
    /// Operating mode: f (file), s (stream) or m (map-reduce)
    #[arg(short, long, value_enum, default_value = "f")]
    pub mode: Mode,

    /// Source backend: f (local file), s (stdin) or h (HDFS)
    #[arg(short, long, value_enum)]
    pub source: Option<BackendKind>,

    /// Destination backend: f (local file), s (stdout) or h (HDFS)
    #[arg(short, long, value_enum)]
    pub dest: Option<BackendKind>,

    /// Directory holding the input files
    #[arg(short, long, value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Output directory; relative values are resolved against each input file's directory
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Read from and write to HDFS (same as `-s h -d h`)
    #[arg(long)]
    pub hdfs: bool,

    /// End-of-message marker; escapes such as \n, \t and \0 are accepted
    #[arg(short = 'e', long = "end-of-message", value_name = "STR", allow_hyphen_values = true)]
    pub eom: Option<String>,

    /// End-of-process marker; escapes such as \n, \t and \0 are accepted
    #[arg(short = 'E', long = "end-of-process", value_name = "STR", allow_hyphen_values = true)]
    pub eop: Option<String>,

    /// Stage-specific settings file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Forward input messages unprocessed, marked incomplete
    #[arg(long)]
    pub skip: bool,

    /// Log filter used when STAGEIO_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Input files; the whole input directory is used when omitted
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(about = "Run a pipeline stage over delimited messages")]
struct StageCli {
    #[command(flatten)]
    args: StageArgs,
}

/// Parse stage arguments; `args` includes the program name.
pub fn try_parse_from<I, T>(bin_name: &str, args: I) -> Result<StageArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = StageCli::command()
        .bin_name(bin_name)
        .try_get_matches_from(args)?;
    StageCli::from_arg_matches(&matches).map(|cli| cli.args)
}

#[cfg(feature = "sarge")]
mod sarge;

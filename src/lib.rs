//! # stageio
//!
//! Runtime for ETL pipeline stages: programs that read a sequence of
//! delimited records, transform each one and emit new records for the next
//! stage.
//!
//! ## Overview
//!
//! stageio provides:
//! - **Messages**: JSON and TTL codecs plus user-defined ones, with an
//!   out-of-band "incomplete" marker
//! - **Delimited channels**: configurable end-of-message and end-of-process
//!   markers over files, pipes and in-memory buffers
//! - **Backends**: local files, stdin/stdout, and HDFS through the
//!   `hadoop fs` client with local staging
//! - **Orchestration**: a per-message loop that flushes or discards the
//!   output of each record and always releases its backends
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stageio::{Codec, Message, StageContext, TransformError};
//!
//! fn mark(message: &Message, ctx: &StageContext<'_>) -> Result<Vec<Message>, TransformError> {
//!     let mut value = message.json().cloned().ok_or("not a JSON record")?;
//!     value["seen"] = true.into();
//!     Ok(vec![ctx.message(value)])
//! }
//!
//! fn main() {
//!     stageio::run_main("mark", Codec::Json, Codec::Json, mark)
//! }
//! ```
//!
//! ## Modes
//!
//! | mode | source | dest | EOM | EOP |
//! |---|---|---|---|---|
//! | `f` | local files | local files | `\n` | (none) |
//! | `s` | stdin | stdout | `\n` | `\0` |
//! | `m` | stdin | stdout | `\n` | (none) |
//!
//! `-s`/`-d` override the mode's backends and `--hdfs` forces both to HDFS.
//! In file mode the end-of-process marker follows each input file, in the
//! other modes it follows each input record.
//!
//! ## Features
//!
//! - `toml` - TOML stage settings files (enabled by default)
//! - `yaml` - YAML stage settings files (enabled by default)
//! - `miette` - Pretty error reporting with miette
//! - `sarge` - `sarge::ArgumentType` for `Mode` and `BackendKind`

pub mod builder;
pub mod channel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod message;
pub mod remote;
pub mod signal;

// Re-exports for convenience
pub use builder::StageBuilder;
pub use channel::{Frame, Incoming, InputChannel, Liveness, OutputChannel};
pub use cli::StageArgs;
pub use config::{BackendKind, Mode, Settings, StageConfig};
pub use engine::{
    RunReport, Stage, StageContext, StageState, Transform, TransformError, run_stage, transform_fn,
};
pub use error::{AggregateError, Phase, StageError, UnitError};
pub use io::{
    Advance, Consumer, FileConsumer, FileProducer, HdfsConsumer, HdfsProducer, InMemoryConsumer,
    InMemoryProducer, Producer, SharedBuffer, StreamConsumer, StreamProducer, UnitInfo,
};
pub use message::{Codec, Content, CustomCodec, Message, MessageError, MessageKind};
pub use remote::{HadoopCli, RemoteFs};

// Miette re-exports
#[cfg(feature = "miette")]
pub use error::StageDiagnostic;

/// Entry point for stage binaries: run with the process arguments and exit.
///
/// Exits with 0 on success and 1 on configuration errors, unrecoverable
/// run errors or abandoned units.
pub fn run_main<T: Transform>(bin_name: &str, input: Codec, output: Codec, transform: T) -> ! {
    let code = match run_stage(bin_name, std::env::args_os(), input, output, transform) {
        Ok(report) => report.exit_code(),
        Err(StageError::Usage(e)) => e.exit(),
        Err(e) => {
            eprintln!("{bin_name} error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code)
}

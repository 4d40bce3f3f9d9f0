//! Stage configuration: operating mode, backends and delimiters.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use thiserror::Error;

use crate::cli::StageArgs;
use crate::error::StageError;
use crate::remote::DEFAULT_REMOTE_HOME;

/// Default output directory, relative to each input file's directory.
pub const DEFAULT_OUTPUT_DIR: &str = "out";

/// Operating mode of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Mode {
    /// Batch over local files
    #[default]
    #[value(name = "f", alias = "file")]
    File,
    /// Long-lived stream over stdin/stdout
    #[value(name = "s", alias = "stream")]
    Stream,
    /// Distributed batch ("map-reduce"): stdin/stdout, no end-of-process marker by default
    #[value(name = "m", alias = "map-reduce")]
    Batch,
}

/// Kind of source or destination backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum BackendKind {
    #[value(name = "f", alias = "file")]
    File,
    #[value(name = "s", alias = "stream")]
    Stream,
    #[value(name = "h", alias = "hdfs")]
    Distributed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::File => write!(f, "file"),
            Mode::Stream => write!(f, "stream"),
            Mode::Batch => write!(f, "map-reduce"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::File => write!(f, "file"),
            BackendKind::Stream => write!(f, "stream"),
            BackendKind::Distributed => write!(f, "hdfs"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid {what} '{value}' (expected one of: {expected})")]
pub struct ParseKindError {
    what: &'static str,
    value: String,
    expected: &'static str,
}

impl FromStr for Mode {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f" | "file" => Ok(Mode::File),
            "s" | "stream" => Ok(Mode::Stream),
            "m" | "map-reduce" => Ok(Mode::Batch),
            _ => Err(ParseKindError {
                what: "mode",
                value: s.to_string(),
                expected: "f, s, m",
            }),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f" | "file" => Ok(BackendKind::File),
            "s" | "stream" => Ok(BackendKind::Stream),
            "h" | "hdfs" => Ok(BackendKind::Distributed),
            _ => Err(ParseKindError {
                what: "backend",
                value: s.to_string(),
                expected: "f, s, h",
            }),
        }
    }
}

/// Wiring a mode implies unless flags override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDefaults {
    pub source: BackendKind,
    pub dest: BackendKind,
    pub eom: &'static [u8],
    pub eop: &'static [u8],
}

impl Mode {
    pub fn defaults(self) -> ModeDefaults {
        match self {
            Mode::File => ModeDefaults {
                source: BackendKind::File,
                dest: BackendKind::File,
                eom: b"\n",
                eop: b"",
            },
            Mode::Stream => ModeDefaults {
                source: BackendKind::Stream,
                dest: BackendKind::Stream,
                eom: b"\n",
                eop: b"\0",
            },
            Mode::Batch => ModeDefaults {
                source: BackendKind::Stream,
                dest: BackendKind::Stream,
                eom: b"\n",
                eop: b"",
            },
        }
    }
}

/// Fully resolved stage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub mode: Mode,
    pub source: BackendKind,
    pub dest: BackendKind,
    pub input_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// End-of-message delimiter; empty means one frame per channel
    pub eom: Vec<u8>,
    /// End-of-process marker
    pub eop: Vec<u8>,
    /// Explicit input files (local or remote paths)
    pub files: Vec<PathBuf>,
    /// Stage settings file handed to the transform
    pub config_file: Option<PathBuf>,
    /// Forward input unchanged, marked incomplete
    pub skip: bool,
}

impl StageConfig {
    /// Configuration with the defaults of `mode` and no inputs.
    pub fn new(mode: Mode) -> Self {
        let defaults = mode.defaults();
        Self {
            mode,
            source: defaults.source,
            dest: defaults.dest,
            input_dir: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            eom: defaults.eom.to_vec(),
            eop: defaults.eop.to_vec(),
            files: Vec::new(),
            config_file: None,
            skip: false,
        }
    }

    /// Resolve command-line arguments against the mode defaults and validate.
    ///
    /// `--hdfs` wins over `--source/--dest`, which win over the mode.
    pub fn from_args(args: &StageArgs) -> Result<Self, StageError> {
        let defaults = args.mode.defaults();
        let (source, dest) = if args.hdfs {
            (BackendKind::Distributed, BackendKind::Distributed)
        } else {
            (
                args.source.unwrap_or(defaults.source),
                args.dest.unwrap_or(defaults.dest),
            )
        };

        let eom = match &args.eom {
            Some(raw) => unescape(raw)?,
            None => defaults.eom.to_vec(),
        };
        let eop = match &args.eop {
            Some(raw) => unescape(raw)?,
            None if eom.is_empty() => b"\n".to_vec(),
            None => defaults.eop.to_vec(),
        };

        let input_dir = match (&args.input_dir, source) {
            (Some(dir), _) => Some(dir.clone()),
            (None, BackendKind::File) if !args.files.is_empty() => Some(PathBuf::from(".")),
            (None, BackendKind::Distributed) => Some(PathBuf::from(DEFAULT_REMOTE_HOME)),
            _ => None,
        };

        let config = Self {
            mode: args.mode,
            source,
            dest,
            input_dir,
            output_dir: args
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            eom,
            eop,
            files: args.files.clone(),
            config_file: args.config.clone(),
            skip: args.skip,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject flag combinations the backends cannot honour.
    pub fn validate(&self) -> Result<(), StageError> {
        if self.mode == Mode::Batch
            && (self.source == BackendKind::File || self.dest == BackendKind::File)
        {
            return Err(StageError::config(
                "File source/destination is not allowed in map-reduce mode",
            ));
        }
        if self.eom.is_empty() && self.source == BackendKind::Stream {
            return Err(StageError::config(
                "Empty end-of-message marker is not allowed with the stream source",
            ));
        }
        if self.source == BackendKind::File && self.files.is_empty() && self.input_dir.is_none() {
            return Err(StageError::config("No input files specified"));
        }
        Ok(())
    }

    /// Whether the end-of-process marker follows each unit (file mode)
    /// rather than each input record.
    pub fn eop_per_unit(&self) -> bool {
        self.mode == Mode::File
    }
}

/// Decode `\n`, `\t`, `\r`, `\0`, `\\` and `\xHH` escapes.
pub fn unescape(raw: &str) -> Result<Vec<u8>, StageError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = (hex.len() == 2)
                    .then(|| u8::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .ok_or_else(|| {
                        StageError::config(format!("Invalid \\x escape '\\x{hex}' in '{raw}'"))
                    })?;
                out.push(byte);
            }
            Some(other) => {
                return Err(StageError::config(format!(
                    "Unknown escape sequence '\\{other}' in '{raw}'"
                )));
            }
            None => {
                return Err(StageError::config(format!("Dangling backslash in '{raw}'")));
            }
        }
    }
    Ok(out)
}

//! Access to the distributed filesystem.
//!
//! The distributed backends only need four operations, expressed by the
//! `RemoteFs` trait. `HadoopCli` implements them by running the external
//! `hadoop fs` client.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

/// Default remote home directory, used as the input directory of the
/// distributed source and as the base of temporary output directories.
pub const DEFAULT_REMOTE_HOME: &str = "/user/DKB/";

/// Environment variable overriding the hadoop client program.
pub const HADOOP_ENV: &str = "STAGEIO_HADOOP";

pub trait RemoteFs: Send + Sync + fmt::Debug {
    /// Base names of the plain files in `dir`, sorted.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Copy `remote` to the local path `local`.
    fn get(&self, remote: &Path, local: &Path) -> io::Result<()>;

    /// Copy the local file `local` to `remote`.
    fn put(&self, local: &Path, remote: &Path) -> io::Result<()>;

    /// Create `dir` and its parents.
    fn mkdirs(&self, dir: &Path) -> io::Result<()>;
}

/// `RemoteFs` backed by the `hadoop fs` command line client.
#[derive(Debug, Clone)]
pub struct HadoopCli {
    program: PathBuf,
    base_args: Vec<String>,
}

impl Default for HadoopCli {
    fn default() -> Self {
        Self::new("hadoop")
    }
}

impl HadoopCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: vec!["fs".to_string()],
        }
    }

    /// Client named by `STAGEIO_HADOOP`, or `hadoop` from `PATH`.
    pub fn from_env() -> Self {
        match std::env::var_os(HADOOP_ENV) {
            Some(program) if !program.is_empty() => Self::new(program),
            _ => Self::default(),
        }
    }

    /// Replace the arguments placed before each command (default `fs`).
    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[&OsStr]) -> io::Result<Vec<u8>> {
        let rendered = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(program = %self.program.display(), args = %rendered, "Running hadoop command");

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let cause = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("no output");
        Err(io::Error::other(format!(
            "`{} {} {}` failed ({}): {}",
            self.program.display(),
            self.base_args.join(" "),
            rendered,
            output.status,
            cause.trim()
        )))
    }
}

impl RemoteFs for HadoopCli {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<String>> {
        let out = self.run(&[OsStr::new("-ls"), dir.as_os_str()])?;
        Ok(parse_listing(&String::from_utf8_lossy(&out)))
    }

    fn get(&self, remote: &Path, local: &Path) -> io::Result<()> {
        self.run(&[OsStr::new("-get"), remote.as_os_str(), local.as_os_str()])
            .map(drop)
    }

    fn put(&self, local: &Path, remote: &Path) -> io::Result<()> {
        self.run(&[OsStr::new("-put"), local.as_os_str(), remote.as_os_str()])
            .map(drop)
    }

    fn mkdirs(&self, dir: &Path) -> io::Result<()> {
        self.run(&[OsStr::new("-mkdir"), OsStr::new("-p"), dir.as_os_str()])
            .map(drop)
    }
}

/// Extract plain file base names from `hadoop fs -ls` output.
///
/// Entry lines have eight whitespace-separated fields, the last one being
/// the path (which may itself contain spaces). Lines starting with `-` are
/// files, `d` directories; summary lines and directories are skipped.
pub fn parse_listing(output: &str) -> Vec<String> {
    let mut names: Vec<String> = output
        .lines()
        .filter(|line| line.starts_with('-'))
        .filter_map(|line| split_fields(line, 8).get(7).copied())
        .filter_map(|path| {
            let name = path.rsplit('/').next().unwrap_or(path);
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect();
    names.sort();
    names
}

/// Split on whitespace into at most `n` fields; the last keeps its spaces.
fn split_fields(line: &str, n: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        if fields.len() + 1 == n {
            fields.push(rest.trim_end());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }
    fields
}

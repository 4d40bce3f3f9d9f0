//! Local-file consumer and producer.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Advance, Consumer, Producer, UnitInfo};
use crate::channel::{InputChannel, OutputChannel};
use crate::error::{AggregateError, Phase, StageError, UnitError};

/// Reads an explicit file list, or every matching file of a directory.
#[derive(Debug)]
pub struct FileConsumer {
    input_dir: Option<PathBuf>,
    files: Vec<PathBuf>,
    extension: String,
    eom: Vec<u8>,
    queue: Option<VecDeque<PathBuf>>,
    channel: Option<InputChannel>,
    unit: Option<UnitInfo>,
}

impl FileConsumer {
    /// `files` are joined to `input_dir` when both are given. Without files,
    /// `input_dir` is listed for names ending in `extension` (case-insensitive).
    pub fn new(input_dir: Option<PathBuf>, files: Vec<PathBuf>, extension: &str, eom: &[u8]) -> Self {
        Self {
            input_dir,
            files,
            extension: extension.to_ascii_lowercase(),
            eom: eom.to_vec(),
            queue: None,
            channel: None,
            unit: None,
        }
    }

    fn resolve_inputs(&self) -> Result<VecDeque<PathBuf>, StageError> {
        if !self.files.is_empty() {
            return Ok(self
                .files
                .iter()
                .map(|f| match &self.input_dir {
                    Some(dir) => dir.join(f),
                    None => f.clone(),
                })
                .collect());
        }
        let dir = self.input_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let files = list_dir(&dir, &self.extension)
            .map_err(|e| StageError::Fatal(UnitError::new(Phase::List, dir.display().to_string(), e)))?;
        info!(dir = %dir.display(), count = files.len(), "Listed input files");
        Ok(files.into())
    }
}

fn list_dir(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if entry.file_type()?.is_file() && name.ends_with(extension) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

impl Consumer for FileConsumer {
    fn id(&self) -> &str {
        "file"
    }

    fn advance(&mut self) -> Result<Advance, StageError> {
        self.channel = None;
        self.unit = None;
        if self.queue.is_none() {
            self.queue = Some(self.resolve_inputs()?);
        }
        let Some(path) = self.queue.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(Advance::Done);
        };

        let target = path.display().to_string();
        let file = File::open(&path).map_err(|e| StageError::Unit(UnitError::new(Phase::Open, target.clone(), e)))?;
        let channel = InputChannel::from_file(target.clone(), file, &self.eom)
            .map_err(|e| StageError::Unit(UnitError::new(Phase::Open, target.clone(), e)))?;
        debug!(source = %target, "Opened input file");
        self.channel = Some(channel);
        self.unit = Some(UnitInfo::local(&path));
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

/// Whether `dir` names a fixed location rather than one relative to the
/// input file's directory.
pub(crate) fn is_fixed_dir(dir: &Path) -> bool {
    let s = dir.to_string_lossy();
    dir.is_absolute()
        || s == "."
        || s == ".."
        || s.starts_with("./")
        || s.starts_with("../")
}

/// Output file name for `unit`: its stem with `extension`, or the current
/// unix timestamp when there is no input unit.
pub(crate) fn output_file_name(unit: Option<&UnitInfo>, extension: &str) -> String {
    match unit {
        Some(unit) => format!("{}{}", unit.stem(), extension),
        None => format!("{}{}", chrono::Utc::now().timestamp(), extension),
    }
}

/// Writes one output file per input unit.
///
/// Consecutive units mapping to the same output path share one open file.
/// An existing file is never overwritten.
#[derive(Debug)]
pub struct FileProducer {
    output_dir: PathBuf,
    extension: String,
    eom: Vec<u8>,
    eop: Vec<u8>,
    channel: Option<OutputChannel>,
    current: Option<PathBuf>,
}

impl FileProducer {
    pub fn new(output_dir: PathBuf, extension: &str, eom: &[u8], eop: &[u8]) -> Self {
        Self {
            output_dir,
            extension: extension.to_string(),
            eom: eom.to_vec(),
            eop: eop.to_vec(),
            channel: None,
            current: None,
        }
    }

    /// Directory the output for `unit` goes to.
    pub fn output_dir_for(&self, unit: Option<&UnitInfo>) -> PathBuf {
        if is_fixed_dir(&self.output_dir) {
            return self.output_dir.clone();
        }
        match unit {
            Some(unit) => unit.directory.join(&self.output_dir),
            None => Path::new(".").join(&self.output_dir),
        }
    }

    fn finish_current(&mut self) -> Result<(), UnitError> {
        self.current = None;
        match self.channel.take() {
            Some(channel) => channel.close(),
            None => Ok(()),
        }
    }
}

impl Producer for FileProducer {
    fn id(&self) -> &str {
        "file"
    }

    fn begin_unit(&mut self, unit: Option<&UnitInfo>) -> Result<(), StageError> {
        let dir = self.output_dir_for(unit);
        let path = dir.join(output_file_name(unit, &self.extension));
        if self.current.as_deref() == Some(path.as_path()) {
            debug!(dest = %path.display(), "Reusing open output file");
            return Ok(());
        }
        self.finish_current().map_err(StageError::Unit)?;

        let target = path.display().to_string();
        let open_error = |e: io::Error| StageError::Unit(UnitError::new(Phase::Open, target.clone(), e));
        if path.exists() {
            return Err(open_error(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "File already exists",
            )));
        }
        fs::create_dir_all(&dir).map_err(open_error)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(open_error)?;
        info!(dest = %target, "Opened output file");
        self.channel = Some(OutputChannel::new(
            target.clone(),
            Box::new(BufWriter::new(file)),
            &self.eom,
            &self.eop,
        ));
        self.current = Some(path);
        Ok(())
    }

    fn channel(&mut self) -> Option<&mut OutputChannel> {
        self.channel.as_mut()
    }

    fn current_destination(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        self.finish_current().map_err(AggregateError::single)
    }
}

//! Distributed-filesystem consumer and producer.
//!
//! Remote files are staged through a process-local temporary directory:
//! the consumer fetches each input before reading it, the producer writes
//! locally and relocates the file when the output rotates or closes. Every
//! local copy is removed on every exit path.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use super::file::output_file_name;
use super::{Advance, Consumer, Producer, UnitInfo, file_name};
use crate::channel::{InputChannel, OutputChannel};
use crate::error::{AggregateError, Phase, StageError, UnitError};
use crate::remote::{DEFAULT_REMOTE_HOME, RemoteFs};

/// Local copy of a remote file, removed at the latest when dropped.
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
    removed: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self { path, removed: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn remove(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.removed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
        }
    }
}

fn staging_dir() -> Result<TempDir, StageError> {
    tempfile::Builder::new()
        .prefix("stageio-")
        .tempdir()
        .map_err(|e| StageError::Fatal(UnitError::new(Phase::Configure, "staging directory", e)))
}

fn closed_error(id: &str) -> StageError {
    StageError::Fatal(UnitError::new(Phase::Open, id, "backend is already closed"))
}

/// Reads remote files by staging each one to a local temporary copy.
pub struct HdfsConsumer {
    remote: Arc<dyn RemoteFs>,
    input_dir: Option<PathBuf>,
    files: Vec<PathBuf>,
    names: Option<Box<dyn BufRead + Send>>,
    eom: Vec<u8>,
    staging: Option<TempDir>,
    queue: Option<VecDeque<PathBuf>>,
    channel: Option<InputChannel>,
    unit: Option<UnitInfo>,
    staged: Option<StagedFile>,
    fetched: usize,
}

impl std::fmt::Debug for HdfsConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdfsConsumer")
            .field("remote", &self.remote)
            .field("input_dir", &self.input_dir)
            .field("files", &self.files)
            .field("names_from_reader", &self.names.is_some())
            .field("staging", &self.staging_path())
            .field("unit", &self.unit)
            .finish()
    }
}

impl HdfsConsumer {
    pub fn new(
        remote: Arc<dyn RemoteFs>,
        input_dir: Option<PathBuf>,
        files: Vec<PathBuf>,
        eom: &[u8],
    ) -> Result<Self, StageError> {
        Ok(Self {
            remote,
            input_dir,
            files,
            names: None,
            eom: eom.to_vec(),
            staging: Some(staging_dir()?),
            queue: None,
            channel: None,
            unit: None,
            staged: None,
            fetched: 0,
        })
    }

    /// Take remote file names from `names`, one per line, instead of the
    /// file list or a directory listing.
    pub fn with_names(mut self, names: Box<dyn BufRead + Send>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn staging_path(&self) -> Option<&Path> {
        self.staging.as_ref().map(TempDir::path)
    }

    fn remote_path(&self, name: &Path) -> PathBuf {
        match &self.input_dir {
            Some(dir) => dir.join(name),
            None => name.to_path_buf(),
        }
    }

    fn resolve_inputs(&self) -> Result<VecDeque<PathBuf>, StageError> {
        if !self.files.is_empty() {
            return Ok(self.files.iter().map(|f| self.remote_path(f)).collect());
        }
        let dir = self
            .input_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REMOTE_HOME));
        let names = self
            .remote
            .list_files(&dir)
            .map_err(|e| StageError::Fatal(UnitError::new(Phase::List, dir.display().to_string(), e)))?;
        let files: VecDeque<PathBuf> = names.iter().map(|name| dir.join(name)).collect();
        info!(dir = %dir.display(), count = files.len(), "Listed remote input files");
        Ok(files)
    }

    fn next_remote(&mut self) -> Result<Option<PathBuf>, StageError> {
        if let Some(names) = self.names.as_mut() {
            let mut line = String::new();
            loop {
                line.clear();
                let read = names
                    .read_line(&mut line)
                    .map_err(|e| StageError::Fatal(UnitError::new(Phase::List, "<stdin>", e)))?;
                if read == 0 {
                    return Ok(None);
                }
                let name = line.trim();
                if !name.is_empty() {
                    return Ok(Some(self.remote_path(Path::new(name))));
                }
            }
        }
        if self.queue.is_none() {
            self.queue = Some(self.resolve_inputs()?);
        }
        Ok(self.queue.as_mut().and_then(VecDeque::pop_front))
    }

    fn release_unit(&mut self) -> Result<(), UnitError> {
        self.channel = None;
        let unit = self.unit.take();
        match self.staged.take() {
            Some(mut staged) => staged.remove().map_err(|e| {
                let target = unit.map(|u| u.full_path).unwrap_or_else(|| staged.path().to_path_buf());
                UnitError::new(Phase::Close, target.display().to_string(), e)
            }),
            None => Ok(()),
        }
    }
}

impl Consumer for HdfsConsumer {
    fn id(&self) -> &str {
        "hdfs"
    }

    fn advance(&mut self) -> Result<Advance, StageError> {
        if let Err(e) = self.release_unit() {
            warn!(error = %e, "Failed to release previous unit");
        }
        let Some(remote) = self.next_remote()? else {
            return Ok(Advance::Done);
        };
        let staging = self.staging.as_ref().ok_or_else(|| closed_error("hdfs"))?;
        self.fetched += 1;
        let local = staging
            .path()
            .join(format!("{}-{}", self.fetched, file_name(&remote)));

        let target = remote.display().to_string();
        // Dropping the guard on any error below removes partial copies.
        let mut staged = StagedFile::new(local.clone());
        self.remote
            .get(&remote, &local)
            .map_err(|e| StageError::Unit(UnitError::new(Phase::Fetch, target.clone(), e)))?;
        let open_error = |e: io::Error| StageError::Unit(UnitError::new(Phase::Open, target.clone(), e));
        let file = File::open(&local).map_err(open_error)?;
        let channel = InputChannel::from_file(target.clone(), file, &self.eom).map_err(open_error)?;

        // The open descriptor keeps the data readable after the unlink.
        if let Err(e) = staged.remove() {
            debug!(path = %local.display(), error = %e, "Deferring removal of staged file");
        }
        info!(source = %target, "Staged remote file");
        self.staged = Some(staged);
        self.channel = Some(channel);
        self.unit = Some(UnitInfo::staged(&remote, &local));
        Ok(Advance::Unit)
    }

    fn channel(&mut self) -> Option<&mut InputChannel> {
        self.channel.as_mut()
    }

    fn current_unit(&self) -> Option<&UnitInfo> {
        self.unit.as_ref()
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        let mut errors = Vec::new();
        if let Err(e) = self.release_unit() {
            errors.push(e);
        }
        if let Some(dir) = self.staging.take() {
            let path = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                errors.push(UnitError::new(Phase::Close, path, e));
            }
        }
        AggregateError::check(errors)
    }
}

#[derive(Debug)]
struct PendingUpload {
    local: StagedFile,
    remote: PathBuf,
}

/// Writes output files locally and relocates them to remote storage.
#[derive(Debug)]
pub struct HdfsProducer {
    remote: Arc<dyn RemoteFs>,
    output_dir: PathBuf,
    temp_base: PathBuf,
    extension: String,
    eom: Vec<u8>,
    eop: Vec<u8>,
    staging: Option<TempDir>,
    channel: Option<OutputChannel>,
    current: Option<PendingUpload>,
    failures: Vec<UnitError>,
    written: usize,
}

impl HdfsProducer {
    pub fn new(
        remote: Arc<dyn RemoteFs>,
        output_dir: PathBuf,
        extension: &str,
        eom: &[u8],
        eop: &[u8],
    ) -> Result<Self, StageError> {
        let temp_base = Path::new(DEFAULT_REMOTE_HOME)
            .join("temp")
            .join(chrono::Utc::now().timestamp().to_string());
        Ok(Self {
            remote,
            output_dir,
            temp_base,
            extension: extension.to_string(),
            eom: eom.to_vec(),
            eop: eop.to_vec(),
            staging: Some(staging_dir()?),
            channel: None,
            current: None,
            failures: Vec::new(),
            written: 0,
        })
    }

    pub fn staging_path(&self) -> Option<&Path> {
        self.staging.as_ref().map(TempDir::path)
    }

    /// Remote directory the output for `unit` goes to.
    ///
    /// Absolute output directories are used as-is; relative ones are
    /// resolved against the unit's remote directory, or a per-run
    /// temporary directory under the remote home.
    pub fn remote_dir_for(&self, unit: Option<&UnitInfo>) -> PathBuf {
        if self.output_dir.is_absolute() {
            return self.output_dir.clone();
        }
        let base = unit
            .and_then(|u| u.remote_path.as_deref())
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.temp_base.clone());
        base.join(&self.output_dir)
    }

    fn relocate_current(&mut self) -> Result<(), UnitError> {
        let Some(mut upload) = self.current.take() else {
            return Ok(());
        };
        let closed = match self.channel.take() {
            Some(channel) => channel.close(),
            None => Ok(()),
        };
        let target = upload.remote.display().to_string();
        let result = closed.and_then(|()| {
            let dir = upload.remote.parent().unwrap_or(Path::new("/"));
            self.remote
                .mkdirs(dir)
                .and_then(|()| self.remote.put(upload.local.path(), &upload.remote))
                .map_err(|e| UnitError::new(Phase::Relocate, target.clone(), e))
        });
        if let Err(e) = upload.local.remove() {
            warn!(path = %upload.local.path().display(), error = %e, "Failed to remove staged output");
        }
        if result.is_ok() {
            info!(dest = %target, "Relocated output file");
        }
        result
    }
}

impl Producer for HdfsProducer {
    fn id(&self) -> &str {
        "hdfs"
    }

    fn begin_unit(&mut self, unit: Option<&UnitInfo>) -> Result<(), StageError> {
        let name = output_file_name(unit, &self.extension);
        let remote = self.remote_dir_for(unit).join(&name);
        if self.current.as_ref().is_some_and(|c| c.remote == remote) {
            debug!(dest = %remote.display(), "Reusing open output file");
            return Ok(());
        }
        if let Err(e) = self.relocate_current() {
            error!(error = %e, "Failed to relocate output file");
            self.failures.push(e);
        }

        let staging = self.staging.as_ref().ok_or_else(|| closed_error("hdfs"))?;
        self.written += 1;
        let local = staging.path().join(format!("{}-{}", self.written, name));
        let target = remote.display().to_string();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&local)
            .map_err(|e| StageError::Unit(UnitError::new(Phase::Open, target.clone(), e)))?;
        self.channel = Some(OutputChannel::new(
            target,
            Box::new(BufWriter::new(file)),
            &self.eom,
            &self.eop,
        ));
        self.current = Some(PendingUpload {
            local: StagedFile::new(local),
            remote,
        });
        Ok(())
    }

    fn channel(&mut self) -> Option<&mut OutputChannel> {
        self.channel.as_mut()
    }

    fn current_destination(&self) -> Option<&Path> {
        self.current.as_ref().map(|c| c.remote.as_path())
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        let mut errors = std::mem::take(&mut self.failures);
        if let Err(e) = self.relocate_current() {
            errors.push(e);
        }
        if let Some(dir) = self.staging.take() {
            let path = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                errors.push(UnitError::new(Phase::Close, path, e));
            }
        }
        AggregateError::check(errors)
    }
}

//! Runs the external torsion tool and collects the files it leaves behind.
//!
//! The tool never reports through stdout or its exit code alone. A run is
//! judged by files: an error file means the tool failed with the code written
//! in it, otherwise every declared output must exist. Checks happen in that
//! order, and outputs are only read (then removed) once all of them pass.

use log::{debug, error, warn};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::command::ToolOperation;
use crate::config::ToolConfig;
use crate::constants::{
    ERROR_EXTENSION, NAME_EXTENSION, PDB_EXTENSION, TORSION_EXTENSION,
    TRANSFORMED_PDB_EXTENSION, TRANSFORM_META_EXTENSION, UPLOADED_PDB_EXTENSION,
};

/// Starts a formatted command and waits for it to exit
pub trait ToolLauncher: Send + Sync {
    /// Returns `Ok(true)` when the process exited successfully
    fn launch(&self, command: &str) -> io::Result<bool>;
}

/// Production launcher: `sh -c <command>`
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellLauncher;

impl ToolLauncher for ShellLauncher {
    fn launch(&self, command: &str) -> io::Result<bool> {
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()?;
        Ok(status.success())
    }
}

/// Launcher backed by a closure, for substituting a fake tool
pub struct FnLauncher<F>(pub F);

impl<F> ToolLauncher for FnLauncher<F>
where
    F: Fn(&str) -> io::Result<bool> + Send + Sync,
{
    fn launch(&self, command: &str) -> io::Result<bool> {
        (self.0)(command)
    }
}

/// The slice of filesystem access the runner needs
pub trait ArtifactFs: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Production filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl ArtifactFs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// In-memory filesystem shared between a fake tool and the runner
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let mut paths: Vec<PathBuf> = files.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl ArtifactFs for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// File names exchanged with the tool, all derived from a record id
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub work_dir: PathBuf,
    pub error_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(work_dir: impl Into<PathBuf>, error_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            error_dir: error_dir.into(),
        }
    }

    fn in_work_dir(&self, id: &str, extension: &str) -> PathBuf {
        self.work_dir.join(format!("{}{}", id, extension))
    }

    pub fn pdb(&self, id: &str) -> PathBuf {
        self.in_work_dir(id, PDB_EXTENSION)
    }

    pub fn torsions(&self, id: &str) -> PathBuf {
        self.in_work_dir(id, TORSION_EXTENSION)
    }

    pub fn names(&self, id: &str) -> PathBuf {
        self.in_work_dir(id, NAME_EXTENSION)
    }

    pub fn uploaded(&self, id: &str) -> PathBuf {
        self.in_work_dir(id, UPLOADED_PDB_EXTENSION)
    }

    pub fn transform_meta(&self, id: &str) -> PathBuf {
        self.in_work_dir(id, TRANSFORM_META_EXTENSION)
    }

    pub fn transformed_pdb(&self, id: &str) -> PathBuf {
        self.in_work_dir(id, TRANSFORMED_PDB_EXTENSION)
    }

    pub fn error(&self, id: &str) -> PathBuf {
        self.error_dir.join(format!("{}{}", id, ERROR_EXTENSION))
    }

    /// Create both directories if missing
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(&self.error_dir)?;
        Ok(())
    }
}

/// A temporary input file written before the tool starts and removed after it exits
#[derive(Debug, Clone)]
pub struct TempInput {
    pub path: PathBuf,
    pub contents: String,
}

/// Everything the runner needs for one invocation
#[derive(Debug, Clone)]
pub struct ToolJob {
    pub operation: ToolOperation,
    pub input: Option<TempInput>,
    pub error_file: PathBuf,
    /// Outputs that must exist after a clean exit
    pub required: Vec<PathBuf>,
    /// Outputs read and removed when present
    pub optional: Vec<PathBuf>,
}

/// Contents of the outputs produced by a successful run
#[derive(Debug, Default)]
pub struct ToolOutput {
    files: HashMap<PathBuf, String>,
}

impl ToolOutput {
    /// Take ownership of one output's contents
    pub fn take(&mut self, path: &Path) -> Option<String> {
        self.files.remove(path)
    }
}

#[derive(Debug)]
pub enum ToolError {
    /// The process could not be started
    LaunchFailed(io::Error),
    /// The process exited unsuccessfully
    ExitFailure,
    /// The tool wrote an error file; holds its raw contents
    ToolReported(String),
    /// The process exited cleanly but a declared output is absent
    MissingArtifact(PathBuf),
    /// Reading or writing an artifact failed
    Io(PathBuf, io::Error),
    /// The blocking task was cancelled or panicked
    TaskFailed(String),
}

impl ToolError {
    /// Numeric code written by the tool, if it reported one
    pub fn tool_code(&self) -> Option<i64> {
        match self {
            ToolError::ToolReported(contents) => contents.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::LaunchFailed(err) => write!(f, "Failed to launch tool: {}", err),
            ToolError::ExitFailure => write!(f, "Tool exited with failure status"),
            ToolError::ToolReported(contents) => {
                write!(f, "Tool reported error: {}", contents.trim())
            }
            ToolError::MissingArtifact(path) => {
                write!(f, "Tool did not produce '{}'", path.display())
            }
            ToolError::Io(path, err) => write!(f, "I/O error on '{}': {}", path.display(), err),
            ToolError::TaskFailed(msg) => write!(f, "Tool task failed: {}", msg),
        }
    }
}

impl std::error::Error for ToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ToolError::LaunchFailed(err) | ToolError::Io(_, err) => Some(err),
            _ => None,
        }
    }
}

/// Runs tool jobs on the blocking thread pool
#[derive(Clone)]
pub struct ToolRunner {
    tool: ToolConfig,
    launcher: Arc<dyn ToolLauncher>,
    fs: Arc<dyn ArtifactFs>,
}

impl ToolRunner {
    pub fn new(tool: ToolConfig, launcher: Arc<dyn ToolLauncher>, fs: Arc<dyn ArtifactFs>) -> Self {
        Self { tool, launcher, fs }
    }

    /// Production runner: shell launcher over the local filesystem
    pub fn local(tool: ToolConfig) -> Self {
        Self::new(tool, Arc::new(ShellLauncher), Arc::new(LocalFs))
    }

    /// Run a job to completion. The caller is suspended until the tool exits;
    /// there is no timeout.
    pub async fn run(&self, job: ToolJob) -> Result<ToolOutput, ToolError> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.run_blocking(&job))
            .await
            .map_err(|e| ToolError::TaskFailed(e.to_string()))?
    }

    pub fn run_blocking(&self, job: &ToolJob) -> Result<ToolOutput, ToolError> {
        if let Some(input) = &job.input {
            self.fs
                .write(&input.path, &input.contents)
                .map_err(|e| ToolError::Io(input.path.clone(), e))?;
        }

        let command = job.operation.command(&self.tool);
        debug!("Running tool: {}", command);
        let launched = self.launcher.launch(&command);

        if let Some(input) = &job.input {
            self.remove_quietly(&input.path);
        }

        match launched {
            Err(e) => {
                error!("Failed to launch tool: {}", e);
                return Err(ToolError::LaunchFailed(e));
            }
            Ok(false) => {
                error!("Tool exited with failure status: {}", command);
                return Err(ToolError::ExitFailure);
            }
            Ok(true) => {}
        }

        if self.fs.exists(&job.error_file) {
            let contents = self
                .fs
                .read_to_string(&job.error_file)
                .map_err(|e| ToolError::Io(job.error_file.clone(), e))?;
            error!("Tool error {}", contents.trim());
            return Err(ToolError::ToolReported(contents));
        }

        if let Some(missing) = job.required.iter().find(|p| !self.fs.exists(p)) {
            error!("Failed to save {}", missing.display());
            return Err(ToolError::MissingArtifact(missing.clone()));
        }

        let mut output = ToolOutput::default();
        let present_optional = job.optional.iter().filter(|p| self.fs.exists(p));
        for path in job.required.iter().chain(present_optional) {
            let contents = self
                .fs
                .read_to_string(path)
                .map_err(|e| ToolError::Io(path.clone(), e))?;
            output.files.insert(path.clone(), contents);
        }

        for path in output.files.keys() {
            self.remove_quietly(path);
        }

        Ok(output)
    }

    fn remove_quietly(&self, path: &Path) {
        if let Err(e) = self.fs.remove(path) {
            warn!("Failed to remove '{}': {}", path.display(), e);
        }
    }
}

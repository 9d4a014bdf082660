use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start '{script}': {source}")]
    Spawn {
        script: String,
        #[source]
        source: io::Error,
    },
    #[error("Cannot open command log {}: {source}", .path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Command exited with {}: '{script}'{}", exit_label(.code), log_hint(.log))]
    Failed {
        script: String,
        code: Option<i32>,
        log: Option<PathBuf>,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn log_hint(log: &Option<PathBuf>) -> String {
    match log {
        Some(path) => format!(" (see {})", path.display()),
        None => String::new(),
    }
}

/// A shell command line run through `sh -c`, with stdout and stderr appended to a log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    script: String,
    log: Option<PathBuf>,
    current_dir: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            log: None,
            current_dir: None,
        }
    }

    pub fn with_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log = Some(path.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn log(&self) -> Option<&Path> {
        self.log.as_deref()
    }

    /// Runs to completion and fails on a non-zero exit.
    pub fn run(&self) -> Result<(), CommandError> {
        let mut child = self.spawn()?;
        let status = child.wait().map_err(|source| CommandError::Spawn {
            script: self.script.clone(),
            source,
        })?;
        self.check(status)
    }

    pub fn spawn(&self) -> Result<Child, CommandError> {
        debug!(command = %self.script, "spawning");
        let mut command = Command::new("sh");
        command.arg("-c").arg(&self.script).stdin(Stdio::null());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        match &self.log {
            Some(path) => {
                let out = self.open_log(path)?;
                let err = out.try_clone().map_err(|source| CommandError::Log {
                    path: path.clone(),
                    source,
                })?;
                command.stdout(out).stderr(err);
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
        command.spawn().map_err(|source| CommandError::Spawn {
            script: self.script.clone(),
            source,
        })
    }

    pub fn check(&self, status: ExitStatus) -> Result<(), CommandError> {
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                script: self.script.clone(),
                code: status.code(),
                log: self.log.clone(),
            })
        }
    }

    fn open_log(&self, path: &Path) -> Result<File, CommandError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| CommandError::Log {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Quotes `value` for safe interpolation into an `sh` command line.
pub fn quote(value: impl AsRef<str>) -> String {
    let value = value.as_ref();
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn quote_path(path: &Path) -> String {
    quote(path.to_string_lossy())
}

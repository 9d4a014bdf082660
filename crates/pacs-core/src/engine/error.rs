use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::cv_log::CvLogError;
use crate::core::io::ledger::LedgerError;
use crate::core::io::version::VersionError;
use crate::core::io::xvg::TableError;
use crate::core::models::ids::{CycleIndex, Direction};
use crate::core::models::scores::ScoresError;
use crate::core::utils::command::CommandError;
use std::path::PathBuf;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("External command failed: {source}")]
    ExternalCommand {
        #[from]
        source: CommandError,
    },

    #[error("'{script}' never produced {} after {attempts} attempt(s)", .liveness.display())]
    LaunchExhausted {
        script: String,
        liveness: PathBuf,
        attempts: u32,
    },

    #[error("Worker for {unit} failed: {reason}")]
    ChildWorker { unit: String, reason: String },

    #[error("Parse error in {} on line {line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(
        "Cycle {cycle} ({direction}) ranked only {available} snapshot(s), but {required} replica(s) must be seeded"
    )]
    InsufficientMaterial {
        cycle: CycleIndex,
        direction: Direction,
        available: usize,
        required: usize,
    },

    #[error("Trial was started with version {found}, but this is version {expected}")]
    VersionMismatch { found: String, expected: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Score archive error: {0}")]
    Scores(#[from] ScoresError),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<CvLogError> for EngineError {
    fn from(err: CvLogError) -> Self {
        match err {
            CvLogError::Io { path, source } => EngineError::Io { path, source },
            CvLogError::Parse { path, line, kind } => EngineError::Parse {
                path,
                line,
                message: kind.to_string(),
            },
        }
    }
}

impl From<VersionError> for EngineError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::Io { path, source } => EngineError::Io { path, source },
            VersionError::Mismatch { found, expected } => {
                EngineError::VersionMismatch { found, expected }
            }
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Io { path, source } => EngineError::Io { path, source },
            LedgerError::Parse {
                path,
                line,
                content,
            } => EngineError::Parse {
                path,
                line,
                message: format!("unrecognized ledger entry '{}'", content),
            },
            LedgerError::ReplicaOutOfRange {
                path,
                replica,
                n_replica,
            } => EngineError::Parse {
                path,
                line: 0,
                message: format!(
                    "replica {} recorded, but only {} replica(s) exist",
                    replica, n_replica
                ),
            },
        }
    }
}

impl From<TableError> for EngineError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Io { path, source } => EngineError::Io { path, source },
            TableError::InvalidNumber { path, line, token } => EngineError::Parse {
                path,
                line,
                message: format!("invalid number '{}'", token),
            },
            TableError::MissingColumn {
                path,
                row,
                found,
                needed,
            } => EngineError::Parse {
                path,
                line: row,
                message: format!("row has {} column(s), need {}", found, needed),
            },
            TableError::Empty { path } => EngineError::Parse {
                path,
                line: 0,
                message: "no data rows".to_string(),
            },
        }
    }
}

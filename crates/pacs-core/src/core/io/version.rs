use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version written into every trial directory by this build.
pub const PACS_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("I/O error on version stamp {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Trial was started with version {found}, but this is version {expected}")]
    Mismatch { found: String, expected: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    Stamped,
    Matched,
}

/// Writes `expected` to `path` if no stamp exists yet, otherwise requires an exact match.
pub fn verify_or_stamp(path: &Path, expected: &str) -> Result<VersionCheck, VersionError> {
    let io_err = |source| VersionError::Io {
        path: path.to_path_buf(),
        source,
    };
    match std::fs::read_to_string(path) {
        Ok(found) => {
            let found = found.trim();
            if found == expected {
                Ok(VersionCheck::Matched)
            } else {
                Err(VersionError::Mismatch {
                    found: found.to_string(),
                    expected: expected.to_string(),
                })
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            std::fs::write(path, format!("{}\n", expected)).map_err(io_err)?;
            Ok(VersionCheck::Stamped)
        }
        Err(e) => Err(io_err(e)),
    }
}

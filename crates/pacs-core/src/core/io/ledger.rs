use crate::core::models::ids::{CycleIndex, ReplicaId};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const TAIL_CHUNK: u64 = 256;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error on ledger {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unrecognized ledger entry in {} on line {line}: '{content}'", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
    },
    #[error(
        "Ledger {} records replica {replica}, but only {n_replica} replica(s) exist",
        .path.display()
    )]
    ReplicaOutOfRange {
        path: PathBuf,
        replica: ReplicaId,
        n_replica: ReplicaId,
    },
}

/// A single event recorded in a progress ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntry {
    ReplicaDone(ReplicaId),
    ExportCompleted { next_cycle: CycleIndex },
}

impl LedgerEntry {
    /// Finds the entry token anywhere in `line`, so any timestamp or logger prefix is accepted.
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(next_cycle) = number_between(line, "export to cycle", " is completed") {
            return Some(LedgerEntry::ExportCompleted { next_cycle });
        }
        number_between(line, "replica", " done").map(LedgerEntry::ReplicaDone)
    }

    fn render(&self) -> String {
        match self {
            LedgerEntry::ReplicaDone(replica) => format!("replica{:03} done", replica),
            LedgerEntry::ExportCompleted { next_cycle } => {
                format!("export to cycle{:03} is completed", next_cycle)
            }
        }
    }
}

/// First `{prefix}{digits}{suffix}` occurrence in `line`.
fn number_between<N: std::str::FromStr>(line: &str, prefix: &str, suffix: &str) -> Option<N> {
    line.match_indices(prefix).find_map(|(start, _)| {
        let rest = &line[start + prefix.len()..];
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 || !rest[digits..].starts_with(suffix) {
            return None;
        }
        rest[..digits].parse().ok()
    })
}

/// Append-only record of finished work for one (cycle, direction).
///
/// The file is the single source of truth for resumption: output files left behind by a
/// crashed segment mean nothing until the matching `done` line is here.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    path: PathBuf,
}

impl ProgressLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_replica_done(&self, replica: ReplicaId) -> Result<(), LedgerError> {
        self.append(LedgerEntry::ReplicaDone(replica))
    }

    pub fn append_export_completed(&self, next_cycle: CycleIndex) -> Result<(), LedgerError> {
        self.append(LedgerEntry::ExportCompleted { next_cycle })
    }

    fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "[{}] {}", unix_seconds(), entry.render()).map_err(|e| self.io_error(e))?;
        file.sync_data().map_err(|e| self.io_error(e))
    }

    /// Returns the last entry without reading the whole file.
    ///
    /// `Ok(None)` means the ledger is missing or contains only whitespace.
    pub fn last_entry(&self) -> Result<Option<LedgerEntry>, LedgerError> {
        let Some(line) = self.last_line()? else {
            return Ok(None);
        };
        LedgerEntry::parse(&line)
            .map(Some)
            .ok_or_else(|| LedgerError::Parse {
                path: self.path.clone(),
                line: 0,
                content: line,
            })
    }

    /// A (cycle, direction) is complete iff its ledger ends with the export marker.
    pub fn is_complete(&self) -> Result<bool, LedgerError> {
        Ok(matches!(
            self.last_entry()?,
            Some(LedgerEntry::ExportCompleted { .. })
        ))
    }

    pub fn finished_replicas(
        &self,
        n_replica: ReplicaId,
    ) -> Result<BTreeSet<ReplicaId>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut finished = BTreeSet::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match LedgerEntry::parse(&line) {
                Some(LedgerEntry::ReplicaDone(replica)) => {
                    if replica == 0 || replica > n_replica {
                        return Err(LedgerError::ReplicaOutOfRange {
                            path: self.path.clone(),
                            replica,
                            n_replica,
                        });
                    }
                    finished.insert(replica);
                }
                Some(LedgerEntry::ExportCompleted { .. }) => {}
                None => {
                    return Err(LedgerError::Parse {
                        path: self.path.clone(),
                        line: index + 1,
                        content: line,
                    });
                }
            }
        }
        Ok(finished)
    }

    /// Replica ids in `1..=n_replica` without a `done` entry, in ascending order.
    pub fn pending_replicas(&self, n_replica: ReplicaId) -> Result<Vec<ReplicaId>, LedgerError> {
        let finished = self.finished_replicas(n_replica)?;
        Ok((1..=n_replica)
            .filter(|replica| !finished.contains(replica))
            .collect())
    }

    fn last_line(&self) -> Result<Option<String>, LedgerError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let len = file.metadata().map_err(|e| self.io_error(e))?.len();

        // Grow the tail window until it holds a full non-empty line or the whole file.
        let mut window = TAIL_CHUNK.min(len);
        loop {
            file.seek(SeekFrom::Start(len - window))
                .map_err(|e| self.io_error(e))?;
            let mut buf = Vec::with_capacity(window as usize);
            (&mut file)
                .take(window)
                .read_to_end(&mut buf)
                .map_err(|e| self.io_error(e))?;

            let text = String::from_utf8_lossy(&buf);
            let trimmed = text.trim_end();
            let whole_file = window == len;
            match trimmed.rfind('\n') {
                Some(pos) => return Ok(Some(trimmed[pos + 1..].to_string())),
                None if whole_file => {
                    return Ok((!trimmed.trim().is_empty()).then(|| trimmed.to_string()));
                }
                None => window = (window * 2).min(len),
            }
        }
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

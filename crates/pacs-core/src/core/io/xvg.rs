//! Reader for the whitespace-separated numeric tables written by analysis tools.
//!
//! `gmx` writes `.xvg` files whose metadata lines start with `#` or `@`; `cpptraj` data files
//! start with a `#Frame ...` header. Both reduce to rows of floats once those lines are dropped.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid number '{token}' in {} on line {line}", .path.display())]
    InvalidNumber {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("Row {row} of {} has {found} column(s), need at least {needed}", .path.display())]
    MissingColumn {
        path: PathBuf,
        row: usize,
        found: usize,
        needed: usize,
    },
    #[error("Table {} contains no data rows", .path.display())]
    Empty { path: PathBuf },
}

/// A parsed numeric table with the file it came from kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    path: PathBuf,
    rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self, TableError> {
        let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, TableError> {
        let mut rows = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|_| TableError::InvalidNumber {
                        path: path.to_path_buf(),
                        line: index + 1,
                        token: token.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(TableError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            rows,
        })
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }

    /// Values of one column, one per row.
    pub fn column(&self, index: usize) -> Result<Vec<f64>, TableError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                values
                    .get(index)
                    .copied()
                    .ok_or_else(|| self.missing_column(row, values.len(), index + 1))
            })
            .collect()
    }

    /// Euclidean norm of the columns `first..first + width` for every row.
    pub fn row_norms(&self, first: usize, width: usize) -> Result<Vec<f64>, TableError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                values
                    .get(first..first + width)
                    .map(|slice| slice.iter().map(|v| v * v).sum::<f64>().sqrt())
                    .ok_or_else(|| self.missing_column(row, values.len(), first + width))
            })
            .collect()
    }

    fn missing_column(&self, row: usize, found: usize, needed: usize) -> TableError {
        TableError::MissingColumn {
            path: self.path.clone(),
            row: row + 1,
            found,
            needed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GMX_XYZ: &str = "# created by gmx distance\n@    title \"Distance\"\n@ xaxis label \"Time\"\n   0.000  3.0  4.0  0.0\n  10.000  0.0  0.0  2.0\n";

    #[test]
    fn skips_metadata_and_reads_columns() {
        let table = Table::parse(Path::new("dist.xvg"), GMX_XYZ).unwrap();
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.column(0).unwrap(), vec![0.0, 10.0]);
        assert_eq!(table.row_norms(1, 3).unwrap(), vec![5.0, 2.0]);
    }

    #[test]
    fn reads_cpptraj_data_files() {
        let text = "#Frame     rms\n       1  0.5000\n       2  0.7500\n";
        let table = Table::parse(Path::new("rms.dat"), text).unwrap();
        assert_eq!(table.column(1).unwrap(), vec![0.5, 0.75]);
    }

    #[test]
    fn reports_short_rows_and_bad_tokens() {
        let table = Table::parse(Path::new("a.xvg"), "0 1\n1\n").unwrap();
        assert!(matches!(
            table.column(1),
            Err(TableError::MissingColumn { row: 2, found: 1, needed: 2, .. })
        ));

        let err = Table::parse(Path::new("b.xvg"), "# header\n0 nan?\n").unwrap_err();
        assert!(matches!(err, TableError::InvalidNumber { line: 2, .. }));
    }

    #[test]
    fn table_without_data_is_rejected() {
        let err = Table::parse(Path::new("c.xvg"), "# only\n@ comments\n").unwrap_err();
        assert!(matches!(err, TableError::Empty { .. }));
    }
}

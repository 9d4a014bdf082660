use crate::core::models::ids::{Direction, ReplicaId};
use crate::core::models::snapshot::{Cv, Snapshot};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CvLogError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed CV record in {} on line {line}: {kind}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        kind: CvParseErrorKind,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CvParseErrorKind {
    #[error("expected keyword '{expected}'")]
    MissingKeyword { expected: &'static str },
    #[error("invalid integer '{0}'")]
    InvalidInt(String),
    #[error("invalid float '{0}'")]
    InvalidFloat(String),
    #[error("unterminated vector value")]
    UnterminatedVector,
    #[error("missing CV value")]
    MissingValue,
}

/// Writes one `replica R frame F cv V` line per snapshot, in the given order.
pub fn write_cv_log(path: &Path, snapshots: &[Snapshot]) -> Result<(), CvLogError> {
    let io_err = |source| CvLogError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    for snapshot in snapshots {
        writeln!(writer, "{}", snapshot).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)
}

/// Reads a CV log back into snapshots tagged with `direction`.
///
/// Blank lines are ignored; any other line that is not a well-formed record is rejected
/// together with its 1-based line number.
pub fn read_cv_log(path: &Path, direction: Direction) -> Result<Vec<Snapshot>, CvLogError> {
    let file = File::open(path).map_err(|source| CvLogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut snapshots = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CvLogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let (replica, frame, cv) = parse_record(&line).map_err(|kind| CvLogError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            kind,
        })?;
        snapshots.push(Snapshot::new(direction, replica, frame, cv));
    }
    Ok(snapshots)
}

pub fn parse_record(line: &str) -> Result<(ReplicaId, usize, Cv), CvParseErrorKind> {
    let rest = expect_keyword(line.trim(), "replica")?;
    let (replica, rest) = split_token(rest);
    let replica: ReplicaId = replica
        .parse()
        .map_err(|_| CvParseErrorKind::InvalidInt(replica.to_string()))?;

    let rest = expect_keyword(rest, "frame")?;
    let (frame, rest) = split_token(rest);
    let frame: usize = frame
        .parse()
        .map_err(|_| CvParseErrorKind::InvalidInt(frame.to_string()))?;

    let value = expect_keyword(rest, "cv")?.trim();
    if value.is_empty() {
        return Err(CvParseErrorKind::MissingValue);
    }
    Ok((replica, frame, parse_cv(value)?))
}

fn parse_cv(value: &str) -> Result<Cv, CvParseErrorKind> {
    if let Some(inner) = value.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or(CvParseErrorKind::UnterminatedVector)?;
        let values = inner
            .split_whitespace()
            .map(parse_float)
            .collect::<Result<Vec<_>, _>>()?;
        if values.is_empty() {
            return Err(CvParseErrorKind::MissingValue);
        }
        Ok(Cv::Vector(values))
    } else {
        parse_float(value).map(Cv::Scalar)
    }
}

fn parse_float(token: &str) -> Result<f64, CvParseErrorKind> {
    token
        .parse()
        .map_err(|_| CvParseErrorKind::InvalidFloat(token.to_string()))
}

fn expect_keyword<'a>(input: &'a str, keyword: &'static str) -> Result<&'a str, CvParseErrorKind> {
    let (token, rest) = split_token(input);
    if token == keyword {
        Ok(rest)
    } else {
        Err(CvParseErrorKind::MissingKeyword { expected: keyword })
    }
}

fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    mod parsing {
        use super::*;

        #[test]
        fn accepts_scalar_and_vector_records() {
            assert_eq!(
                parse_record("replica 2 frame 14 cv 0.375").unwrap(),
                (2, 14, Cv::Scalar(0.375))
            );
            assert_eq!(
                parse_record("replica 1 frame 0 cv [1.5 -2 3e-3]").unwrap(),
                (1, 0, Cv::Vector(vec![1.5, -2.0, 0.003]))
            );
        }

        #[test]
        fn rejects_records_with_wrong_shape() {
            assert_eq!(
                parse_record("rep 1 frame 0 cv 1.0"),
                Err(CvParseErrorKind::MissingKeyword { expected: "replica" })
            );
            assert_eq!(
                parse_record("replica x frame 0 cv 1.0"),
                Err(CvParseErrorKind::InvalidInt("x".to_string()))
            );
            assert_eq!(
                parse_record("replica 1 frame 0 cv [1.0 2.0"),
                Err(CvParseErrorKind::UnterminatedVector)
            );
            assert_eq!(
                parse_record("replica 1 frame 0 cv"),
                Err(CvParseErrorKind::MissingValue)
            );
            assert_eq!(
                parse_record("replica 1 frame 0 cv abc"),
                Err(CvParseErrorKind::InvalidFloat("abc".to_string()))
            );
        }
    }

    mod files {
        use super::*;

        #[test]
        fn written_log_reads_back_identically() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("cv.log");
            let snapshots = vec![
                Snapshot::new(Direction::Back, 3, 5, 0.1 + 0.2),
                Snapshot::new(Direction::Back, 1, 0, vec![1.0 / 3.0, -7.25]),
            ];

            write_cv_log(&path, &snapshots).unwrap();
            let read = read_cv_log(&path, Direction::Back).unwrap();

            assert_eq!(read, snapshots);
        }

        #[test]
        fn reports_line_number_of_bad_record() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("cv_ranked.log");
            std::fs::write(
                &path,
                "replica 1 frame 0 cv 1.0\n\nreplica 2 frame 1 cv oops\n",
            )
            .unwrap();

            let err = read_cv_log(&path, Direction::Fore).unwrap_err();
            match err {
                CvLogError::Parse { line, .. } => assert_eq!(line, 3),
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn missing_file_is_an_io_error() {
            let dir = tempdir().unwrap();
            let err = read_cv_log(&dir.path().join("absent.log"), Direction::Fore).unwrap_err();
            assert!(matches!(err, CvLogError::Io { .. }));
        }
    }
}

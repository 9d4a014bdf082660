use super::ids::{CycleIndex, Direction, ReplicaId};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGNMENT: usize = 64;

#[derive(Debug, Error)]
pub enum ScoresError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Pair matrix is not rectangular: row {row} has {found} columns, expected {expected}")]
    RaggedMatrix {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error(
        "Pair ({fore_replica}, {back_replica}) has shape {found:?}, but the cycle tensor expects {expected:?}"
    )]
    ShapeMismatch {
        fore_replica: ReplicaId,
        back_replica: ReplicaId,
        found: (usize, usize),
        expected: (usize, usize),
    },
    #[error("Replica pair ({fore_replica}, {back_replica}) is outside 1..={n_replicas}")]
    ReplicaOutOfRange {
        fore_replica: ReplicaId,
        back_replica: ReplicaId,
        n_replicas: usize,
    },
    #[error("Invalid score archive: {0}")]
    Format(String),
}

/// CV matrix of one (fore replica, back replica) pair, indexed `[fore_frame][back_frame]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoresInOnePair {
    pub cycle: CycleIndex,
    pub fore_replica: ReplicaId,
    pub back_replica: ReplicaId,
    pub n_frames_fore: usize,
    pub n_frames_back: usize,
    data: Vec<f64>,
}

impl ScoresInOnePair {
    pub fn from_rows(
        cycle: CycleIndex,
        fore_replica: ReplicaId,
        back_replica: ReplicaId,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, ScoresError> {
        let n_frames_fore = rows.len();
        let n_frames_back = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_frames_fore * n_frames_back);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != n_frames_back {
                return Err(ScoresError::RaggedMatrix {
                    row,
                    found: values.len(),
                    expected: n_frames_back,
                });
            }
            data.extend(values);
        }
        Ok(Self {
            cycle,
            fore_replica,
            back_replica,
            n_frames_fore,
            n_frames_back,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_frames_fore, self.n_frames_back)
    }

    pub fn value(&self, fore_frame: usize, back_frame: usize) -> f64 {
        self.data[fore_frame * self.n_frames_back + back_frame]
    }
}

/// Dense `[fore_replica][back_replica][fore_frame][back_frame]` tensor for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoresInCycle {
    pub cycle: CycleIndex,
    pub n_replicas: usize,
    pub n_frames_fore: usize,
    pub n_frames_back: usize,
    data: Vec<f64>,
}

impl ScoresInCycle {
    pub fn new(
        cycle: CycleIndex,
        n_replicas: usize,
        n_frames_fore: usize,
        n_frames_back: usize,
    ) -> Self {
        Self {
            cycle,
            n_replicas,
            n_frames_fore,
            n_frames_back,
            data: vec![0.0; n_replicas * n_replicas * n_frames_fore * n_frames_back],
        }
    }

    fn offset(&self, fore_replica: usize, back_replica: usize) -> usize {
        ((fore_replica * self.n_replicas) + back_replica) * self.n_frames_fore * self.n_frames_back
    }

    pub fn add(&mut self, pair: &ScoresInOnePair) -> Result<(), ScoresError> {
        let expected = (self.n_frames_fore, self.n_frames_back);
        if pair.shape() != expected {
            return Err(ScoresError::ShapeMismatch {
                fore_replica: pair.fore_replica,
                back_replica: pair.back_replica,
                found: pair.shape(),
                expected,
            });
        }
        let in_range = |r: ReplicaId| r >= 1 && (r as usize) <= self.n_replicas;
        if !in_range(pair.fore_replica) || !in_range(pair.back_replica) {
            return Err(ScoresError::ReplicaOutOfRange {
                fore_replica: pair.fore_replica,
                back_replica: pair.back_replica,
                n_replicas: self.n_replicas,
            });
        }

        let start = self.offset(
            pair.fore_replica as usize - 1,
            pair.back_replica as usize - 1,
        );
        self.data[start..start + pair.data.len()].copy_from_slice(&pair.data);
        Ok(())
    }

    pub fn value(
        &self,
        fore_replica: ReplicaId,
        back_replica: ReplicaId,
        fore_frame: usize,
        back_frame: usize,
    ) -> f64 {
        let start = self.offset(fore_replica as usize - 1, back_replica as usize - 1);
        self.data[start + fore_frame * self.n_frames_back + back_frame]
    }

    /// Averages every frame of every replica of the opposite direction, giving one value per
    /// `(replica, frame)` of `direction`. Frame 0 is left out on both axes when `skip_initial`.
    pub fn aggregate(&self, direction: Direction, skip_initial: bool) -> Vec<Vec<(usize, f64)>> {
        let first = usize::from(skip_initial);
        let (own_frames, other_frames) = match direction {
            Direction::Fore => (self.n_frames_fore, self.n_frames_back),
            Direction::Back => (self.n_frames_back, self.n_frames_fore),
        };
        let count = (self.n_replicas * other_frames.saturating_sub(first)) as f64;

        (1..=self.n_replicas as ReplicaId)
            .map(|replica| {
                (first..own_frames)
                    .map(|frame| {
                        let mut sum = 0.0;
                        for other in 1..=self.n_replicas as ReplicaId {
                            for other_frame in first..other_frames {
                                sum += match direction {
                                    Direction::Fore => {
                                        self.value(replica, other, frame, other_frame)
                                    }
                                    Direction::Back => {
                                        self.value(other, replica, other_frame, frame)
                                    }
                                };
                            }
                        }
                        let mean = if count > 0.0 { sum / count } else { f64::NAN };
                        (frame, mean)
                    })
                    .collect()
            })
            .collect()
    }

    /// Writes the tensor as a NumPy `.npy` (v1.0, little-endian `f64`, C order) archive.
    pub fn save_npy(&self, path: &Path) -> Result<(), ScoresError> {
        let shape = format!(
            "({}, {}, {}, {})",
            self.n_replicas, self.n_replicas, self.n_frames_fore, self.n_frames_back
        );
        let mut header = format!(
            "{{'descr': '<f8', 'fortran_order': False, 'shape': {}, }}",
            shape
        );
        let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
        let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
        header.push_str(&" ".repeat(padding));
        header.push('\n');

        let header_len = u16::try_from(header.len())
            .map_err(|_| ScoresError::Format("header exceeds 65535 bytes".to_string()))?;

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(NPY_MAGIC)?;
        writer.write_all(&[1, 0])?;
        writer.write_all(&header_len.to_le_bytes())?;
        writer.write_all(header.as_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn load_npy(path: &Path, cycle: CycleIndex) -> Result<Self, ScoresError> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut preamble = [0u8; 10];
        reader.read_exact(&mut preamble)?;
        if &preamble[..6] != NPY_MAGIC {
            return Err(ScoresError::Format("missing NPY magic string".to_string()));
        }
        if preamble[6] != 1 {
            return Err(ScoresError::Format(format!(
                "unsupported NPY version {}.{}",
                preamble[6], preamble[7]
            )));
        }
        let header_len = u16::from_le_bytes([preamble[8], preamble[9]]) as usize;
        let mut header = vec![0u8; header_len];
        reader.read_exact(&mut header)?;
        let header = String::from_utf8(header)
            .map_err(|_| ScoresError::Format("header is not UTF-8".to_string()))?;

        if !header.contains("'descr': '<f8'") || !header.contains("'fortran_order': False") {
            return Err(ScoresError::Format(format!(
                "expected little-endian f64 in C order, found header {}",
                header.trim()
            )));
        }
        let shape = parse_shape(&header)?;
        let [n_replicas, n_replicas_back, n_frames_fore, n_frames_back] = shape[..] else {
            return Err(ScoresError::Format(format!(
                "expected a 4-dimensional tensor, found shape {:?}",
                shape
            )));
        };
        if n_replicas != n_replicas_back {
            return Err(ScoresError::Format(format!(
                "fore and back replica counts differ: {} vs {}",
                n_replicas, n_replicas_back
            )));
        }

        let len = n_replicas * n_replicas * n_frames_fore * n_frames_back;
        let mut data = Vec::with_capacity(len);
        let mut buf = [0u8; 8];
        for _ in 0..len {
            reader.read_exact(&mut buf)?;
            data.push(f64::from_le_bytes(buf));
        }

        Ok(Self {
            cycle,
            n_replicas,
            n_frames_fore,
            n_frames_back,
            data,
        })
    }
}

fn parse_shape(header: &str) -> Result<Vec<usize>, ScoresError> {
    let start = header
        .find("'shape': (")
        .map(|i| i + "'shape': (".len())
        .ok_or_else(|| ScoresError::Format("header has no shape".to_string()))?;
    let end = header[start..]
        .find(')')
        .map(|i| start + i)
        .ok_or_else(|| ScoresError::Format("unterminated shape tuple".to_string()))?;

    header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| ScoresError::Format(format!("invalid shape entry '{}'", s)))
        })
        .collect()
}

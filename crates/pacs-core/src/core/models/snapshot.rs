use super::ids::{Direction, ReplicaId};
use std::fmt;

/// Collective-variable value of a single trajectory frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Cv {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Cv {
    /// Scalar used when ordering snapshots by value. For a vector CV this is its Euclidean norm,
    /// which only shows up in reports; vector CVs are ranked by position.
    pub fn sort_key(&self) -> f64 {
        match self {
            Cv::Scalar(value) => *value,
            Cv::Vector(values) => values.iter().map(|v| v * v).sum::<f64>().sqrt(),
        }
    }

    pub fn components(&self) -> &[f64] {
        match self {
            Cv::Scalar(value) => std::slice::from_ref(value),
            Cv::Vector(values) => values,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Cv::Scalar(value) => Some(*value),
            Cv::Vector(_) => None,
        }
    }
}

impl From<f64> for Cv {
    fn from(value: f64) -> Self {
        Cv::Scalar(value)
    }
}

impl From<Vec<f64>> for Cv {
    fn from(values: Vec<f64>) -> Self {
        Cv::Vector(values)
    }
}

impl fmt::Display for Cv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cv::Scalar(value) => write!(f, "{}", value),
            Cv::Vector(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A scored frame: where it lives and what it scored.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub direction: Direction,
    pub replica: ReplicaId,
    pub frame: usize,
    pub cv: Cv,
}

impl Snapshot {
    pub fn new(direction: Direction, replica: ReplicaId, frame: usize, cv: impl Into<Cv>) -> Self {
        Self {
            direction,
            replica,
            frame,
            cv: cv.into(),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "replica {} frame {} cv {}",
            self.replica, self.frame, self.cv
        )
    }
}

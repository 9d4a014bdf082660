use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TrialId = u32;
pub type CycleIndex = u32;
pub type ReplicaId = u32;

/// One of the two independently evolving replica sets of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Fore,
    Back,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Fore, Direction::Back];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Fore => "fore",
            Direction::Back => "back",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Fore => Direction::Back,
            Direction::Back => Direction::Fore,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDirectionError(pub String);

impl fmt::Display for ParseDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid direction '{}', expected 'fore' or 'back'", self.0)
    }
}

impl std::error::Error for ParseDirectionError {}

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fore" => Ok(Direction::Fore),
            "back" => Ok(Direction::Back),
            _ => Err(ParseDirectionError(s.to_string())),
        }
    }
}

/// A value held once per direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerDirection<T> {
    pub fore: T,
    pub back: T,
}

impl<T> PerDirection<T> {
    pub fn new(fore: T, back: T) -> Self {
        Self { fore, back }
    }

    pub fn get(&self, direction: Direction) -> &T {
        match direction {
            Direction::Fore => &self.fore,
            Direction::Back => &self.back,
        }
    }

    pub fn get_mut(&mut self, direction: Direction) -> &mut T {
        match direction {
            Direction::Fore => &mut self.fore,
            Direction::Back => &mut self.back,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, &T)> {
        [(Direction::Fore, &self.fore), (Direction::Back, &self.back)].into_iter()
    }

    pub fn try_from_fn<E>(mut f: impl FnMut(Direction) -> Result<T, E>) -> Result<Self, E> {
        let fore = f(Direction::Fore)?;
        let back = f(Direction::Back)?;
        Ok(Self { fore, back })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trips_through_its_name() {
        for direction in Direction::ALL {
            assert_eq!(direction.as_str().parse::<Direction>().unwrap(), direction);
        }
        assert_eq!(" FORE ".parse::<Direction>().unwrap(), Direction::Fore);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn opposite_swaps_directions() {
        assert_eq!(Direction::Fore.opposite(), Direction::Back);
        assert_eq!(Direction::Back.opposite(), Direction::Fore);
    }

    #[test]
    fn per_direction_accessors_select_the_matching_side() {
        let mut pair = PerDirection::new(1, 2);
        *pair.get_mut(Direction::Back) += 10;
        assert_eq!(*pair.get(Direction::Fore), 1);
        assert_eq!(*pair.get(Direction::Back), 12);
        let collected: Vec<_> = pair.iter().map(|(d, v)| (d, *v)).collect();
        assert_eq!(collected, vec![(Direction::Fore, 1), (Direction::Back, 12)]);
    }
}

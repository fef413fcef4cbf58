use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

pub type NodeId = usize;
pub type TrackId = usize;
pub type TrainId = u32;

/// One of the four axis-aligned direction slots of a node
#[derive(PartialEq, Copy, Clone, Debug, Hash, Eq)]
pub enum Direction {
    West,
    East,
    North,
    South,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::West, Direction::East, Direction::North, Direction::South];

    pub fn from_vector(dx: i32, dy: i32) -> Option<Direction> {
        match (dx, dy) {
            (-1, 0) => Some(Direction::West),
            (1, 0) => Some(Direction::East),
            (0, -1) => Some(Direction::North),
            (0, 1) => Some(Direction::South),
            _ => None,
        }
    }

    pub fn vector(&self) -> (i32, i32) {
        match self {
            Direction::West => (-1, 0),
            Direction::East => (1, 0),
            Direction::North => (0, -1),
            Direction::South => (0, 1),
        }
    }

    pub fn reverse(&self) -> Direction {
        match self {
            Direction::West => Direction::East,
            Direction::East => Direction::West,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Direction::West => 0,
            Direction::East => 1,
            Direction::North => 2,
            Direction::South => 3,
        }
    }
}

/// RGB identity color of stations and trains, stored as `[r, g, b]`
#[derive(Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default, Debug, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Copy, Clone, Default, Debug, Hash)]
#[repr(u8)]
pub enum TrainKind {
    #[default]
    Regular = 1,
    /// Maintenance draisine, clears wrecks and retires at any station
    Craft = 3,
}

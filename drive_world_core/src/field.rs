use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur while building or editing a field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Coordinates ({x}, {y}) are outside the playable area of size ({width}, {height})")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    #[error("Field dimensions ({width}, {height}) must both be positive")]
    InvalidDimensions { width: i32, height: i32 },
}

/// The rectangular warehouse floor.
///
/// The playable area spans `[0, width) x [0, height)`. Every cell a drive
/// must not enter (the perimeter ring one cell outside the playable area,
/// plus any interior wall) is collected in a single boundary set, which is
/// exactly what sensor snapshots expose to agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    width: i32,
    height: i32,
    walls: HashSet<Position>,
    boundaries: HashSet<Position>,
}

impl Field {
    /// Creates a field of the given dimensions with no interior walls.
    ///
    /// Returns `FieldError::InvalidDimensions` unless both dimensions are
    /// positive.
    pub fn new(width: i32, height: i32) -> Result<Self, FieldError> {
        if width <= 0 || height <= 0 {
            return Err(FieldError::InvalidDimensions { width, height });
        }
        let mut boundaries = HashSet::new();
        for x in -1..=width {
            boundaries.insert(Position { x, y: -1 });
            boundaries.insert(Position { x, y: height });
        }
        for y in 0..height {
            boundaries.insert(Position { x: -1, y });
            boundaries.insert(Position { x: width, y });
        }
        Ok(Field {
            width,
            height,
            walls: HashSet::new(),
            boundaries,
        })
    }

    /// Returns the width of the playable area.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Returns the height of the playable area.
    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Checks if the given position lies inside the playable rectangle.
    #[inline]
    pub fn in_bounds(&self, position: Position) -> bool {
        position.x >= 0 && position.x < self.width && position.y >= 0 && position.y < self.height
    }

    /// Checks if a drive may occupy the given position: inside the playable
    /// rectangle and not a wall.
    pub fn is_open(&self, position: Position) -> bool {
        self.in_bounds(position) && !self.walls.contains(&position)
    }

    /// Checks if the given cell is an interior wall.
    pub fn is_wall(&self, position: Position) -> bool {
        self.walls.contains(&position)
    }

    /// Turns a cell of the playable area into a wall.
    ///
    /// Returns `Ok(())` on success, or `Err(FieldError::OutOfBounds)` if the
    /// cell lies outside the playable rectangle.
    pub fn add_wall(&mut self, position: Position) -> Result<(), FieldError> {
        if !self.in_bounds(position) {
            return Err(FieldError::OutOfBounds {
                x: position.x,
                y: position.y,
                width: self.width,
                height: self.height,
            });
        }
        self.walls.insert(position);
        self.boundaries.insert(position);
        Ok(())
    }

    /// All impassable cells: the perimeter ring plus interior walls.
    pub fn boundaries(&self) -> &HashSet<Position> {
        &self.boundaries
    }
}

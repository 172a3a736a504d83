use serde::{Deserialize, Serialize};

pub mod agent;
pub mod field;
pub mod warehouse;

/// Unique identifier for drives.
pub type DriveId = usize;

/// Unique identifier for pods.
pub type PodId = usize;

/// Represents a 2D grid coordinate.
///
/// Coordinates are signed: the field's boundary ring sits one cell outside
/// the playable rectangle, at cells such as `(-1, -1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

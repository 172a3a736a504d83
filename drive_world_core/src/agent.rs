use std::collections::HashSet;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    DriveId, Position,
    warehouse::{DriveMove, SensorSnapshot},
};

/// Represents errors raised while a drive chooses its move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// The decision needed the goal coordinate but the snapshot carries none.
    #[error("sensor snapshot has no goal location")]
    MissingGoal,
    /// Wrapper added at the top of the decision, naming the call that failed.
    #[error("next_move in {agent} failed: {source}")]
    Failed {
        agent: &'static str,
        #[source]
        source: Box<AgentError>,
    },
}

/// Trait defining the decision capability of a drive.
/// Each turn the simulator shows the drive one sensor snapshot and expects
/// exactly one move back.
pub trait Drive {
    /// Returns the unique ID of this drive.
    fn id(&self) -> DriveId;

    /// Chooses the next move from the current sensor snapshot.
    /// `&mut self` allows behaviors to keep internal state (e.g. an RNG).
    fn next_move(&mut self, snapshot: &SensorSnapshot) -> Result<DriveMove, AgentError>;
}

/// A drive that drifts at random, used as floor traffic.
#[derive(Debug)]
pub struct RandomDrive {
    id: DriveId,
    rng: StdRng,
}

impl RandomDrive {
    pub fn new(id: DriveId, seed: u64) -> Self {
        Self {
            id,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Drive for RandomDrive {
    fn id(&self) -> DriveId {
        self.id
    }

    fn next_move(&mut self, _snapshot: &SensorSnapshot) -> Result<DriveMove, AgentError> {
        // Random drift; the simulator rejects anything illegal.
        let dx: i8 = self.rng.random_range(-1..=1);
        let dy: i8 = self.rng.random_range(-1..=1);

        let mv = match (dx, dy) {
            (1, _) => DriveMove::Right,
            (-1, _) => DriveMove::Left,
            (_, 1) => DriveMove::Up,
            (_, -1) => DriveMove::Down,
            _ => DriveMove::None,
        };
        Ok(mv)
    }
}

/// The greedy path policy.
///
/// Seeks its destination one step at a time along whichever axis still has
/// distance left, horizontal before vertical, skipping candidate cells
/// occupied by other drives. In advanced mode the drive first heads for the
/// target pod, lifts it, then carries it to the goal and drops it there.
///
/// This is a single-step heuristic, not a shortest-path search: it keeps no
/// plan, re-derives everything from the snapshot each turn, and can stall
/// forever against a static obstacle.
#[derive(Debug)]
pub struct PathAgent {
    id: DriveId,
    need_to_find_target_pod: bool,
}

impl PathAgent {
    /// Creates a path agent. `advanced_mode` tells the agent it must find
    /// and lift the target pod before heading for the goal.
    pub fn new(id: DriveId, advanced_mode: bool) -> Self {
        Self {
            id,
            need_to_find_target_pod: advanced_mode,
        }
    }

    /// One greedy step from `current` toward `target`.
    ///
    /// Candidates are collected axis by axis: `Right`/`Left` when x distance
    /// remains, then `Up`/`Down` when y distance remains. The first candidate
    /// whose destination cell is not in `occupied` wins. Returns
    /// `DriveMove::None` when both deltas are zero or every candidate cell
    /// is occupied.
    pub fn move_towards_target(
        current: Position,
        target: Position,
        occupied: &HashSet<Position>,
    ) -> DriveMove {
        let dx = target.x - current.x;
        let dy = target.y - current.y;

        let mut candidates = Vec::new();
        if dx > 0 {
            candidates.push(DriveMove::Right);
        }
        if dx < 0 {
            candidates.push(DriveMove::Left);
        }
        if dy > 0 {
            candidates.push(DriveMove::Up);
        }
        if dy < 0 {
            candidates.push(DriveMove::Down);
        }

        for mv in candidates {
            if let Some(destination) = mv.applied_to(current) {
                if !occupied.contains(&destination) {
                    return mv;
                }
            }
        }
        DriveMove::None
    }

    fn decide(&self, snapshot: &SensorSnapshot) -> Result<DriveMove, AgentError> {
        let current = snapshot.player_location;

        if self.need_to_find_target_pod {
            if let Some(target) = snapshot.target_pod_location {
                if current == target {
                    return Ok(DriveMove::LiftPod);
                }
                return Ok(Self::move_towards_target(
                    current,
                    target,
                    snapshot.drive_locations,
                ));
            }

            // Check if the pod has been lifted
            let is_pod_lifted = snapshot
                .lifted_pairs
                .iter()
                .any(|(drive, _)| *drive == self.id);

            if is_pod_lifted {
                let goal = snapshot.goal_location.ok_or(AgentError::MissingGoal)?;
                if current == goal {
                    return Ok(DriveMove::DropPod);
                }
                return Ok(Self::move_towards_target(
                    current,
                    goal,
                    snapshot.drive_locations,
                ));
            }
        }

        let goal = snapshot.goal_location.ok_or(AgentError::MissingGoal)?;
        Ok(Self::move_towards_target(
            current,
            goal,
            snapshot.drive_locations,
        ))
    }
}

impl Drive for PathAgent {
    fn id(&self) -> DriveId {
        self.id
    }

    fn next_move(&mut self, snapshot: &SensorSnapshot) -> Result<DriveMove, AgentError> {
        self.decide(snapshot).map_err(|e| AgentError::Failed {
            agent: "PathAgent",
            source: Box::new(e),
        })
    }
}

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::{
    DriveId, PodId, Position,
    agent::{AgentError, Drive},
    field::Field,
};

/// Represents the moves a drive can hand back to the simulator.
///
/// `Up` is the positive y direction, `Right` the positive x direction.
/// `LiftPod` and `DropPod` are valid in advanced mode only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveMove {
    None,
    Up,
    Down,
    Left,
    Right,
    LiftPod,
    DropPod,
}

impl DriveMove {
    /// Returns the cell this move leads to from `from` for the four movement
    /// variants, and `None` for the stationary ones.
    pub fn applied_to(self, from: Position) -> Option<Position> {
        let (dx, dy) = match self {
            DriveMove::Up => (0, 1),
            DriveMove::Down => (0, -1),
            DriveMove::Left => (-1, 0),
            DriveMove::Right => (1, 0),
            DriveMove::None | DriveMove::LiftPod | DriveMove::DropPod => return None,
        };
        Some(Position {
            x: from.x + dx,
            y: from.y + dy,
        })
    }
}

/// Represents the outcome of processing one drive move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Success,
    Failure(String),
    /// The episode is over: goal reached in simple mode, target pod dropped
    /// on the goal in advanced mode.
    Completed,
}

/// Holds the state of a drive on the warehouse floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveState {
    pub id: DriveId,
    pub position: Position,
    pub lifted_pod: Option<PodId>,
}

/// Holds the state of a pod on the warehouse floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodState {
    pub id: PodId,
    pub position: Position,
    pub lifted_by: Option<DriveId>,
}

/// The read-only sensor view handed to a drive each turn.
///
/// A snapshot is built fresh for every decision; agents read it and hand
/// back a move, nothing more.
#[derive(Debug)]
pub struct SensorSnapshot<'a> {
    /// Every impassable cell: the perimeter ring plus interior walls.
    pub field_boundaries: &'a HashSet<Position>,
    /// The cells occupied by drives, the receiving drive's own included.
    pub drive_locations: &'a HashSet<Position>,
    /// Current cell of every pod, lifted pods included.
    pub pod_locations: Vec<Position>,
    /// The receiving drive's own cell.
    pub player_location: Position,
    /// The goal cell, when the map defines one.
    pub goal_location: Option<Position>,
    /// The target pod's cell while it sits unlifted on the floor;
    /// `None` once a drive lifts it (advanced mode only).
    pub target_pod_location: Option<Position>,
    /// Which drive is currently lifting which pod.
    pub lifted_pairs: Vec<(DriveId, PodId)>,
}

/// Manages the simulated warehouse floor.
///
/// The warehouse owns the field geometry, all drive and pod state and the
/// boxed [`Drive`] behaviors, and advances the simulation one turn at a
/// time. A target pod being configured is what makes an episode "advanced
/// mode"; without one the episode is complete when the player drive reaches
/// the goal.
pub struct Warehouse {
    field: Field,
    drives: HashMap<DriveId, DriveState>,
    behaviors: HashMap<DriveId, Box<dyn Drive>>,
    occupied: HashSet<Position>,
    pods: HashMap<PodId, PodState>,
    goal: Option<Position>,
    target_pod: Option<PodId>,
    player: Option<DriveId>,
    next_drive_id: DriveId,
    next_pod_id: PodId,
}

// Manual impl because `Box<dyn Drive>` has no `Debug`; `behaviors` is
// represented by its keys only.
impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("field", &self.field)
            .field("drives", &self.drives)
            .field("behaviors", &self.behaviors.keys())
            .field("occupied", &self.occupied)
            .field("pods", &self.pods)
            .field("goal", &self.goal)
            .field("target_pod", &self.target_pod)
            .field("player", &self.player)
            .field("next_drive_id", &self.next_drive_id)
            .field("next_pod_id", &self.next_pod_id)
            .finish()
    }
}

impl Warehouse {
    /// Creates a warehouse with no drives, pods or goal.
    pub fn new(field: Field) -> Self {
        Warehouse {
            field,
            drives: HashMap::new(),
            behaviors: HashMap::new(),
            occupied: HashSet::new(),
            pods: HashMap::new(),
            goal: None,
            target_pod: None,
            player: None,
            next_drive_id: 0,
            next_pod_id: 0,
        }
    }

    /// Generates a unique drive ID.
    pub fn reserve_drive_id(&mut self) -> DriveId {
        let id = self.next_drive_id;
        self.next_drive_id += 1;
        id
    }

    /// Adds a drive with its behavior to the warehouse.
    pub fn add_drive(
        &mut self,
        position: Position,
        behavior: Box<dyn Drive>,
    ) -> Result<DriveId, String> {
        let drive_id = behavior.id();

        if !self.field.in_bounds(position) {
            return Err(format!("Position {:?} is out of bounds.", position));
        }
        if self.field.is_wall(position) {
            return Err(format!("Cannot place a drive on a wall at {:?}.", position));
        }
        if self.occupied.contains(&position) {
            return Err(format!(
                "Position {:?} is already occupied by a drive.",
                position
            ));
        }
        if self.drives.contains_key(&drive_id) {
            return Err(format!("Drive ID {} is already in use.", drive_id));
        }

        self.occupied.insert(position);
        self.drives.insert(
            drive_id,
            DriveState {
                id: drive_id,
                position,
                lifted_pod: None,
            },
        );
        self.behaviors.insert(drive_id, behavior);

        self.next_drive_id = self.next_drive_id.max(drive_id + 1);

        Ok(drive_id)
    }

    /// Places a pod on the floor.
    ///
    /// Pods do not block drives: a drive rolls under a pod's cell and lifts
    /// it from there.
    pub fn add_pod(&mut self, position: Position) -> Result<PodId, String> {
        if !self.field.in_bounds(position) {
            return Err(format!("Position {:?} is out of bounds.", position));
        }
        if self.field.is_wall(position) {
            return Err(format!("Cannot place a pod on a wall at {:?}.", position));
        }
        if self.pods.values().any(|pod| pod.position == position) {
            return Err(format!("Position {:?} already holds a pod.", position));
        }
        if self.occupied.contains(&position) {
            log::warn!("placing pod under a drive at {:?}", position);
        }

        let pod_id = self.next_pod_id;
        self.next_pod_id += 1;
        self.pods.insert(
            pod_id,
            PodState {
                id: pod_id,
                position,
                lifted_by: None,
            },
        );
        Ok(pod_id)
    }

    /// Sets the goal cell.
    pub fn set_goal(&mut self, position: Position) -> Result<(), String> {
        if !self.field.in_bounds(position) {
            return Err(format!("Position {:?} is out of bounds.", position));
        }
        if self.field.is_wall(position) {
            return Err(format!("Cannot place the goal on a wall at {:?}.", position));
        }
        self.goal = Some(position);
        Ok(())
    }

    /// Marks an existing pod as the delivery target, switching the episode
    /// to advanced mode.
    pub fn set_target_pod(&mut self, pod_id: PodId) -> Result<(), String> {
        if !self.pods.contains_key(&pod_id) {
            return Err(format!("Pod {} does not exist.", pod_id));
        }
        self.target_pod = Some(pod_id);
        Ok(())
    }

    /// Marks an existing drive as the player drive, whose goal entry ends a
    /// simple-mode episode.
    pub fn set_player_drive(&mut self, drive_id: DriveId) -> Result<(), String> {
        if !self.drives.contains_key(&drive_id) {
            return Err(format!("Drive {} does not exist.", drive_id));
        }
        self.player = Some(drive_id);
        Ok(())
    }

    pub fn field(&self) -> &Field {
        &self.field
    }
    pub fn goal(&self) -> Option<Position> {
        self.goal
    }
    pub fn target_pod(&self) -> Option<PodId> {
        self.target_pod
    }
    pub fn player_drive(&self) -> Option<DriveId> {
        self.player
    }
    pub fn drive_state(&self, drive_id: DriveId) -> Option<&DriveState> {
        self.drives.get(&drive_id)
    }
    pub fn drives(&self) -> impl Iterator<Item = &DriveState> {
        self.drives.values()
    }
    pub fn pods(&self) -> impl Iterator<Item = &PodState> {
        self.pods.values()
    }
    pub fn occupied(&self) -> &HashSet<Position> {
        &self.occupied
    }

    /// An episode is advanced mode exactly when a target pod is configured.
    pub fn advanced_mode(&self) -> bool {
        self.target_pod.is_some()
    }

    /// The `(drive, pod)` lift pairs, ascending by drive id.
    pub fn lifted_pairs(&self) -> Vec<(DriveId, PodId)> {
        let mut pairs: Vec<(DriveId, PodId)> = self
            .pods
            .values()
            .filter_map(|pod| pod.lifted_by.map(|drive| (drive, pod.id)))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Current cell of every pod, ascending by pod id.
    pub fn pod_locations(&self) -> Vec<Position> {
        let mut pods: Vec<(PodId, Position)> = self
            .pods
            .values()
            .map(|pod| (pod.id, pod.position))
            .collect();
        pods.sort_unstable_by_key(|(id, _)| *id);
        pods.into_iter().map(|(_, position)| position).collect()
    }

    /// Where the target pod sits, while it sits: `None` without a target pod
    /// or once some drive has lifted it.
    pub fn target_pod_location(&self) -> Option<Position> {
        self.target_pod
            .and_then(|pod_id| self.pods.get(&pod_id))
            .filter(|pod| pod.lifted_by.is_none())
            .map(|pod| pod.position)
    }

    /// Assembles the sensor snapshot one drive would receive this turn.
    pub fn snapshot_for(&self, drive_id: DriveId) -> Option<SensorSnapshot<'_>> {
        let state = self.drives.get(&drive_id)?;
        Some(SensorSnapshot {
            field_boundaries: self.field.boundaries(),
            drive_locations: &self.occupied,
            pod_locations: self.pod_locations(),
            player_location: state.position,
            goal_location: self.goal,
            target_pod_location: self.target_pod_location(),
            lifted_pairs: self.lifted_pairs(),
        })
    }

    /// Processes one turn: every drive, in ascending id order, is shown its
    /// snapshot and the move it returns is applied.
    ///
    /// A policy error aborts the turn and propagates to the caller; the
    /// simulator terminates the episode on such a failure, with no retries
    /// and no partial recovery. Rejected moves are logged and skipped.
    pub fn process_turn(&mut self) -> Result<MoveOutcome, AgentError> {
        let mut drive_ids: Vec<DriveId> = self.drives.keys().copied().collect();
        drive_ids.sort_unstable();

        for drive_id in drive_ids {
            let Some(position) = self.drives.get(&drive_id).map(|state| state.position) else {
                continue;
            };
            // Owned snapshot pieces are assembled before the behavior is
            // borrowed mutably; the borrowed pieces come from other fields.
            let pod_locations = self.pod_locations();
            let target_pod_location = self.target_pod_location();
            let lifted_pairs = self.lifted_pairs();
            let goal_location = self.goal;

            let Some(behavior) = self.behaviors.get_mut(&drive_id) else {
                continue;
            };
            let snapshot = SensorSnapshot {
                field_boundaries: self.field.boundaries(),
                drive_locations: &self.occupied,
                pod_locations,
                player_location: position,
                goal_location,
                target_pod_location,
                lifted_pairs,
            };
            let mv = match behavior.next_move(&snapshot) {
                Ok(mv) => mv,
                Err(e) => {
                    log::error!("drive {} failed to choose a move: {}", drive_id, e);
                    return Err(e);
                }
            };

            match self.process_move(drive_id, mv) {
                MoveOutcome::Completed => return Ok(MoveOutcome::Completed),
                MoveOutcome::Failure(reason) => {
                    log::debug!("drive {} move {:?} rejected: {}", drive_id, mv, reason);
                }
                MoveOutcome::Success => {}
            }
        }
        Ok(MoveOutcome::Success)
    }

    /// Applies a single move for a given drive.
    pub fn process_move(&mut self, drive_id: DriveId, mv: DriveMove) -> MoveOutcome {
        let Some(state) = self.drives.get_mut(&drive_id) else {
            return MoveOutcome::Failure(format!("Drive {} not found.", drive_id));
        };

        // The four movement variants resolve to a destination cell; the
        // rest act in place.
        if let Some(target) = mv.applied_to(state.position) {
            if !self.field.in_bounds(target) {
                return MoveOutcome::Failure("Target position is out of bounds.".to_string());
            }
            if self.field.is_wall(target) {
                return MoveOutcome::Failure("Cannot move into a wall.".to_string());
            }
            if self.occupied.contains(&target) {
                return MoveOutcome::Failure(
                    "Target position is occupied by another drive.".to_string(),
                );
            }

            // Move succeeds: update the occupied set and the drive, and
            // carry a lifted pod along.
            self.occupied.remove(&state.position);
            self.occupied.insert(target);
            state.position = target;
            if let Some(pod_id) = state.lifted_pod {
                if let Some(pod) = self.pods.get_mut(&pod_id) {
                    pod.position = target;
                }
            }

            if self.target_pod.is_none()
                && self.player == Some(drive_id)
                && self.goal == Some(target)
            {
                log::info!("drive {} reached the goal at {:?}", drive_id, target);
                return MoveOutcome::Completed;
            }
            return MoveOutcome::Success;
        }

        match mv {
            DriveMove::LiftPod => {
                if self.target_pod.is_none() {
                    return MoveOutcome::Failure(
                        "LiftPod is only valid in advanced mode.".to_string(),
                    );
                }
                if state.lifted_pod.is_some() {
                    return MoveOutcome::Failure("Drive is already lifting a pod.".to_string());
                }
                let here = state.position;
                let pod = self
                    .pods
                    .values_mut()
                    .find(|pod| pod.position == here && pod.lifted_by.is_none());
                match pod {
                    Some(pod) => {
                        pod.lifted_by = Some(drive_id);
                        state.lifted_pod = Some(pod.id);
                        log::info!("drive {} lifted pod {} at {:?}", drive_id, pod.id, here);
                        MoveOutcome::Success
                    }
                    None => MoveOutcome::Failure(format!("No pod to lift at {:?}.", here)),
                }
            }
            DriveMove::DropPod => {
                if self.target_pod.is_none() {
                    return MoveOutcome::Failure(
                        "DropPod is only valid in advanced mode.".to_string(),
                    );
                }
                let Some(pod_id) = state.lifted_pod.take() else {
                    return MoveOutcome::Failure("Drive is not lifting a pod.".to_string());
                };
                let here = state.position;
                if let Some(pod) = self.pods.get_mut(&pod_id) {
                    pod.lifted_by = None;
                    pod.position = here;
                }

                if self.target_pod == Some(pod_id) && self.goal == Some(here) {
                    log::info!(
                        "drive {} delivered pod {} to the goal at {:?}",
                        drive_id,
                        pod_id,
                        here
                    );
                    return MoveOutcome::Completed;
                }
                log::info!("drive {} dropped pod {} at {:?}", drive_id, pod_id, here);
                MoveOutcome::Success
            }
            // DriveMove::None; the movement variants never reach here.
            _ => MoveOutcome::Success,
        }
    }
}

/// Loads a warehouse from a string representation of a map.
///
/// Rows are whitespace-separated two-letter tokens; the first line is the
/// top of the field (highest y, since `Up` is the positive y direction).
/// Tokens: `BL` floor, `WL` wall, `ST` player start (exactly one), `DR`
/// traffic-drive start, `GO` goal, `PD` pod, `TP` target pod.
///
/// Returns the warehouse, the player start cell and the traffic-drive start
/// cells; the caller attaches drive behaviors.
pub fn load_warehouse_from_string(
    map_string: &str,
) -> Result<(Warehouse, Position, Vec<Position>), String> {
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.is_empty() {
        return Err("Map string is empty.".to_string());
    }

    let height = lines.len();
    let mut width = 0;
    let mut parsed_rows: Vec<Vec<&str>> = Vec::with_capacity(height);

    for (row, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.trim().split_whitespace().collect();
        if row == 0 {
            width = tokens.len();
            if width == 0 {
                return Err("Map has zero width.".to_string());
            }
        } else if tokens.len() != width {
            return Err(format!(
                "Inconsistent width at row {}: expected {}, found {}",
                row,
                width,
                tokens.len()
            ));
        }
        parsed_rows.push(tokens);
    }

    let mut field = Field::new(width as i32, height as i32).map_err(|e| e.to_string())?;
    let mut start_position: Option<Position> = None;
    let mut traffic: Vec<Position> = Vec::new();
    let mut pods: Vec<(Position, bool)> = Vec::new();
    let mut goal: Option<Position> = None;
    let mut target_seen = false;

    for (row, row_tokens) in parsed_rows.iter().enumerate() {
        for (col, token) in row_tokens.iter().enumerate() {
            let pos = Position {
                x: col as i32,
                y: (height - 1 - row) as i32,
            };
            match *token {
                "BL" => {}
                "WL" => field.add_wall(pos).map_err(|e| e.to_string())?,
                "ST" => {
                    if start_position.is_some() {
                        return Err("Multiple start positions ('ST') found.".to_string());
                    }
                    start_position = Some(pos);
                }
                "DR" => traffic.push(pos),
                "GO" => {
                    if goal.is_some() {
                        return Err("Multiple goals ('GO') found.".to_string());
                    }
                    goal = Some(pos);
                }
                "PD" => pods.push((pos, false)),
                "TP" => {
                    if target_seen {
                        return Err("Multiple target pods ('TP') found.".to_string());
                    }
                    target_seen = true;
                    pods.push((pos, true));
                }
                unknown => {
                    return Err(format!(
                        "Unknown map code '{}' at row {}, column {}.",
                        unknown, row, col
                    ));
                }
            }
        }
    }

    let start =
        start_position.ok_or_else(|| "No start position ('ST') found in map.".to_string())?;

    let mut warehouse = Warehouse::new(field);
    if let Some(goal) = goal {
        warehouse.set_goal(goal)?;
    }
    for (cell, is_target) in pods {
        let pod_id = warehouse.add_pod(cell)?;
        if is_target {
            warehouse.set_target_pod(pod_id)?;
        }
    }

    Ok((warehouse, start, traffic))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::agent::PathAgent;

    fn pos(x: i32, y: i32) -> Position {
        Position { x, y }
    }

    fn open_warehouse(width: i32, height: i32) -> Warehouse {
        Warehouse::new(Field::new(width, height).unwrap())
    }

    /// A drive that stays put forever.
    struct Parked(DriveId);

    impl Drive for Parked {
        fn id(&self) -> DriveId {
            self.0
        }
        fn next_move(&mut self, _snapshot: &SensorSnapshot) -> Result<DriveMove, AgentError> {
            Ok(DriveMove::None)
        }
    }

    /// A drive that replays a fixed move sequence, then stays put.
    struct Scripted {
        id: DriveId,
        moves: VecDeque<DriveMove>,
    }

    impl Scripted {
        fn new(id: DriveId, moves: &[DriveMove]) -> Self {
            Scripted {
                id,
                moves: moves.iter().copied().collect(),
            }
        }
    }

    impl Drive for Scripted {
        fn id(&self) -> DriveId {
            self.id
        }
        fn next_move(&mut self, _snapshot: &SensorSnapshot) -> Result<DriveMove, AgentError> {
            Ok(self.moves.pop_front().unwrap_or(DriveMove::None))
        }
    }

    #[test]
    fn add_drive_validates_position_and_id() {
        let mut warehouse = open_warehouse(3, 3);
        let first = warehouse.add_drive(pos(0, 0), Box::new(Parked(0))).unwrap();
        assert_eq!(first, 0);

        let occupied = warehouse.add_drive(pos(0, 0), Box::new(Parked(1)));
        assert!(occupied.unwrap_err().contains("occupied"));

        let outside = warehouse.add_drive(pos(-1, 0), Box::new(Parked(1)));
        assert!(outside.unwrap_err().contains("out of bounds"));

        let duplicate = warehouse.add_drive(pos(1, 1), Box::new(Parked(0)));
        assert!(duplicate.unwrap_err().contains("already in use"));
    }

    #[test]
    fn add_pod_validates_position() {
        let mut warehouse = open_warehouse(3, 3);
        warehouse.add_pod(pos(1, 1)).unwrap();
        assert!(warehouse.add_pod(pos(1, 1)).is_err());
        assert!(warehouse.add_pod(pos(5, 5)).is_err());
    }

    #[test]
    fn movement_rejects_walls_boundaries_and_drives() {
        let mut field = Field::new(3, 3).unwrap();
        field.add_wall(pos(1, 0)).unwrap();
        let mut warehouse = Warehouse::new(field);
        let mover = warehouse.add_drive(pos(0, 0), Box::new(Parked(0))).unwrap();
        warehouse.add_drive(pos(0, 1), Box::new(Parked(1))).unwrap();

        // Boxed in: wall right, drive above, boundary left and below.
        for (mv, reason) in [
            (DriveMove::Right, "wall"),
            (DriveMove::Up, "occupied by another drive"),
            (DriveMove::Left, "out of bounds"),
            (DriveMove::Down, "out of bounds"),
        ] {
            match warehouse.process_move(mover, mv) {
                MoveOutcome::Failure(message) => assert!(
                    message.contains(reason),
                    "{:?}: {} should mention {}",
                    mv,
                    message,
                    reason
                ),
                other => panic!("{:?} should be rejected, got {:?}", mv, other),
            }
        }
        assert_eq!(warehouse.drive_state(mover).unwrap().position, pos(0, 0));
        assert!(warehouse.occupied().contains(&pos(0, 0)));

        // The drive above is free to move away.
        assert_eq!(
            warehouse.process_move(1, DriveMove::Up),
            MoveOutcome::Success
        );
        assert_eq!(warehouse.drive_state(1).unwrap().position, pos(0, 2));
        assert!(!warehouse.occupied().contains(&pos(0, 1)));
    }

    #[test]
    fn lift_carry_drop_delivers_target_pod() {
        let mut warehouse = open_warehouse(3, 3);
        let pod = warehouse.add_pod(pos(1, 0)).unwrap();
        warehouse.set_target_pod(pod).unwrap();
        warehouse.set_goal(pos(2, 2)).unwrap();
        let drive = warehouse.add_drive(pos(1, 0), Box::new(Parked(0))).unwrap();

        assert_eq!(
            warehouse.process_move(drive, DriveMove::LiftPod),
            MoveOutcome::Success
        );
        let snapshot = warehouse.snapshot_for(drive).unwrap();
        assert_eq!(snapshot.lifted_pairs, vec![(drive, pod)]);
        assert_eq!(snapshot.target_pod_location, None);

        // The lifted pod travels with the drive.
        assert_eq!(
            warehouse.process_move(drive, DriveMove::Up),
            MoveOutcome::Success
        );
        assert_eq!(
            warehouse.pods().find(|p| p.id == pod).unwrap().position,
            pos(1, 1)
        );

        warehouse.process_move(drive, DriveMove::Up);
        warehouse.process_move(drive, DriveMove::Right);
        assert_eq!(
            warehouse.process_move(drive, DriveMove::DropPod),
            MoveOutcome::Completed
        );
        let dropped = warehouse.pods().find(|p| p.id == pod).unwrap();
        assert_eq!(dropped.position, pos(2, 2));
        assert_eq!(dropped.lifted_by, None);
    }

    #[test]
    fn lift_requires_advanced_mode_and_a_pod() {
        // Simple mode: lifting is rejected even on a pod cell.
        let mut simple = open_warehouse(3, 3);
        simple.add_pod(pos(0, 0)).unwrap();
        let drive = simple.add_drive(pos(0, 0), Box::new(Parked(0))).unwrap();
        match simple.process_move(drive, DriveMove::LiftPod) {
            MoveOutcome::Failure(message) => assert!(message.contains("advanced mode")),
            other => panic!("expected failure, got {:?}", other),
        }

        // Advanced mode, but no pod under the drive.
        let mut advanced = open_warehouse(3, 3);
        let target = advanced.add_pod(pos(2, 2)).unwrap();
        advanced.set_target_pod(target).unwrap();
        let drive = advanced.add_drive(pos(0, 0), Box::new(Parked(0))).unwrap();
        match advanced.process_move(drive, DriveMove::LiftPod) {
            MoveOutcome::Failure(message) => assert!(message.contains("No pod to lift")),
            other => panic!("expected failure, got {:?}", other),
        }

        // A non-target pod may be lifted, and dropping it on the goal does
        // not complete the episode.
        let other = advanced.add_pod(pos(0, 0)).unwrap();
        advanced.set_goal(pos(0, 0)).unwrap();
        assert_eq!(
            advanced.process_move(drive, DriveMove::LiftPod),
            MoveOutcome::Success
        );
        assert_eq!(
            advanced.process_move(drive, DriveMove::DropPod),
            MoveOutcome::Success
        );
        assert_eq!(
            advanced.pods().find(|p| p.id == other).unwrap().lifted_by,
            None
        );
    }

    #[test]
    fn drop_requires_a_lifted_pod() {
        let mut warehouse = open_warehouse(3, 3);
        let pod = warehouse.add_pod(pos(2, 2)).unwrap();
        warehouse.set_target_pod(pod).unwrap();
        let drive = warehouse.add_drive(pos(0, 0), Box::new(Parked(0))).unwrap();
        match warehouse.process_move(drive, DriveMove::DropPod) {
            MoveOutcome::Failure(message) => assert!(message.contains("not lifting")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn simple_mode_completes_when_player_reaches_goal() {
        let mut warehouse = open_warehouse(3, 3);
        warehouse.set_goal(pos(1, 0)).unwrap();
        let player = warehouse.add_drive(pos(0, 0), Box::new(Parked(0))).unwrap();
        let other = warehouse.add_drive(pos(1, 1), Box::new(Parked(1))).unwrap();
        warehouse.set_player_drive(player).unwrap();

        // A non-player drive crossing the goal does not end the episode.
        assert_eq!(
            warehouse.process_move(other, DriveMove::Down),
            MoveOutcome::Success
        );
        assert_eq!(
            warehouse.process_move(other, DriveMove::Up),
            MoveOutcome::Success
        );

        assert_eq!(
            warehouse.process_move(player, DriveMove::Right),
            MoveOutcome::Completed
        );
    }

    #[test]
    fn snapshot_reports_field_and_drives() {
        let mut warehouse = open_warehouse(3, 2);
        warehouse.set_goal(pos(2, 0)).unwrap();
        warehouse.add_pod(pos(1, 1)).unwrap();
        let drive = warehouse.add_drive(pos(0, 0), Box::new(Parked(0))).unwrap();
        warehouse.add_drive(pos(2, 1), Box::new(Parked(1))).unwrap();

        let snapshot = warehouse.snapshot_for(drive).unwrap();
        assert_eq!(snapshot.player_location, pos(0, 0));
        assert_eq!(snapshot.drive_locations.len(), 2);
        assert!(snapshot.drive_locations.contains(&pos(0, 0)));
        assert!(snapshot.drive_locations.contains(&pos(2, 1)));
        assert!(snapshot.field_boundaries.contains(&pos(-1, -1)));
        assert_eq!(snapshot.pod_locations, vec![pos(1, 1)]);
        assert_eq!(snapshot.goal_location, Some(pos(2, 0)));
        assert_eq!(snapshot.target_pod_location, None);
        assert!(snapshot.lifted_pairs.is_empty());

        assert!(warehouse.snapshot_for(99).is_none());
    }

    #[test]
    fn turn_order_is_ascending_drive_id() {
        let mut warehouse = open_warehouse(3, 1);
        warehouse
            .add_drive(pos(0, 0), Box::new(Scripted::new(0, &[DriveMove::Right])))
            .unwrap();
        warehouse
            .add_drive(pos(2, 0), Box::new(Scripted::new(1, &[DriveMove::Left])))
            .unwrap();

        // Both aim for (1, 0); the lower id moves first and wins the cell.
        assert_eq!(warehouse.process_turn().unwrap(), MoveOutcome::Success);
        assert_eq!(warehouse.drive_state(0).unwrap().position, pos(1, 0));
        assert_eq!(warehouse.drive_state(1).unwrap().position, pos(2, 0));
    }

    #[test]
    fn process_turn_runs_path_agent_to_completion() {
        let mut warehouse = open_warehouse(3, 1);
        warehouse.set_goal(pos(2, 0)).unwrap();
        let player = warehouse
            .add_drive(pos(0, 0), Box::new(PathAgent::new(0, false)))
            .unwrap();
        warehouse.set_player_drive(player).unwrap();

        assert_eq!(warehouse.process_turn().unwrap(), MoveOutcome::Success);
        assert_eq!(warehouse.drive_state(player).unwrap().position, pos(1, 0));
        assert_eq!(warehouse.process_turn().unwrap(), MoveOutcome::Completed);
        assert_eq!(warehouse.drive_state(player).unwrap().position, pos(2, 0));
    }

    #[test]
    fn process_turn_delivers_in_advanced_mode() {
        let mut warehouse = open_warehouse(2, 2);
        let pod = warehouse.add_pod(pos(1, 0)).unwrap();
        warehouse.set_target_pod(pod).unwrap();
        warehouse.set_goal(pos(0, 1)).unwrap();
        let player = warehouse
            .add_drive(pos(0, 0), Box::new(PathAgent::new(0, true)))
            .unwrap();
        warehouse.set_player_drive(player).unwrap();

        // Right to the pod, lift, left then up to the goal, drop.
        for _ in 0..4 {
            assert_eq!(warehouse.process_turn().unwrap(), MoveOutcome::Success);
        }
        assert_eq!(warehouse.process_turn().unwrap(), MoveOutcome::Completed);

        let delivered = warehouse.pods().find(|p| p.id == pod).unwrap();
        assert_eq!(delivered.position, pos(0, 1));
        assert_eq!(delivered.lifted_by, None);
    }

    #[test]
    fn process_turn_propagates_policy_failure() {
        // No goal configured: the path agent's failure reaches the caller.
        let mut warehouse = open_warehouse(2, 2);
        warehouse
            .add_drive(pos(0, 0), Box::new(PathAgent::new(0, false)))
            .unwrap();

        let err = warehouse.process_turn().unwrap_err();
        assert!(matches!(err, AgentError::Failed { .. }));
        assert!(err.to_string().contains("next_move in PathAgent failed"));
    }

    #[test]
    fn load_parses_tokens_and_geometry() {
        let map = "
            BL TP BL GO
            WL BL BL BL
            ST BL DR PD
        ";
        let (warehouse, start, traffic) = load_warehouse_from_string(map).unwrap();

        assert_eq!(warehouse.field().width(), 4);
        assert_eq!(warehouse.field().height(), 3);
        assert_eq!(start, pos(0, 0));
        assert_eq!(traffic, vec![pos(2, 0)]);
        assert_eq!(warehouse.goal(), Some(pos(3, 2)));
        assert!(warehouse.advanced_mode());
        assert_eq!(warehouse.target_pod_location(), Some(pos(1, 2)));
        assert!(warehouse.field().is_wall(pos(0, 1)));
        assert!(warehouse.field().boundaries().contains(&pos(0, 1)));
        assert_eq!(warehouse.pods().count(), 2);
    }

    #[test]
    fn loader_rejects_malformed_maps() {
        for (map, fragment) in [
            ("", "empty"),
            ("ST BL\nBL", "Inconsistent width"),
            ("ST XX", "Unknown map code"),
            ("BL BL", "No start position"),
            ("ST ST", "Multiple start positions"),
            ("ST GO GO", "Multiple goals"),
            ("ST TP TP", "Multiple target pods"),
        ] {
            let err = load_warehouse_from_string(map).unwrap_err();
            assert!(
                err.contains(fragment),
                "map {:?}: {} should mention {}",
                map,
                err,
                fragment
            );
        }
    }
}

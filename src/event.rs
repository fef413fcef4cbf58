use crate::common::{Direction, NodeId, Rgb, TrackId, TrainId, TrainKind};
use crate::simulation::geometry::Point;
use bevy::prelude::Message;

/// Logical commands produced by the input layer
#[derive(Message, Clone, Debug, PartialEq)]
pub enum SimulationCommand {
    ToggleTrack(TrackId),
    CycleSwitch(NodeId, Direction),
    ToggleSignal(NodeId, Direction),
    SpawnTrain { node: NodeId, color: Rgb, car_count: usize },
    SpawnMaintenanceTrain(NodeId),
    SetConstructionMode(bool),
    SaveScenario,
}

/// What happened during a tick
#[derive(Message, Clone, Debug, PartialEq)]
pub enum SimulationUpdate {
    TrainSpawned {
        train: TrainId,
        node: NodeId,
        color: Rgb,
        kind: TrainKind,
        car_count: usize,
    },
    TrainReversed { train: TrainId, node: NodeId },
    CarRetired { train: TrainId, node: NodeId },
    TrainArrived { train: TrainId, node: NodeId },
    TrainCrashed(TrainId),
    WreckCleared { by: TrainId, at: Point },
    TrainRemoved(TrainId),
}

/// Pointer press on the canvas, translated into a command by the simulation
#[derive(Message, Clone, Debug, PartialEq)]
pub struct CanvasClick {
    pub point: Point,
    pub secondary: bool,
}

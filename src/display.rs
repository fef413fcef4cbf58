//! Per-tick view of the simulation for a rendering front end, and the reverse
//! path turning canvas clicks into simulation commands.

use crate::common::{Direction, NodeId, Rgb, TrackId, TrainId};
use crate::event::SimulationCommand;
use crate::simulation::engine::Simulation;
use crate::simulation::geometry::{Point, node_at, node_center, switch_arrow, track_at, track_color, travel_position};
use crate::simulation::graph::{TrackGraph, TrackKind};
use bevy::prelude::*;

pub const STATION_RADIUS: f64 = 8.0;
pub const TERMINAL_RADIUS: f64 = 5.0;
const SPAWN_CLICK_RADIUS: f64 = 10.0;
const ARROW_CLICK_RADIUS: f64 = 20.0;
const SIGNAL_CLICK_RADIUS: f64 = 10.0;
/// Arrow tips sit `cell_size / ARROW_REACH` away from the node centre
const ARROW_REACH: i32 = 3;
const SIGNAL_REACH: i32 = 8;
const CLICK_CAR_COUNT: usize = 2;

pub const SIGNAL_COLOR_OPEN: Rgb = Rgb(0, 255, 0);
pub const SIGNAL_COLOR_CLOSED: Rgb = Rgb(255, 0, 0);
pub const ARROW_COLOR: Rgb = Rgb(255, 0, 0);
pub const LOCKED_COLOR: Rgb = Rgb(200, 200, 200);

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchView {
    pub direction: Direction,
    pub vector: (f64, f64),
    pub color: Rgb,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SignalView {
    pub direction: Direction,
    pub color: Rgb,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeView {
    pub id: NodeId,
    pub center: Point,
    pub color: Rgb,
    /// Marker radius, absent for plain junctions
    pub radius: Option<f64>,
    pub switches: Vec<SwitchView>,
    pub signals: Vec<SignalView>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackView {
    pub id: TrackId,
    pub kind: TrackKind,
    pub from: Point,
    pub to: Point,
    pub occupied: bool,
    pub color: Rgb,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CarView {
    pub train: TrainId,
    pub position: Point,
    pub radius: f64,
    pub color: Rgb,
    pub is_head: bool,
}

#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub construction_mode: bool,
    pub nodes: Vec<NodeView>,
    pub tracks: Vec<TrackView>,
    pub cars: Vec<CarView>,
    pub wrecks: Vec<Point>,
    /// Collisions registered during the last tick
    pub crashes: u32,
    /// Checkpoints claimed during the last tick, for debug overlays
    pub claims: Vec<(Point, TrainId)>,
}

fn node_view(graph: &TrackGraph, id: NodeId, cell_size: i32, construction_mode: bool) -> NodeView {
    let node = graph.node(id);
    let radius = if node.is_station {
        Some(STATION_RADIUS)
    } else if graph.is_terminal(id) {
        Some(TERMINAL_RADIUS)
    } else {
        None
    };

    let mut switches = Vec::new();
    let mut signals = Vec::new();
    if !construction_mode {
        for direction in Direction::ALL {
            let locked = node.is_direction_blocked(direction);
            if graph.enabled_count(id, direction) > 1 {
                if let Some(track) = graph.active_track(id, direction) {
                    switches.push(SwitchView {
                        direction,
                        vector: switch_arrow(graph, track, id),
                        color: if locked { LOCKED_COLOR } else { ARROW_COLOR },
                    });
                }
            } else if graph.has_signal(id, direction) {
                let color = match (locked, graph.is_signal_open(id, direction)) {
                    (true, _) => LOCKED_COLOR,
                    (false, true) => SIGNAL_COLOR_OPEN,
                    (false, false) => SIGNAL_COLOR_CLOSED,
                };
                signals.push(SignalView { direction, color });
            }
        }
    }

    NodeView {
        id,
        center: node_center(graph, id, cell_size),
        color: node.color,
        radius,
        switches,
        signals,
    }
}

impl Snapshot {
    /// Everything a front end draws this frame. `hover` is the pointer
    /// position used for track highlighting.
    pub fn capture(simulation: &Simulation, hover: Option<Point>) -> Snapshot {
        let graph = simulation.graph();
        let cell_size = simulation.config().cell_size;
        let car_radius = simulation.config().car_radius;
        let construction_mode = simulation.construction_mode();
        let hovered = hover.and_then(|point| track_at(graph, point, cell_size, construction_mode));

        let nodes = graph
            .nodes()
            .map(|(id, _)| node_view(graph, id, cell_size, construction_mode))
            .collect();
        let tracks = graph
            .tracks()
            .filter(|(_, track)| construction_mode || track.enabled)
            .map(|(id, track)| TrackView {
                id,
                kind: track.kind,
                from: node_center(graph, track.node1, cell_size),
                to: node_center(graph, track.node2, cell_size),
                occupied: track.occupied,
                color: track_color(track, hovered == Some(id), construction_mode),
            })
            .collect();
        let cars = simulation
            .trains()
            .iter()
            .filter(|train| train.active)
            .flat_map(|train| {
                train.active_cars().filter_map(move |car| {
                    let track = car.current_track?;
                    Some(CarView {
                        train: train.id,
                        position: travel_position(graph, track, car.start_node, car.progress, cell_size),
                        radius: car_radius,
                        color: train.color,
                        is_head: car.is_head,
                    })
                })
            })
            .collect();

        Snapshot {
            construction_mode,
            nodes,
            tracks,
            cars,
            wrecks: simulation.detector().wreck_points().collect(),
            crashes: simulation.detector().crashes(),
            claims: simulation.detector().claimed_points().collect(),
        }
    }
}

fn handle_offset(graph: &TrackGraph, node: NodeId, direction: Direction, cell_size: i32, reach: i32) -> Point {
    let center = node_center(graph, node, cell_size);
    let (dx, dy) = direction.vector();
    Point::new(
        center.x + (dx * cell_size / reach) as f64,
        center.y + (dy * cell_size / reach) as f64,
    )
}

/// Translates a canvas click into a command. The primary button toggles
/// tracks while building and throws switches or signals while running;
/// the secondary button spawns a train at a terminal node.
pub fn command_at(simulation: &Simulation, point: Point, secondary: bool) -> Option<SimulationCommand> {
    let graph = simulation.graph();
    let cell_size = simulation.config().cell_size;

    if simulation.construction_mode() {
        return if secondary {
            None
        } else {
            track_at(graph, point, cell_size, true).map(SimulationCommand::ToggleTrack)
        };
    }

    if secondary {
        let node = node_at(graph, point, cell_size, SPAWN_CLICK_RADIUS).filter(|&node| graph.is_terminal(node))?;
        return Some(SimulationCommand::SpawnTrain {
            node,
            color: graph.node(node).color,
            car_count: CLICK_CAR_COUNT,
        });
    }

    graph.nodes().find_map(|(id, node)| {
        Direction::ALL.into_iter().find_map(|direction| {
            if node.is_direction_blocked(direction) {
                return None;
            }
            if graph.enabled_count(id, direction) > 1 {
                let tip = handle_offset(graph, id, direction, cell_size, ARROW_REACH);
                (tip.distance(&point) < ARROW_CLICK_RADIUS).then_some(SimulationCommand::CycleSwitch(id, direction))
            } else if graph.has_signal(id, direction) {
                let lamp = handle_offset(graph, id, direction, cell_size, SIGNAL_REACH);
                (lamp.distance(&point) < SIGNAL_CLICK_RADIUS).then_some(SimulationCommand::ToggleSignal(id, direction))
            } else {
                None
            }
        })
    })
}

use crate::common::{Rgb, TrainKind};
use crate::config::SimulationConfig;
use crate::simulation::engine::Simulation;
use crate::simulation::graph::{CurveOrientation, TrackGraph, TrackKind};
use crate::simulation::train::Train;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Consist size given to trains restored from a scenario document
const RESTORED_CAR_COUNT: usize = 2;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot access scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed scenario document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("node ({0}, {1}) lies outside the grid")]
    NodeOutOfBounds(i32, i32),
    #[error("no {kind} track between {from:?} and {to:?}")]
    UnknownTrack { from: (i32, i32), to: (i32, i32), kind: String },
    #[error("unknown track kind {0:?}")]
    UnknownKind(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum TrackType {
    #[serde(rename = "straight", alias = "Track")]
    Straight,
    #[serde(rename = "curved", alias = "CurvedTrack")]
    Curved,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeRecord {
    pub x: i32,
    pub y: i32,
    pub color: Rgb,
    #[serde(default)]
    pub is_station: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackRecord {
    pub node1: (i32, i32),
    pub node2: (i32, i32),
    pub enabled: bool,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    /// Curve orientation tag, empty for straight tracks
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrainRecord {
    pub start_node: (i32, i32),
    pub color: Rgb,
    pub progress: f64,
    pub is_active: bool,
    #[serde(default)]
    pub kind: TrainKind,
}

/// Human-readable snapshot of the layout and the trains on it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ScenarioDocument {
    pub nodes: Vec<NodeRecord>,
    pub tracks: Vec<TrackRecord>,
    pub trains: Vec<TrainRecord>,
    pub construction_mode: bool,
}

fn orientation_tag(orientation: CurveOrientation) -> &'static str {
    match orientation {
        CurveOrientation::Horizontal => "hor",
        CurveOrientation::Vertical => "vert",
    }
}

impl TrackRecord {
    fn kind(&self) -> Result<TrackKind, ScenarioError> {
        match (self.track_type, self.direction.as_str()) {
            (TrackType::Straight, _) => Ok(TrackKind::Straight),
            (TrackType::Curved, "hor") => Ok(TrackKind::Curved(CurveOrientation::Horizontal)),
            (TrackType::Curved, "vert") => Ok(TrackKind::Curved(CurveOrientation::Vertical)),
            (TrackType::Curved, other) => Err(ScenarioError::UnknownKind(other.to_string())),
        }
    }
}

fn node_at(graph: &TrackGraph, (x, y): (i32, i32)) -> Result<usize, ScenarioError> {
    graph.node_id(x, y).ok_or(ScenarioError::NodeOutOfBounds(x, y))
}

impl ScenarioDocument {
    pub fn capture(simulation: &Simulation) -> ScenarioDocument {
        let graph = simulation.graph();
        let coords = |id: usize| {
            let node = graph.node(id);
            (node.x, node.y)
        };

        let nodes = graph
            .nodes()
            .map(|(_, node)| NodeRecord {
                x: node.x,
                y: node.y,
                color: node.color,
                is_station: node.is_station,
            })
            .collect();
        let tracks = graph
            .tracks()
            .map(|(_, track)| {
                let (track_type, direction) = match track.kind {
                    TrackKind::Straight => (TrackType::Straight, ""),
                    TrackKind::Curved(orientation) => (TrackType::Curved, orientation_tag(orientation)),
                };
                TrackRecord {
                    node1: coords(track.node1),
                    node2: coords(track.node2),
                    enabled: track.enabled,
                    track_type,
                    direction: direction.to_string(),
                    blocked: track.blocked,
                }
            })
            .collect();
        let trains = simulation
            .trains()
            .iter()
            .map(|train| TrainRecord {
                start_node: coords(train.origin),
                color: train.color,
                progress: train.head_progress(),
                is_active: train.active,
                kind: train.kind,
            })
            .collect();

        ScenarioDocument {
            nodes,
            tracks,
            trains,
            construction_mode: simulation.construction_mode(),
        }
    }

    /// Rebuilds a simulation on a fresh grid. Nothing is applied unless the
    /// whole document is consistent with the configured grid.
    pub fn build(&self, config: SimulationConfig) -> Result<Simulation, ScenarioError> {
        let mut graph = TrackGraph::new(config.grid_width, config.grid_height);
        for record in &self.nodes {
            let node = graph.node_mut(node_at(&graph, (record.x, record.y))?);
            node.color = record.color;
            node.is_station = record.is_station;
        }
        for record in &self.tracks {
            let kind = record.kind()?;
            let (a, b) = (node_at(&graph, record.node1)?, node_at(&graph, record.node2)?);
            let track = graph.find_track(a, b, kind).ok_or_else(|| ScenarioError::UnknownTrack {
                from: record.node1,
                to: record.node2,
                kind: format!("{:?}", kind),
            })?;
            if record.enabled {
                graph.force_enable(track, record.blocked);
            }
        }

        let mut trains = Vec::new();
        for record in &self.trains {
            let origin = node_at(&graph, record.start_node)?;
            let Some(mut train) = Train::new(0, origin, record.color, record.kind, RESTORED_CAR_COUNT, &graph) else {
                warn!(
                    "Skipping train at ({}, {}): no track leaves the node",
                    record.start_node.0, record.start_node.1
                );
                continue;
            };
            if let Some(head) = train.cars.first_mut() {
                head.progress = record.progress.clamp(0.0, 1.0 - 1e-9);
            }
            train.active = record.is_active;
            trains.push(train);
        }

        let mut simulation = Simulation::with_layout(config, graph, self.construction_mode);
        for train in trains {
            simulation.restore_train(train);
        }
        Ok(simulation)
    }

    pub fn from_json(contents: &str) -> Result<ScenarioDocument, ScenarioError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn to_json(&self) -> Result<String, ScenarioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reads a scenario file and builds the simulation it describes
pub fn load_scenario(path: impl AsRef<Path>, config: SimulationConfig) -> Result<Simulation, ScenarioError> {
    let path = path.as_ref();
    let document = ScenarioDocument::from_json(&fs::read_to_string(path)?)?;
    let simulation = document.build(config)?;
    info!(
        "Loaded scenario {} ({} stations, {} trains)",
        path.display(),
        simulation.stations().len(),
        simulation.trains().len()
    );
    Ok(simulation)
}

/// Like `load_scenario`, falling back to a freshly built grid on any error
pub fn load_scenario_or_default(path: impl AsRef<Path>, config: SimulationConfig) -> Simulation {
    let path = path.as_ref();
    match load_scenario(path, config.clone()) {
        Ok(simulation) => simulation,
        Err(err) => {
            warn!("Cannot load scenario {}: {}", path.display(), err);
            Simulation::new(config)
        }
    }
}

pub fn save_scenario(simulation: &Simulation, path: impl AsRef<Path>) -> Result<(), ScenarioError> {
    let path = path.as_ref();
    fs::write(path, ScenarioDocument::capture(simulation).to_json()?)?;
    info!("Saved scenario to {}", path.display());
    Ok(())
}

use crate::common::{Direction, NodeId, Rgb, TrackId, TrainId, TrainKind};
use crate::config::SimulationConfig;
use crate::event::{SimulationCommand, SimulationUpdate};
use crate::simulation::checkpoint::CollisionDetector;
use crate::simulation::graph::TrackGraph;
use crate::simulation::spawner::{Station, assign_stations, plan_random_spawn, stations_in};
use crate::simulation::train::Train;
use bevy::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

const MAINTENANCE_CAR_COUNT: usize = 1;

/// The whole running scenario: network, trains and collision bookkeeping
#[derive(Resource)]
pub struct Simulation {
    config: SimulationConfig,
    graph: TrackGraph,
    stations: Vec<Station>,
    trains: Vec<Train>,
    detector: CollisionDetector,
    rng: StdRng,
    construction_mode: bool,
    next_id: TrainId,
    started: usize,
    tick_count: u64,
    released: Vec<TrainId>,
    updates: Vec<SimulationUpdate>,
}

impl Simulation {
    /// Freshly built grid, all tracks disabled, no stations, construction mode
    pub fn new(config: SimulationConfig) -> Self {
        let graph = TrackGraph::new(config.grid_width, config.grid_height);
        let detector = CollisionDetector::new(
            graph.width(),
            graph.height(),
            config.cell_size,
            config.checkpoint_offset(),
            config.checkpoint_reach(),
        );
        let rng = config.seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Simulation {
            config,
            graph,
            stations: Vec::new(),
            trains: Vec::new(),
            detector,
            rng,
            construction_mode: true,
            next_id: 1,
            started: 0,
            tick_count: 0,
            released: Vec::new(),
            updates: Vec::new(),
        }
    }

    /// Fresh scenario with randomly placed stations
    pub fn with_stations(config: SimulationConfig) -> Self {
        let mut simulation = Simulation::new(config);
        let count = simulation.config.station_count;
        simulation.stations = assign_stations(&mut simulation.graph, count, &mut simulation.rng);
        info!("Assigned {} stations", simulation.stations.len());
        simulation
    }

    /// Restores a prepared layout. Switches and signals start from defaults.
    pub fn with_layout(config: SimulationConfig, mut graph: TrackGraph, construction_mode: bool) -> Self {
        graph.reset_runtime_state();
        let mut simulation = Simulation::new(config);
        simulation.stations = stations_in(&graph);
        simulation.graph = graph;
        simulation.construction_mode = construction_mode;
        simulation
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn graph(&self) -> &TrackGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TrackGraph {
        &mut self.graph
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn trains(&self) -> &[Train] {
        &self.trains
    }

    pub fn train(&self, id: TrainId) -> Option<&Train> {
        self.trains.iter().find(|train| train.id == id)
    }

    pub fn detector(&self) -> &CollisionDetector {
        &self.detector
    }

    pub fn construction_mode(&self) -> bool {
        self.construction_mode
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn set_construction_mode(&mut self, enabled: bool) {
        if self.construction_mode != enabled {
            info!("Construction mode {}", if enabled { "on" } else { "off" });
        }
        self.construction_mode = enabled;
    }

    pub fn toggle_track(&mut self, track: TrackId) -> bool {
        self.construction_mode && track < self.graph.track_count() && self.graph.toggle(track)
    }

    pub fn cycle_switch(&mut self, node: NodeId, direction: Direction) -> bool {
        !self.construction_mode && node < self.graph.node_count() && self.graph.cycle_switch(node, direction)
    }

    pub fn toggle_signal(&mut self, node: NodeId, direction: Direction) -> bool {
        !self.construction_mode && node < self.graph.node_count() && self.graph.toggle_signal(node, direction)
    }

    pub fn spawn_train(&mut self, node: NodeId, color: Rgb, car_count: usize) -> Option<TrainId> {
        if self.construction_mode {
            return None;
        }
        self.spawn(node, color, TrainKind::Regular, car_count)
    }

    /// A single-car craft that clears wrecks and leaves at any station
    pub fn spawn_maintenance_train(&mut self, node: NodeId) -> Option<TrainId> {
        if self.construction_mode || node >= self.graph.node_count() {
            return None;
        }
        let color = self.graph.node(node).color;
        self.spawn(node, color, TrainKind::Craft, MAINTENANCE_CAR_COUNT)
    }

    /// Applies one command from the input layer. Returns whether anything changed.
    pub fn apply(&mut self, command: &SimulationCommand) -> bool {
        match *command {
            SimulationCommand::ToggleTrack(track) => self.toggle_track(track),
            SimulationCommand::CycleSwitch(node, direction) => self.cycle_switch(node, direction),
            SimulationCommand::ToggleSignal(node, direction) => self.toggle_signal(node, direction),
            SimulationCommand::SpawnTrain { node, color, car_count } => self.spawn_train(node, color, car_count).is_some(),
            SimulationCommand::SpawnMaintenanceTrain(node) => self.spawn_maintenance_train(node).is_some(),
            SimulationCommand::SetConstructionMode(enabled) => {
                self.set_construction_mode(enabled);
                true
            }
            SimulationCommand::SaveScenario => false,
        }
    }

    fn spawn(&mut self, node: NodeId, color: Rgb, kind: TrainKind, car_count: usize) -> Option<TrainId> {
        if node >= self.graph.node_count() || !self.graph.is_terminal(node) || self.graph.is_station_busy(node) {
            return None;
        }
        let id = self.next_id;
        let train = Train::new(id, node, color, kind, car_count, &self.graph)?;
        // the egress counts as taken until the next tick recomputes occupancy
        train.occupy_tracks(&mut self.graph);
        self.next_id += 1;
        self.started += 1;
        info!("Spawned train {} ({:?}, {} cars, {}) at node {}", id, kind, car_count, color, node);
        self.updates.push(SimulationUpdate::TrainSpawned {
            train: id,
            node,
            color,
            kind,
            car_count: train.cars.len(),
        });
        self.trains.push(train);
        Some(id)
    }

    /// Adds a train restored from a saved scenario
    pub fn restore_train(&mut self, mut train: Train) -> TrainId {
        train.id = self.next_id;
        self.next_id += 1;
        let id = train.id;
        self.trains.push(train);
        id
    }

    fn random_spawn(&mut self) {
        let active = self.trains.iter().filter(|train| train.active).count();
        let plan = plan_random_spawn(
            &self.stations,
            &self.graph,
            &self.config,
            active,
            self.started,
            &mut self.rng,
        );
        if let Some(plan) = plan {
            self.spawn(plan.node, plan.color, TrainKind::Regular, plan.car_count);
        }
    }

    /// Advances the scenario by one step and returns what happened
    pub fn tick(&mut self) -> Vec<SimulationUpdate> {
        self.tick_count += 1;
        if !self.construction_mode && self.config.auto_spawn {
            self.random_spawn();
        }

        self.graph.clear_transient();
        self.detector.clear();

        for train in &mut self.trains {
            train.update(&self.graph, &self.config, &mut self.updates);
            train.occupy_tracks(&mut self.graph);
        }
        for train in &self.trains {
            train.report_positions(&self.graph, &mut self.detector, self.config.cell_size);
        }

        self.resolve_collisions();
        self.compact();
        std::mem::take(&mut self.updates)
    }

    fn resolve_collisions(&mut self) {
        let report = self.detector.take_report();
        for id in report.crashed {
            if let Some(train) = self.trains.iter_mut().find(|train| train.id == id && !train.crashed) {
                train.crashed = true;
                warn!("Train {} crashed", id);
                self.updates.push(SimulationUpdate::TrainCrashed(id));
            }
        }
        for (by, at) in report.cleared {
            info!("Train {} cleared the wreck at ({}, {})", by, at.x, at.y);
            self.updates.push(SimulationUpdate::WreckCleared { by, at });
        }
        self.released.extend(report.released);
    }

    /// Drops trains that finished or whose wreck was cleared
    fn compact(&mut self) {
        let released = std::mem::take(&mut self.released);
        let updates = &mut self.updates;
        self.trains.retain(|train| {
            let keep = train.active && !released.contains(&train.id);
            if !keep {
                debug!("Removing train {}", train.id);
                updates.push(SimulationUpdate::TrainRemoved(train.id));
            }
            keep
        });
    }
}

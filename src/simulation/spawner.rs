use crate::common::{NodeId, Rgb, TrackId};
use crate::config::SimulationConfig;
use crate::simulation::graph::TrackGraph;
use bevy::prelude::*;
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

/// Identity colors handed out to stations, one per station
pub const STATION_COLORS: [Rgb; 10] = [
    Rgb(230, 25, 75),
    Rgb(60, 180, 75),
    Rgb(0, 130, 200),
    Rgb(245, 130, 48),
    Rgb(145, 30, 180),
    Rgb(70, 240, 240),
    Rgb(240, 50, 230),
    Rgb(210, 245, 60),
    Rgb(128, 0, 0),
    Rgb(0, 0, 128),
];

#[derive(Clone, Debug, PartialEq)]
pub struct Station {
    pub node: NodeId,
    pub color: Rgb,
    /// The single enabled and blocked track leaving the station
    pub egress: TrackId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnPlan {
    pub node: NodeId,
    pub color: Rgb,
    pub car_count: usize,
}

/// Turns a random sample of perimeter nodes into stations. Each one gets an
/// egress leading towards the interior when the grid allows it.
pub fn assign_stations(graph: &mut TrackGraph, count: usize, rng: &mut impl Rng) -> Vec<Station> {
    let mut perimeter: Vec<NodeId> = graph
        .nodes()
        .map(|(id, _)| id)
        .filter(|&id| graph.is_perimeter(id))
        .collect();
    perimeter.shuffle(rng);

    let mut colors = STATION_COLORS.to_vec();
    colors.shuffle(rng);

    let mut stations = Vec::new();
    for node in perimeter {
        if stations.len() >= count {
            break;
        }
        if graph.enabled_count_total(node) > 0 {
            continue;
        }
        let Some(&color) = colors.get(stations.len()) else {
            warn!("Ran out of station colors after {} stations", stations.len());
            break;
        };
        graph.node_mut(node).is_station = true;
        match open_egress(graph, node, rng) {
            Some(egress) => {
                graph.node_mut(node).color = color;
                info!("Station {} at ({}, {})", color, graph.node(node).x, graph.node(node).y);
                stations.push(Station { node, color, egress });
            }
            None => graph.node_mut(node).is_station = false,
        }
    }
    stations
}

fn open_egress(graph: &mut TrackGraph, node: NodeId, rng: &mut impl Rng) -> Option<TrackId> {
    let mut candidates: Vec<TrackId> = graph.node(node).slots().flatten().copied().collect();
    candidates.shuffle(rng);
    // interior-bound tracks first, stable so the shuffle still picks among them
    candidates.sort_by_key(|&id| graph.is_perimeter(graph.track(id).other_node(node)));

    let egress = candidates.into_iter().find(|&id| {
        let other = graph.track(id).other_node(node);
        !graph.node(other).is_station && graph.toggle(id)
    })?;
    graph.track_mut(egress).blocked = true;
    Some(egress)
}

/// Recovers station records from a graph whose nodes already carry the flag
pub fn stations_in(graph: &TrackGraph) -> Vec<Station> {
    graph
        .nodes()
        .filter(|(_, node)| node.is_station)
        .filter_map(|(id, node)| {
            graph.first_enabled_track(id).map(|egress| Station {
                node: id,
                color: node.color,
                egress,
            })
        })
        .collect()
}

/// Rolls the per-tick random spawn. The chance halves with every active
/// train and only the first few stations are used until enough trains ran.
pub fn plan_random_spawn(
    stations: &[Station],
    graph: &TrackGraph,
    config: &SimulationConfig,
    active_trains: usize,
    started: usize,
    rng: &mut impl Rng,
) -> Option<SpawnPlan> {
    if stations.len() < 2 {
        return None;
    }
    let probability = config.spawn_probability * config.spawn_decay.powi(active_trains as i32);
    if !rng.random_bool(probability.clamp(0.0, 1.0)) {
        return None;
    }

    let eligible = (config.spawn_ramp_initial + started / config.spawn_ramp_step.max(1)).clamp(1, stations.len());
    let origin = &stations[rng.random_range(0..eligible)];
    if graph.is_station_busy(origin.node) {
        return None;
    }

    let destinations: Vec<&Station> = stations.iter().filter(|station| station.node != origin.node).collect();
    let destination = destinations.choose(rng)?;
    let min_cars = config.min_cars.max(1);
    let car_count = rng.random_range(min_cars..=config.max_cars.max(min_cars));

    Some(SpawnPlan {
        node: origin.node,
        color: destination.color,
        car_count,
    })
}

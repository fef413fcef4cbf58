use crate::common::{NodeId, Rgb, TrackId, TrainId, TrainKind};
use crate::config::SimulationConfig;
use crate::event::SimulationUpdate;
use crate::simulation::checkpoint::CollisionDetector;
use crate::simulation::geometry::{Point, travel_position};
use crate::simulation::graph::{TrackGraph, TrackKind};
use bevy::log::debug;

/// Largest progress a car keeps between ticks
const PROGRESS_LIMIT: f64 = 1.0 - 1e-9;

fn flip_progress(progress: f64) -> f64 {
    (1.0 - progress).clamp(0.0, PROGRESS_LIMIT)
}

pub fn speed_coefficient(config: &SimulationConfig, kind: TrackKind) -> f64 {
    match kind {
        TrackKind::Straight => config.straight_speed,
        TrackKind::Curved(_) => config.curved_speed,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Car {
    pub is_head: bool,
    /// Last emerged car, releases the next one after a car length
    pub is_pre_tail: bool,
    pub active: bool,
    /// Left the consist at its destination
    pub retired: bool,
    pub current_track: Option<TrackId>,
    pub start_node: NodeId,
    pub end_node: NodeId,
    /// Distance travelled from `start_node`, within `[0, 1)`
    pub progress: f64,
}

impl Car {
    fn at_station(graph: &TrackGraph, station: NodeId, is_head: bool) -> Car {
        let current_track = graph.first_enabled_track(station);
        Car {
            is_head,
            is_pre_tail: false,
            active: is_head,
            retired: false,
            current_track,
            start_node: station,
            end_node: current_track.map_or(station, |id| graph.track(id).other_node(station)),
            progress: 0.0,
        }
    }

    fn is_waiting(&self) -> bool {
        !self.active && !self.retired
    }

    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.start_node, &mut self.end_node);
        self.progress = flip_progress(self.progress);
    }

    pub fn position(&self, graph: &TrackGraph, cell_size: i32) -> Option<Point> {
        let track = self.current_track.filter(|_| self.active)?;
        Some(travel_position(graph, track, self.start_node, self.progress, cell_size))
    }
}

#[derive(Clone, Debug)]
pub struct Train {
    pub id: TrainId,
    pub color: Rgb,
    pub kind: TrainKind,
    /// Node the train was spawned at
    pub origin: NodeId,
    pub active: bool,
    pub crashed: bool,
    pub cars: Vec<Car>,
}

impl Train {
    /// Places a consist on the first enabled track leaving `origin`. Only the
    /// head is out, the rest emerge one by one.
    pub fn new(
        id: TrainId,
        origin: NodeId,
        color: Rgb,
        kind: TrainKind,
        car_count: usize,
        graph: &TrackGraph,
    ) -> Option<Train> {
        graph.first_enabled_track(origin)?;
        let car_count = car_count.max(1);
        let mut cars: Vec<Car> = (0..car_count)
            .map(|index| Car::at_station(graph, origin, index == 0))
            .collect();
        cars[0].is_pre_tail = car_count > 1;

        Some(Train {
            id,
            color,
            kind,
            origin,
            active: true,
            crashed: false,
            cars,
        })
    }

    pub fn head(&self) -> Option<&Car> {
        self.cars.iter().find(|car| car.active && car.is_head)
    }

    pub fn active_cars(&self) -> impl Iterator<Item = &Car> {
        self.cars.iter().filter(|car| car.active)
    }

    pub fn is_moving(&self) -> bool {
        self.active && !self.crashed
    }

    pub fn update(&mut self, graph: &TrackGraph, config: &SimulationConfig, events: &mut Vec<SimulationUpdate>) {
        if !self.is_moving() {
            return;
        }
        for index in 0..self.cars.len() {
            if !self.active {
                break;
            }
            self.update_car(index, graph, config, events);
        }
    }

    fn update_car(
        &mut self,
        index: usize,
        graph: &TrackGraph,
        config: &SimulationConfig,
        events: &mut Vec<SimulationUpdate>,
    ) {
        let car = &mut self.cars[index];
        let Some(track_id) = car.current_track.filter(|_| car.active) else {
            return;
        };
        let track = graph.track(track_id);
        car.progress += config.base_speed * speed_coefficient(config, track.kind);

        if car.is_pre_tail && car.progress >= config.car_length {
            self.release_next_car(index);
        }

        let car = &self.cars[index];
        if car.progress < 1.0 {
            return;
        }
        let (from, to, is_head) = (car.start_node, car.end_node, car.is_head);

        if graph.is_terminal(to) {
            let node = graph.node(to);
            let arrived = node.color == self.color || (node.is_station && self.kind == TrainKind::Craft);
            if arrived {
                self.retire_car(index, to, events);
            } else {
                self.reverse_at(to, events);
            }
            return;
        }

        let entry = track.exit_direction(to);
        if is_head && !may_enter(graph, from, to, track_id) {
            self.reverse_at(to, events);
            return;
        }

        let overshoot = self.cars[index].progress - 1.0;
        match graph.active_track(to, entry.reverse()) {
            Some(next) => {
                let car = &mut self.cars[index];
                car.progress = overshoot;
                car.current_track = Some(next);
                car.start_node = to;
                car.end_node = graph.track(next).other_node(to);
            }
            None => {
                // dead end, the car turns back just inside the node it reached
                self.reverse_at(to, events);
                self.cars[index].progress = overshoot.clamp(0.0, PROGRESS_LIMIT);
            }
        }
    }

    fn reverse_at(&mut self, node: NodeId, events: &mut Vec<SimulationUpdate>) {
        self.reverse_direction();
        debug!("Train {} reversed at node {}", self.id, node);
        events.push(SimulationUpdate::TrainReversed { train: self.id, node });
    }

    /// Flips every active car and swaps head and tail ends of the consist
    pub fn reverse_direction(&mut self) {
        let mut first = None;
        let mut last = None;
        let mut waiting_behind = false;
        for (index, car) in self.cars.iter_mut().enumerate() {
            car.is_pre_tail = false;
            if car.active {
                car.reverse();
                first.get_or_insert(index);
                last = Some(index);
            } else if first.is_some() && car.is_waiting() {
                waiting_behind = true;
            }
        }
        let (Some(first), Some(last)) = (first, last) else {
            return;
        };

        let was_forward = self.cars[first].is_head;
        self.cars.iter_mut().for_each(|car| car.is_head = false);
        if was_forward {
            self.cars[last].is_head = true;
        } else {
            self.cars[first].is_head = true;
            // cars still waiting at the station resume emerging behind the tail
            self.cars[last].is_pre_tail = waiting_behind;
        }
    }

    /// Activates the next waiting car once `index` has cleared a car length
    fn release_next_car(&mut self, index: usize) {
        let waiting: Vec<usize> = (0..self.cars.len()).filter(|&i| self.cars[i].is_waiting()).collect();
        self.cars[index].is_pre_tail = false;
        if let Some(&next) = waiting.first() {
            let car = &mut self.cars[next];
            car.active = true;
            car.is_pre_tail = waiting.len() > 1;
        }
    }

    /// Removes the car at `index` from the consist at its destination
    fn retire_car(&mut self, index: usize, node: NodeId, events: &mut Vec<SimulationUpdate>) {
        let active: Vec<usize> = (0..self.cars.len()).filter(|&i| self.cars[i].active).collect();
        let car = &mut self.cars[index];
        car.active = false;
        car.retired = true;
        car.is_head = false;
        car.is_pre_tail = false;
        car.progress = car.progress.min(PROGRESS_LIMIT);

        let (Some(&first), Some(&last)) = (active.first(), active.last()) else {
            self.active = false;
            return;
        };
        if first == last {
            self.active = false;
            events.push(SimulationUpdate::TrainArrived { train: self.id, node });
            return;
        }

        events.push(SimulationUpdate::CarRetired { train: self.id, node });
        let remaining: Vec<usize> = active.into_iter().filter(|&i| i != index).collect();
        self.cars.iter_mut().for_each(|car| car.is_head = false);
        let new_head = if first == index { remaining.first() } else { remaining.last() };
        if let Some(&new_head) = new_head {
            self.cars[new_head].is_head = true;
        }
    }

    /// Marks every track under an active car as occupied for this tick
    pub fn occupy_tracks(&self, graph: &mut TrackGraph) {
        if !self.active {
            return;
        }
        for track in self.active_cars().filter_map(|car| car.current_track) {
            graph.occupy(track);
        }
    }

    /// Crashed trains keep reporting, their standing cars block the track
    pub fn report_positions(&self, graph: &TrackGraph, detector: &mut CollisionDetector, cell_size: i32) {
        if !self.active {
            return;
        }
        detector.begin_train(self.id, self.kind);
        for (index, car) in self.cars.iter().enumerate() {
            if let Some(point) = car.position(graph, cell_size) {
                detector.add_point(index, point);
            }
        }
    }

    pub fn head_progress(&self) -> f64 {
        self.head().map_or(0.0, |car| car.progress)
    }
}

/// Signal at `to` is open and its switch leads back towards `from`
fn may_enter(graph: &TrackGraph, from: NodeId, to: NodeId, track: TrackId) -> bool {
    let entry = graph.track(track).exit_direction(to);
    if !graph.is_signal_open(to, entry) {
        return false;
    }
    graph
        .active_track(to, entry)
        .is_none_or(|selected| graph.track(selected).connects(from))
}

use crate::common::{TrainId, TrainKind};
use crate::simulation::geometry::{Point, canvas_coordinate};
use itertools::Itertools;
use std::collections::HashMap;

type Checkpoint = (i32, i32);
/// Matrix index and checkpoint
type Location = (usize, Checkpoint);

/// Trains caught in one collision, released once a maintenance train clears it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wreck {
    pub trains: Vec<TrainId>,
}

/// Cross product of `xs` and `ys` with per-tick claims and persistent wrecks
#[derive(Default, Debug)]
pub struct CheckpointMatrix {
    xs: Vec<i32>,
    ys: Vec<i32>,
    claims: HashMap<Checkpoint, (TrainId, TrainKind)>,
    wrecks: HashMap<Checkpoint, Wreck>,
}

impl CheckpointMatrix {
    fn new(xs: Vec<i32>, ys: Vec<i32>) -> Self {
        CheckpointMatrix {
            xs,
            ys,
            ..Default::default()
        }
    }

    /// Checkpoints within `reach` of the segment `from`-`to`
    fn near(&self, from: &Point, to: &Point, reach: f64) -> Vec<Checkpoint> {
        let within = |a: f64, b: f64| move |&&v: &&i32| a.min(b) - reach <= v as f64 && v as f64 <= a.max(b) + reach;
        self.xs
            .iter()
            .filter(within(from.x, to.x))
            .cartesian_product(self.ys.iter().filter(within(from.y, to.y)))
            .map(|(&x, &y)| (x, y))
            .filter(|&(x, y)| Point::new(x as f64, y as f64).distance_to_segment(from, to) <= reach)
            .collect()
    }
}

#[derive(Default, Debug, PartialEq)]
pub struct CollisionReport {
    /// Trains that crashed this tick
    pub crashed: Vec<TrainId>,
    /// Trains whose wreck was cleared by a maintenance train
    pub released: Vec<TrainId>,
    /// Maintenance train and the wreck it cleared
    pub cleared: Vec<(TrainId, Point)>,
}

#[derive(Default, Debug)]
pub struct CollisionDetector {
    matrices: Vec<CheckpointMatrix>,
    reach: f64,
    crashes: u32,
    current: Option<(TrainId, TrainKind)>,
    /// Car positions reported during the previous tick
    previous: HashMap<(TrainId, usize), Point>,
    latest: HashMap<(TrainId, usize), Point>,
    report: CollisionReport,
}

impl CollisionDetector {
    /// Derives checkpoints at node centres, between columns and between rows.
    /// `offset` places the extra lines the curves cross near each node.
    pub fn new(width: i32, height: i32, cell_size: i32, offset: i32, reach: f64) -> Self {
        let columns: Vec<i32> = (0..width).map(|x| canvas_coordinate(x, cell_size)).collect();
        let rows: Vec<i32> = (0..height).map(|y| canvas_coordinate(y, cell_size)).collect();
        let midpoints = |values: &[i32]| values.iter().tuple_windows().map(|(a, b)| (a + b) / 2).collect_vec();
        let with_offsets = |values: &[i32]| {
            values
                .iter()
                .copied()
                .chain(values.iter().tuple_windows().flat_map(|(a, b)| [a + offset, b - offset]))
                .collect_vec()
        };

        let nodes = CheckpointMatrix::new(columns.clone(), rows.clone());
        let horizontal_gaps = CheckpointMatrix::new(midpoints(&columns), with_offsets(&rows));
        let vertical_gaps = CheckpointMatrix::new(with_offsets(&columns), midpoints(&rows));

        CollisionDetector {
            matrices: vec![nodes, horizontal_gaps, vertical_gaps],
            reach,
            ..Default::default()
        }
    }

    /// Drops this tick's claims, wrecks stay
    pub fn clear(&mut self) {
        for matrix in &mut self.matrices {
            matrix.claims.clear();
        }
        self.crashes = 0;
        self.current = None;
        self.previous = std::mem::take(&mut self.latest);
    }

    /// Following points belong to `train` until the next call
    pub fn begin_train(&mut self, train: TrainId, kind: TrainKind) {
        self.current = Some((train, kind));
    }

    /// Reports the position of car `car`. It claims every checkpoint within
    /// reach of the path it travelled since the previous tick.
    pub fn add_point(&mut self, car: usize, point: Point) {
        let Some((train, kind)) = self.current else {
            return;
        };
        let from = self.previous.get(&(train, car)).copied().unwrap_or(point);
        self.latest.insert((train, car), point);

        for index in 0..self.matrices.len() {
            for checkpoint in self.matrices[index].near(&from, &point, self.reach) {
                self.resolve((index, checkpoint), train, kind);
            }
        }
    }

    fn resolve(&mut self, (index, checkpoint): Location, train: TrainId, kind: TrainKind) {
        if self.report.released.contains(&train) {
            return;
        }
        if self.matrices[index].wrecks.contains_key(&checkpoint) {
            // a wrecked train stands on its own wreck without crashing again
            if self.wreck_of(train).is_none() {
                self.touch_wreck((index, checkpoint), train, kind);
            }
            return;
        }

        let claims = &mut self.matrices[index].claims;
        match claims.get(&checkpoint).copied() {
            None => {
                claims.insert(checkpoint, (train, kind));
            }
            Some((owner, _)) if owner == train => {}
            Some(owner) => self.conflict((index, checkpoint), owner, (train, kind)),
        }
    }

    fn conflict(&mut self, (index, checkpoint): Location, owner: (TrainId, TrainKind), other: (TrainId, TrainKind)) {
        if self.report.released.contains(&owner.0) {
            return;
        }
        match (self.wreck_of(owner.0), self.wreck_of(other.0)) {
            (Some(_), Some(_)) => {}
            (Some(wreck), None) => self.touch_wreck(wreck, other.0, other.1),
            (None, Some(wreck)) => self.touch_wreck(wreck, owner.0, owner.1),
            (None, None) => {
                self.matrices[index].wrecks.insert(
                    checkpoint,
                    Wreck {
                        trains: vec![owner.0, other.0],
                    },
                );
                self.crash(owner.0);
                self.crash(other.0);
            }
        }
    }

    /// A moving train reached a wreck. Maintenance clears it, anything else
    /// joins it.
    fn touch_wreck(&mut self, (index, at): Location, train: TrainId, kind: TrainKind) {
        if kind == TrainKind::Craft {
            if let Some(wreck) = self.matrices[index].wrecks.remove(&at) {
                self.report.released.extend(wreck.trains);
                self.report.cleared.push((train, Point::new(at.0 as f64, at.1 as f64)));
            }
        } else if let Some(wreck) = self.matrices[index].wrecks.get_mut(&at) {
            wreck.trains.push(train);
            self.crash(train);
        }
    }

    fn wreck_of(&self, train: TrainId) -> Option<Location> {
        self.matrices.iter().enumerate().find_map(|(index, matrix)| {
            matrix
                .wrecks
                .iter()
                .find(|(_, wreck)| wreck.trains.contains(&train))
                .map(|(&at, _)| (index, at))
        })
    }

    fn crash(&mut self, train: TrainId) {
        self.crashes += 1;
        if !self.report.crashed.contains(&train) {
            self.report.crashed.push(train);
        }
    }

    /// Collisions registered since the last `clear`
    pub fn crashes(&self) -> u32 {
        self.crashes
    }

    pub fn take_report(&mut self) -> CollisionReport {
        std::mem::take(&mut self.report)
    }

    pub fn wreck_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.matrices
            .iter()
            .flat_map(|matrix| matrix.wrecks.keys())
            .map(|&(x, y)| Point::new(x as f64, y as f64))
    }

    pub fn claimed_points(&self) -> impl Iterator<Item = (Point, TrainId)> + '_ {
        self.matrices
            .iter()
            .flat_map(|matrix| matrix.claims.iter())
            .map(|(&(x, y), &(train, _))| (Point::new(x as f64, y as f64), train))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> CollisionDetector {
        CollisionDetector::new(3, 3, 100, 12, 30.2)
    }

    fn report(detector: &mut CollisionDetector, train: TrainId, kind: TrainKind, points: &[(f64, f64)]) {
        detector.begin_train(train, kind);
        for (car, &(x, y)) in points.iter().enumerate() {
            detector.add_point(car, Point::new(x, y));
        }
    }

    #[test]
    fn test_checkpoint_layout() {
        let detector = detector();
        let matrices = &detector.matrices;
        assert_eq!(matrices[0].xs, vec![50, 150, 250]);
        assert_eq!(matrices[1].xs, vec![100, 200]);
        assert_eq!(matrices[1].ys, vec![50, 150, 250, 62, 138, 162, 238]);
        assert_eq!(matrices[2].xs, vec![50, 150, 250, 62, 138, 162, 238]);
        assert_eq!(matrices[2].ys, vec![100, 200]);
    }

    #[test]
    fn test_two_trains_crash_and_craft_clears() {
        let mut detector = detector();
        report(&mut detector, 1, TrainKind::Regular, &[(150.0, 50.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(150.0, 50.0)]);
        assert_eq!(detector.crashes(), 2);
        assert_eq!(detector.wreck_points().collect_vec(), vec![Point::new(150.0, 50.0)]);
        let outcome = detector.take_report();
        assert_eq!(outcome.crashed, vec![1, 2]);

        detector.clear();
        report(&mut detector, 3, TrainKind::Craft, &[(150.0, 50.0)]);
        let outcome = detector.take_report();
        assert!(outcome.crashed.is_empty());
        assert_eq!(outcome.released, vec![1, 2]);
        assert_eq!(outcome.cleared, vec![(3, Point::new(150.0, 50.0))]);
        assert_eq!(detector.wreck_points().count(), 0);
    }

    #[test]
    fn test_regular_train_hits_wreck() {
        let mut detector = detector();
        report(&mut detector, 1, TrainKind::Regular, &[(50.0, 50.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(50.0, 50.0)]);
        detector.take_report();

        detector.clear();
        report(&mut detector, 4, TrainKind::Regular, &[(50.0, 50.0)]);
        assert_eq!(detector.take_report().crashed, vec![4]);
        assert_eq!(detector.wreck_points().count(), 1);

        detector.clear();
        report(&mut detector, 9, TrainKind::Craft, &[(50.0, 50.0)]);
        assert_eq!(detector.take_report().released, vec![1, 2, 4]);
    }

    #[test]
    fn test_claims_reset_each_tick() {
        let mut detector = detector();
        report(&mut detector, 1, TrainKind::Regular, &[(250.0, 150.0)]);
        detector.clear();
        report(&mut detector, 2, TrainKind::Regular, &[(250.0, 150.0)]);
        assert_eq!(detector.crashes(), 0);
        assert_eq!(detector.claimed_points().collect_vec(), vec![(Point::new(250.0, 150.0), 2)]);
    }

    #[test]
    fn test_same_train_reclaims_freely() {
        let mut detector = detector();
        report(&mut detector, 1, TrainKind::Regular, &[(130.0, 50.0), (160.0, 50.0), (170.0, 50.0)]);
        assert_eq!(detector.crashes(), 0);
        assert!(detector.take_report().crashed.is_empty());
    }

    #[test]
    fn test_nearby_cars_share_checkpoint() {
        let mut detector = detector();
        // neither car sits on a checkpoint, both are within reach of x = 100
        report(&mut detector, 1, TrainKind::Regular, &[(115.0, 50.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(85.0, 50.0)]);
        assert_eq!(detector.take_report().crashed, vec![1, 2]);
        assert_eq!(detector.wreck_points().collect_vec(), vec![Point::new(100.0, 50.0)]);
    }

    #[test]
    fn test_trains_passing_between_ticks_collide() {
        let mut detector = detector();
        report(&mut detector, 1, TrainKind::Regular, &[(180.0, 150.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(320.0, 150.0)]);
        assert_eq!(detector.crashes(), 0);

        // both jump past each other, only the swept paths overlap
        detector.clear();
        report(&mut detector, 1, TrainKind::Regular, &[(330.0, 150.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(170.0, 150.0)]);
        assert_eq!(detector.take_report().crashed, vec![1, 2]);
        assert_eq!(detector.wreck_points().count(), 1);
    }

    #[test]
    fn test_distant_cars_do_not_collide() {
        let mut detector = detector();
        report(&mut detector, 1, TrainKind::Regular, &[(75.0, 50.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(140.0, 50.0)]);
        assert_eq!(detector.crashes(), 0);
        assert!(detector.claimed_points().any(|(_, train)| train == 1));
        assert!(detector.claimed_points().any(|(_, train)| train == 2));
    }

    #[test]
    fn test_crashed_consist_blocks_track() {
        let mut detector = detector();
        report(&mut detector, 1, TrainKind::Regular, &[(150.0, 50.0), (120.0, 50.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(180.0, 50.0)]);
        assert_eq!(detector.take_report().crashed, vec![1, 2]);

        // standing wrecks keep their claims without crashing again
        detector.clear();
        report(&mut detector, 1, TrainKind::Regular, &[(150.0, 50.0), (120.0, 50.0)]);
        report(&mut detector, 2, TrainKind::Regular, &[(180.0, 50.0)]);
        assert_eq!(detector.crashes(), 0);
        assert_eq!(detector.wreck_points().count(), 1);

        // a follower touches the tail of train 1 far from the wreck marker
        report(&mut detector, 3, TrainKind::Regular, &[(80.0, 50.0)]);
        assert_eq!(detector.take_report().crashed, vec![3]);
        assert_eq!(detector.wreck_points().count(), 1);

        detector.clear();
        report(&mut detector, 2, TrainKind::Regular, &[(180.0, 50.0)]);
        report(&mut detector, 4, TrainKind::Craft, &[(230.0, 50.0)]);
        let outcome = detector.take_report();
        assert!(outcome.crashed.is_empty());
        assert_eq!(outcome.released, vec![1, 2, 3]);
        assert_eq!(outcome.cleared, vec![(4, Point::new(150.0, 50.0))]);
        assert_eq!(detector.wreck_points().count(), 0);
    }
}

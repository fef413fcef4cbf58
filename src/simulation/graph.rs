use crate::common::{Direction, NodeId, Rgb, TrackId};
use arrayvec::ArrayVec;

/// Upper bound of candidate tracks that can share one direction slot
pub const SLOT_CAPACITY: usize = 4;
const MAX_ENABLED_PER_SLOT: usize = 2;
const MAX_ENABLED_PER_STATION: usize = 1;

/// Which of the two quarter-arc layouts a curved track uses. Geometry only.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
pub enum CurveOrientation {
    Horizontal,
    Vertical,
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
pub enum TrackKind {
    Straight,
    Curved(CurveOrientation),
}

impl TrackKind {
    pub fn is_curved(&self) -> bool {
        matches!(self, TrackKind::Curved(_))
    }
}

#[derive(Clone, Debug)]
pub struct Track {
    pub kind: TrackKind,
    pub node1: NodeId,
    pub node2: NodeId,
    exit1: Direction,
    exit2: Direction,
    pub enabled: bool,
    /// Excluded from toggling, used for station egress
    pub blocked: bool,
    /// A car is on the track during the current tick
    pub occupied: bool,
}

impl Track {
    /// Direction slot the track occupies at `node`
    pub fn exit_direction(&self, node: NodeId) -> Direction {
        if node == self.node1 { self.exit1 } else { self.exit2 }
    }

    pub fn other_node(&self, node: NodeId) -> NodeId {
        if node == self.node2 { self.node1 } else { self.node2 }
    }

    pub fn connects(&self, node: NodeId) -> bool {
        self.node1 == node || self.node2 == node
    }

    pub fn is_available(&self) -> bool {
        !self.blocked && !self.occupied
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub x: i32,
    pub y: i32,
    slots: [ArrayVec<TrackId, SLOT_CAPACITY>; 4],
    active_index: [usize; 4],
    signal_open: [bool; 4],
    blocked_dirs: [bool; 4],
    pub color: Rgb,
    pub is_station: bool,
}

impl Node {
    fn new(x: i32, y: i32) -> Self {
        Node {
            x,
            y,
            slots: Default::default(),
            active_index: [0; 4],
            signal_open: [true; 4],
            blocked_dirs: [false; 4],
            color: Rgb::BLACK,
            is_station: false,
        }
    }

    pub fn slot(&self, direction: Direction) -> &[TrackId] {
        &self.slots[direction.index()]
    }

    pub fn slots(&self) -> impl Iterator<Item = &[TrackId]> {
        self.slots.iter().map(|slot| slot.as_slice())
    }

    pub fn is_direction_blocked(&self, direction: Direction) -> bool {
        self.blocked_dirs[direction.index()]
    }

    fn reset_runtime_state(&mut self) {
        self.active_index = [0; 4];
        self.signal_open = [true; 4];
        self.blocked_dirs = [false; 4];
    }
}

/// Grid of junction nodes with every candidate track between neighbours.
/// Nodes are addressed as `x * height + y`.
#[derive(Clone, Debug)]
pub struct TrackGraph {
    width: i32,
    height: i32,
    nodes: Vec<Node>,
    tracks: Vec<Track>,
}

impl TrackGraph {
    /// Builds a `width` x `height` grid with all candidate tracks disabled
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let nodes = (0..width).flat_map(|x| (0..height).map(move |y| Node::new(x, y))).collect();
        let mut graph = TrackGraph {
            width,
            height,
            nodes,
            tracks: Vec::new(),
        };

        for x in 0..width {
            for y in 0..height {
                let here = graph.index(x, y);
                if x < width - 1 {
                    graph.add_track(here, graph.index(x + 1, y), TrackKind::Straight);
                }
                if y < height - 1 {
                    graph.add_track(here, graph.index(x, y + 1), TrackKind::Straight);
                }
                for dy in [1, -1] {
                    if x < width - 1 && (0..height).contains(&(y + dy)) {
                        let diagonal = graph.index(x + 1, y + dy);
                        graph.add_track(here, diagonal, TrackKind::Curved(CurveOrientation::Horizontal));
                        graph.add_track(here, diagonal, TrackKind::Curved(CurveOrientation::Vertical));
                    }
                }
            }
        }
        graph
    }

    fn index(&self, x: i32, y: i32) -> NodeId {
        (x * self.height + y) as NodeId
    }

    fn add_track(&mut self, node1: NodeId, node2: NodeId, kind: TrackKind) {
        let (a, b) = (&self.nodes[node1], &self.nodes[node2]);
        let (dx, dy) = ((b.x - a.x).signum(), (b.y - a.y).signum());
        let (exit1, exit2) = match kind {
            TrackKind::Straight => ((dx, dy), (-dx, -dy)),
            TrackKind::Curved(CurveOrientation::Horizontal) => ((1, 0), (0, -dy)),
            TrackKind::Curved(CurveOrientation::Vertical) => ((0, dy), (-1, 0)),
        };
        let (Some(exit1), Some(exit2)) = (Direction::from_vector(exit1.0, exit1.1), Direction::from_vector(exit2.0, exit2.1))
        else {
            return;
        };

        let id = self.tracks.len();
        self.tracks.push(Track {
            kind,
            node1,
            node2,
            exit1,
            exit2,
            enabled: false,
            blocked: false,
            occupied: false,
        });
        self.nodes[node1].slots[exit1.index()].push(id);
        self.nodes[node2].slots[exit2.index()].push(id);
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn node_id(&self, x: i32, y: i32) -> Option<NodeId> {
        if (0..self.width).contains(&x) && (0..self.height).contains(&y) {
            Some(self.index(x, y))
        } else {
            None
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
    }

    pub fn track(&self, id: TrackId) -> &Track {
        &self.tracks[id]
    }

    pub fn track_mut(&mut self, id: TrackId) -> &mut Track {
        &mut self.tracks[id]
    }

    pub fn tracks(&self) -> impl Iterator<Item = (TrackId, &Track)> {
        self.tracks.iter().enumerate()
    }

    pub fn is_perimeter(&self, node: NodeId) -> bool {
        let node = &self.nodes[node];
        node.x == 0 || node.y == 0 || node.x == self.width - 1 || node.y == self.height - 1
    }

    /// Locates the candidate track between two nodes, in either orientation
    pub fn find_track(&self, a: NodeId, b: NodeId, kind: TrackKind) -> Option<TrackId> {
        self.nodes[a]
            .slots
            .iter()
            .flatten()
            .copied()
            .find(|&id| {
                let track = &self.tracks[id];
                track.kind == kind && track.connects(b) && track.other_node(a) == b
            })
    }

    pub fn enabled_tracks(&self, node: NodeId, direction: Direction) -> impl Iterator<Item = TrackId> + '_ {
        self.nodes[node]
            .slot(direction)
            .iter()
            .copied()
            .filter(|&id| self.tracks[id].enabled)
    }

    pub fn enabled_count(&self, node: NodeId, direction: Direction) -> usize {
        self.enabled_tracks(node, direction).count()
    }

    pub fn enabled_count_total(&self, node: NodeId) -> usize {
        Direction::ALL
            .into_iter()
            .map(|direction| self.enabled_count(node, direction))
            .sum()
    }

    /// First enabled track found leaving the node, scanning slots in order
    pub fn first_enabled_track(&self, node: NodeId) -> Option<TrackId> {
        Direction::ALL
            .into_iter()
            .find_map(|direction| self.enabled_tracks(node, direction).next())
    }

    /// Exactly one direction slot has an enabled track
    pub fn is_terminal(&self, node: NodeId) -> bool {
        Direction::ALL
            .into_iter()
            .filter(|&direction| self.enabled_count(node, direction) > 0)
            .count()
            == 1
    }

    /// A station whose egress is taken cannot spawn. No egress counts as busy.
    pub fn is_station_busy(&self, node: NodeId) -> bool {
        self.first_enabled_track(node)
            .map(|id| self.tracks[id].occupied)
            .unwrap_or(true)
    }

    pub fn can_add_track(&self, node: NodeId, direction: Direction) -> bool {
        if self.nodes[node].is_station {
            self.enabled_count_total(node) < MAX_ENABLED_PER_STATION
        } else {
            self.enabled_count(node, direction) < MAX_ENABLED_PER_SLOT
        }
    }

    /// Enables or disables a track. Returns whether anything changed.
    pub fn toggle(&mut self, id: TrackId) -> bool {
        let track = &self.tracks[id];
        if !track.is_available() {
            return false;
        }
        if track.enabled {
            self.tracks[id].enabled = false;
            return true;
        }
        let allowed = self.can_add_track(track.node1, track.exit1) && self.can_add_track(track.node2, track.exit2);
        if allowed {
            self.tracks[id].enabled = true;
        }
        allowed
    }

    /// Enables a track regardless of slot limits, used when restoring a saved layout
    pub fn force_enable(&mut self, id: TrackId, blocked: bool) {
        let track = &mut self.tracks[id];
        track.enabled = true;
        track.blocked = blocked;
    }

    pub fn active_track(&self, node: NodeId, direction: Direction) -> Option<TrackId> {
        let enabled: ArrayVec<TrackId, SLOT_CAPACITY> = self.enabled_tracks(node, direction).collect();
        if enabled.is_empty() {
            return None;
        }
        let index = self.nodes[node].active_index[direction.index()] % enabled.len();
        Some(enabled[index])
    }

    /// Throws the switch of a slot with two or more enabled tracks
    pub fn cycle_switch(&mut self, node: NodeId, direction: Direction) -> bool {
        let count = self.enabled_count(node, direction);
        let node = &mut self.nodes[node];
        if count < 2 || node.is_direction_blocked(direction) {
            return false;
        }
        let index = &mut node.active_index[direction.index()];
        *index = (*index + 1) % count;
        true
    }

    /// Signals guard the through side of a single-track curve junction
    pub fn has_signal(&self, node: NodeId, direction: Direction) -> bool {
        if self.enabled_count(node, direction) != 1 || self.enabled_count(node, direction.reverse()) != 1 {
            return false;
        }
        self.active_track(node, direction)
            .is_some_and(|id| self.tracks[id].kind.is_curved())
    }

    pub fn is_signal_open(&self, node: NodeId, direction: Direction) -> bool {
        !self.has_signal(node, direction) || self.nodes[node].signal_open[direction.index()]
    }

    pub fn toggle_signal(&mut self, node: NodeId, direction: Direction) -> bool {
        if !self.has_signal(node, direction) || self.nodes[node].is_direction_blocked(direction) {
            return false;
        }
        let open = &mut self.nodes[node].signal_open[direction.index()];
        *open = !*open;
        true
    }

    /// Marks the track as taken this tick and locks the slots at both ends
    pub fn occupy(&mut self, id: TrackId) {
        let track = &mut self.tracks[id];
        track.occupied = true;
        let (node1, exit1, node2, exit2) = (track.node1, track.exit1, track.node2, track.exit2);
        self.nodes[node1].blocked_dirs[exit1.index()] = true;
        self.nodes[node2].blocked_dirs[exit2.index()] = true;
    }

    pub fn clear_transient(&mut self) {
        self.nodes.iter_mut().for_each(|node| node.blocked_dirs = [false; 4]);
        self.tracks.iter_mut().for_each(|track| track.occupied = false);
    }

    /// Restores switches and signals to their defaults, keeping the layout
    pub fn reset_runtime_state(&mut self) {
        self.nodes.iter_mut().for_each(Node::reset_runtime_state);
        self.tracks.iter_mut().for_each(|track| track.occupied = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn straight(graph: &TrackGraph, a: (i32, i32), b: (i32, i32)) -> TrackId {
        let a = graph.node_id(a.0, a.1).unwrap();
        let b = graph.node_id(b.0, b.1).unwrap();
        graph.find_track(a, b, TrackKind::Straight).unwrap()
    }

    fn curve(graph: &TrackGraph, a: (i32, i32), b: (i32, i32), orientation: CurveOrientation) -> TrackId {
        let a = graph.node_id(a.0, a.1).unwrap();
        let b = graph.node_id(b.0, b.1).unwrap();
        graph.find_track(a, b, TrackKind::Curved(orientation)).unwrap()
    }

    #[test]
    fn test_grid_construction() {
        let graph = TrackGraph::new(3, 3);
        assert_eq!(graph.nodes.len(), 9);
        // 12 straight tracks and two curves per diagonal pair (8 pairs)
        assert_eq!(graph.tracks.len(), 12 + 16);
        for (id, track) in graph.tracks() {
            assert!(!track.enabled);
            for node in [track.node1, track.node2] {
                let slots_with_track = Direction::ALL
                    .into_iter()
                    .filter(|&d| graph.node(node).slot(d).contains(&id))
                    .count();
                assert_eq!(slots_with_track, 1);
                assert!(graph.node(node).slot(track.exit_direction(node)).contains(&id));
            }
        }
    }

    #[test]
    fn test_curve_exit_directions() {
        let graph = TrackGraph::new(3, 3);
        let hor = curve(&graph, (0, 0), (1, 1), CurveOrientation::Horizontal);
        let track = graph.track(hor);
        assert_eq!(track.exit_direction(track.node1), Direction::East);
        assert_eq!(track.exit_direction(track.node2), Direction::North);

        let vert = curve(&graph, (0, 1), (1, 0), CurveOrientation::Vertical);
        let track = graph.track(vert);
        assert_eq!(track.exit_direction(track.node1), Direction::North);
        assert_eq!(track.exit_direction(track.node2), Direction::West);
    }

    #[test]
    fn test_third_track_in_slot_rejected() {
        let mut graph = TrackGraph::new(3, 3);
        let a = straight(&graph, (0, 1), (1, 1));
        let b = curve(&graph, (0, 1), (1, 0), CurveOrientation::Horizontal);
        let c = curve(&graph, (0, 1), (1, 2), CurveOrientation::Horizontal);
        assert!(graph.toggle(a));
        assert!(graph.toggle(b));
        let node = graph.node_id(0, 1).unwrap();
        assert_eq!(graph.enabled_count(node, Direction::East), 2);

        assert!(!graph.toggle(c));
        assert!(!graph.track(c).enabled);
        assert_eq!(graph.enabled_count(node, Direction::East), 2);
    }

    #[test]
    fn test_station_accepts_single_track() {
        let mut graph = TrackGraph::new(3, 3);
        let station = graph.node_id(0, 1).unwrap();
        graph.node_mut(station).is_station = true;
        let a = straight(&graph, (0, 1), (1, 1));
        let b = straight(&graph, (0, 1), (0, 0));
        assert!(graph.toggle(a));
        assert!(!graph.toggle(b));
        assert!(!graph.track(b).enabled);
    }

    #[test]
    fn test_blocked_and_occupied_tracks_ignore_toggle() {
        let mut graph = TrackGraph::new(2, 2);
        let a = straight(&graph, (0, 0), (1, 0));
        graph.force_enable(a, true);
        assert!(!graph.toggle(a));
        assert!(graph.track(a).enabled);

        let b = straight(&graph, (0, 1), (1, 1));
        graph.occupy(b);
        assert!(!graph.toggle(b));
        assert!(!graph.track(b).enabled);
    }

    #[test]
    fn test_switch_cycles_and_respects_blocks() {
        let mut graph = TrackGraph::new(3, 3);
        let a = straight(&graph, (0, 1), (1, 1));
        let b = curve(&graph, (0, 1), (1, 0), CurveOrientation::Horizontal);
        graph.toggle(a);
        graph.toggle(b);
        let node = graph.node_id(0, 1).unwrap();

        assert_eq!(graph.active_track(node, Direction::East), Some(a));
        assert!(graph.cycle_switch(node, Direction::East));
        assert_eq!(graph.active_track(node, Direction::East), Some(b));

        graph.occupy(a);
        assert!(!graph.cycle_switch(node, Direction::East));
        assert_eq!(graph.active_track(node, Direction::East), Some(b));

        graph.clear_transient();
        assert!(graph.cycle_switch(node, Direction::East));
        assert_eq!(graph.active_track(node, Direction::East), Some(a));

        // single track slots are not switchable
        assert!(!graph.cycle_switch(node, Direction::West));
    }

    #[test]
    fn test_switch_index_stays_valid() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut graph = TrackGraph::new(4, 4);
        let track_count = graph.tracks.len();
        for _ in 0..2000 {
            let id = rng.random_range(0..track_count);
            graph.toggle(id);
            let node = rng.random_range(0..graph.nodes.len());
            let direction = Direction::ALL[rng.random_range(0..4)];
            if rng.random_bool(0.3) {
                graph.cycle_switch(node, direction);
            }

            for (node, _) in graph.nodes() {
                for direction in Direction::ALL {
                    match graph.active_track(node, direction) {
                        Some(track) => {
                            assert!(graph.track(track).enabled);
                            assert!(graph.node(node).slot(direction).contains(&track));
                        }
                        None => assert_eq!(graph.enabled_count(node, direction), 0),
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_invariant() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut graph = TrackGraph::new(4, 3);
        let track_count = graph.tracks.len();
        for _ in 0..1500 {
            graph.toggle(rng.random_range(0..track_count));
            for (node, _) in graph.nodes() {
                let populated = Direction::ALL
                    .into_iter()
                    .filter(|&d| graph.enabled_tracks(node, d).next().is_some())
                    .count();
                assert_eq!(graph.is_terminal(node), populated == 1);
                for direction in Direction::ALL {
                    assert!(graph.enabled_count(node, direction) <= MAX_ENABLED_PER_SLOT);
                }
            }
        }
    }

    #[test]
    fn test_signal_only_on_curve_junction() {
        let mut graph = TrackGraph::new(3, 3);
        let node = graph.node_id(1, 1).unwrap();
        let west = straight(&graph, (0, 1), (1, 1));
        // (1,1) -> (2,0) horizontal curve leaves (1,1) eastwards
        let east = curve(&graph, (1, 1), (2, 0), CurveOrientation::Horizontal);
        graph.toggle(west);
        assert!(!graph.has_signal(node, Direction::East));

        graph.toggle(east);
        assert!(graph.has_signal(node, Direction::East));
        assert!(!graph.has_signal(node, Direction::West));
        assert!(graph.is_signal_open(node, Direction::East));

        assert!(graph.toggle_signal(node, Direction::East));
        assert!(!graph.is_signal_open(node, Direction::East));
        assert!(!graph.toggle_signal(node, Direction::West));

        graph.reset_runtime_state();
        assert!(graph.is_signal_open(node, Direction::East));
    }

    #[test]
    fn test_station_busy() {
        let mut graph = TrackGraph::new(3, 3);
        let node = graph.node_id(0, 0).unwrap();
        assert!(graph.is_station_busy(node));
        let a = straight(&graph, (0, 0), (1, 0));
        graph.toggle(a);
        assert!(!graph.is_station_busy(node));
        graph.occupy(a);
        assert!(graph.is_station_busy(node));
        assert!(graph.node(node).is_direction_blocked(Direction::East));
    }
}

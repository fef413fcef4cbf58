//! Canvas geometry of the grid: node centres, positions along straight and
//! curved tracks, and pointer hit-testing for the command surface.

use crate::common::{NodeId, Rgb, TrackId};
use crate::simulation::graph::{CurveOrientation, Track, TrackGraph, TrackKind};
use std::f64::consts::{FRAC_PI_2, PI};

const HOVER_DISTANCE: f64 = 5.0;
const ARROW_SIDE_RATIO: f64 = 5.0;

pub const TRACK_COLOR_ENABLED: Rgb = Rgb(140, 140, 140);
pub const TRACK_COLOR_DISABLED: Rgb = Rgb(240, 240, 240);
pub const TRACK_COLOR_ALERT: Rgb = Rgb(255, 0, 0);
pub const TRACK_COLOR_PALE_ALERT: Rgb = Rgb(255, 100, 100);

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Snaps to whole canvas pixels
    pub fn truncate(&self) -> Point {
        Point::new(self.x.trunc(), self.y.trunc())
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn distance_to_segment(&self, a: &Point, b: &Point) -> f64 {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let length_squared = dx * dx + dy * dy;
        if length_squared == 0.0 {
            return self.distance(a);
        }
        let t = (((self.x - a.x) * dx + (self.y - a.y) * dy) / length_squared).clamp(0.0, 1.0);
        self.distance(&Point::new(a.x + t * dx, a.y + t * dy))
    }
}

pub fn canvas_coordinate(cell: i32, cell_size: i32) -> i32 {
    cell * cell_size + cell_size / 2
}

pub fn node_center(graph: &TrackGraph, node: NodeId, cell_size: i32) -> Point {
    let node = graph.node(node);
    Point::new(
        canvas_coordinate(node.x, cell_size) as f64,
        canvas_coordinate(node.y, cell_size) as f64,
    )
}

fn endpoints(graph: &TrackGraph, track: &Track, cell_size: i32) -> (Point, Point) {
    (
        node_center(graph, track.node1, cell_size),
        node_center(graph, track.node2, cell_size),
    )
}

/// Centre of the quarter circle a curved track follows
fn arc_center(orientation: CurveOrientation, a: Point, b: Point) -> Point {
    match orientation {
        CurveOrientation::Horizontal => Point::new(a.x, b.y),
        CurveOrientation::Vertical => Point::new(b.x, a.y),
    }
}

/// Start and end angle of the arc, measured from `node1` to `node2`
fn arc_angles(orientation: CurveOrientation, a: Point, b: Point) -> (f64, f64) {
    match (orientation, b.y > a.y) {
        (CurveOrientation::Horizontal, true) => (FRAC_PI_2, 0.0),
        (CurveOrientation::Vertical, true) => (PI, PI * 1.5),
        (CurveOrientation::Horizontal, false) => (-FRAC_PI_2, 0.0),
        (CurveOrientation::Vertical, false) => (PI, FRAC_PI_2),
    }
}

/// Position along the track where `progress` is measured from `node1`
pub fn position_on_track(graph: &TrackGraph, track: TrackId, progress: f64, cell_size: i32) -> Point {
    let track = graph.track(track);
    let (a, b) = endpoints(graph, track, cell_size);
    let point = match track.kind {
        TrackKind::Straight => Point::new(a.x + (b.x - a.x) * progress, a.y + (b.y - a.y) * progress),
        TrackKind::Curved(orientation) => {
            let center = arc_center(orientation, a, b);
            let (start, end) = arc_angles(orientation, a, b);
            let angle = start + (end - start) * progress;
            let radius = cell_size as f64;
            Point::new(center.x + radius * angle.cos(), center.y - radius * angle.sin())
        }
    };
    point.truncate()
}

/// Position of something travelling from `start_node` along `track`
pub fn travel_position(graph: &TrackGraph, track: TrackId, start_node: NodeId, progress: f64, cell_size: i32) -> Point {
    if graph.track(track).node1 == start_node {
        position_on_track(graph, track, progress, cell_size)
    } else {
        position_on_track(graph, track, 1.0 - progress, cell_size)
    }
}

pub fn is_hovered(graph: &TrackGraph, track: TrackId, point: Point, cell_size: i32) -> bool {
    let track = graph.track(track);
    if !track.is_available() {
        return false;
    }
    let (a, b) = endpoints(graph, track, cell_size);
    match track.kind {
        TrackKind::Straight => {
            let (low, high, value) = if a.x == b.x { (a.y, b.y, point.y) } else { (a.x, b.x, point.x) };
            if !(low.min(high)..=low.max(high)).contains(&value) {
                return false;
            }
            let length = a.distance(&b);
            let distance = ((b.y - a.y) * point.x - (b.x - a.x) * point.y + b.x * a.y - b.y * a.x).abs() / length;
            distance < HOVER_DISTANCE
        }
        TrackKind::Curved(orientation) => {
            let inside_x = (a.x.min(b.x)..=a.x.max(b.x)).contains(&point.x);
            let inside_y = (a.y.min(b.y)..=a.y.max(b.y)).contains(&point.y);
            if !inside_x || !inside_y {
                return false;
            }
            let center = arc_center(orientation, a, b);
            (point.distance(&center) - cell_size as f64).abs() < HOVER_DISTANCE
        }
    }
}

/// Translates a canvas click into a track reference. Outside construction
/// mode only enabled tracks are considered.
pub fn track_at(graph: &TrackGraph, point: Point, cell_size: i32, construction_mode: bool) -> Option<TrackId> {
    graph
        .tracks()
        .filter(|(_, track)| construction_mode || track.enabled)
        .map(|(id, _)| id)
        .find(|&id| is_hovered(graph, id, point, cell_size))
}

pub fn node_at(graph: &TrackGraph, point: Point, cell_size: i32, radius: f64) -> Option<NodeId> {
    graph
        .nodes()
        .map(|(id, _)| id)
        .find(|&id| node_center(graph, id, cell_size).distance(&point) < radius)
}

/// Arrow drawn at a switch, pointing along the selected track with a slight
/// sideways lean towards the far end
pub fn switch_arrow(graph: &TrackGraph, track: TrackId, node: NodeId) -> (f64, f64) {
    let track = graph.track(track);
    let (dx1, dy1) = track.exit_direction(node).vector();
    let (dx2, dy2) = track.exit_direction(track.other_node(node)).vector();
    if dy1 == 0 {
        (dx1 as f64, -dy2 as f64 / ARROW_SIDE_RATIO)
    } else {
        (-dx2 as f64 / ARROW_SIDE_RATIO, dy1 as f64)
    }
}

pub fn track_color(track: &Track, hovered: bool, construction_mode: bool) -> Rgb {
    match (track.enabled, hovered) {
        (true, true) if construction_mode => TRACK_COLOR_ALERT,
        (true, _) => TRACK_COLOR_ENABLED,
        (false, true) => TRACK_COLOR_PALE_ALERT,
        (false, false) => TRACK_COLOR_DISABLED,
    }
}

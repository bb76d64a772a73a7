//! Selection rectangle geometry.
//!
//! The selection is stored as a closed five-point ring, the same shape the
//! map overlay renders, so corner edits and drawing share one representation.
//!
//! Ring order is fixed: southwest, northwest, northeast, southeast and the
//! closing southwest vertex again. Under that ordering the rectangle stays
//! axis-aligned as long as
//!
//! - `p0.x == p1.x` (west edge),
//! - `p1.y == p2.y` (north edge),
//! - `p2.x == p3.x` (east edge),
//! - `p3.y == p0.y` (south edge),
//!
//! and `p4 == p0`.

use crate::error::{ClipError, Result};
use serde::{Deserialize, Serialize};

/// A planar point in map coordinates (`x` = longitude, `y` = latitude).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared distance to `other`.
    pub fn distance_sq(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Which ring coordinate a neighbour shares with a corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// One of the four rectangle corners, named by compass position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    Sw,
    Nw,
    Ne,
    Se,
}

impl Corner {
    pub const ALL: [Corner; 4] = [Corner::Sw, Corner::Nw, Corner::Ne, Corner::Se];

    /// Index of this corner in the ring.
    pub const fn ring_index(self) -> usize {
        match self {
            Corner::Sw => 0,
            Corner::Nw => 1,
            Corner::Ne => 2,
            Corner::Se => 3,
        }
    }

    /// The corner diagonally across the rectangle.
    pub const fn opposite(self) -> Corner {
        match self {
            Corner::Sw => Corner::Ne,
            Corner::Nw => Corner::Se,
            Corner::Ne => Corner::Sw,
            Corner::Se => Corner::Nw,
        }
    }

    /// Ring vertices sharing an edge with this corner, and the coordinate
    /// they share. The closing vertex is handled through `p0`.
    const fn neighbours(self) -> [(Corner, Axis); 2] {
        match self {
            Corner::Sw => [(Corner::Nw, Axis::X), (Corner::Se, Axis::Y)],
            Corner::Nw => [(Corner::Sw, Axis::X), (Corner::Ne, Axis::Y)],
            Corner::Ne => [(Corner::Nw, Axis::Y), (Corner::Se, Axis::X)],
            Corner::Se => [(Corner::Ne, Axis::X), (Corner::Sw, Axis::Y)],
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Corner::Sw => "sw",
            Corner::Nw => "nw",
            Corner::Ne => "ne",
            Corner::Se => "se",
        }
    }
}

impl std::fmt::Display for Corner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic extent of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    /// `[west, south, east, north]`, the order the clipping service expects.
    pub fn to_bbox(self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    pub fn width(self) -> f64 {
        self.east - self.west
    }

    pub fn height(self) -> f64 {
        self.north - self.south
    }

    pub fn center(self) -> Point {
        Point::new(
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }
}

/// Positions of the four corner markers, read straight off the ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerMarkers {
    pub sw: Point,
    pub nw: Point,
    pub ne: Point,
    pub se: Point,
}

impl CornerMarkers {
    pub fn get(&self, corner: Corner) -> Point {
        match corner {
            Corner::Sw => self.sw,
            Corner::Nw => self.nw,
            Corner::Ne => self.ne,
            Corner::Se => self.se,
        }
    }

    /// Iterates markers in ring order with their tags.
    pub fn iter(&self) -> impl Iterator<Item = (Corner, Point)> + '_ {
        Corner::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

/// Axis-aligned selection rectangle stored as a closed ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Rectangle {
    ring: [Point; 5],
}

impl Rectangle {
    /// Builds the ring for the given extent with `p0` at `(min_x, min_y)`.
    ///
    /// # Errors
    ///
    /// Returns [`ClipError::InvalidBounds`] if a minimum exceeds its maximum
    /// or any value is not finite. Zero-area extents are accepted.
    pub fn from_bounds(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Result<Self> {
        let finite = [min_x, max_x, min_y, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x > max_x || min_y > max_y {
            return Err(ClipError::InvalidBounds {
                min_x,
                max_x,
                min_y,
                max_y,
            });
        }

        let sw = Point::new(min_x, min_y);
        Ok(Self {
            ring: [
                sw,
                Point::new(min_x, max_y),
                Point::new(max_x, max_y),
                Point::new(max_x, min_y),
                sw,
            ],
        })
    }

    /// Initial placement: each side sits one third of the way from `center`
    /// to the matching edge of `viewport`.
    pub fn centered_third(viewport: Bounds, center: Point) -> Result<Self> {
        Self::from_bounds(
            center.x - (center.x - viewport.west) / 3.0,
            center.x - (center.x - viewport.east) / 3.0,
            center.y - (center.y - viewport.south) / 3.0,
            center.y - (center.y - viewport.north) / 3.0,
        )
    }

    /// The five ring vertices, first equal to last.
    pub fn ring(&self) -> &[Point; 5] {
        &self.ring
    }

    /// Moves `corner` to `(x, y)` and drags the two vertices that share an
    /// edge with it. The opposite corner never moves.
    ///
    /// No ordering check is made: dragging a corner past its neighbours
    /// yields an inverted or zero-area rectangle, which is kept as is.
    pub fn update_corner(&mut self, corner: Corner, x: f64, y: f64) {
        self.set_vertex(corner.ring_index(), Point::new(x, y));

        for (neighbour, axis) in corner.neighbours() {
            let index = neighbour.ring_index();
            let mut p = self.ring[index];
            match axis {
                Axis::X => p.x = x,
                Axis::Y => p.y = y,
            }
            self.set_vertex(index, p);
        }
    }

    /// Shifts every vertex by `(dx, dy)`.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        for p in &mut self.ring {
            p.x += dx;
            p.y += dy;
        }
    }

    pub fn corner_markers(&self) -> CornerMarkers {
        CornerMarkers {
            sw: self.ring[0],
            nw: self.ring[1],
            ne: self.ring[2],
            se: self.ring[3],
        }
    }

    /// Reads the extent from the two bounding corners, `p0` and `p2`.
    pub fn bounds(&self) -> Bounds {
        Bounds {
            west: self.ring[0].x,
            south: self.ring[0].y,
            east: self.ring[2].x,
            north: self.ring[2].y,
        }
    }

    /// Whether `point` lies inside the rectangle, tolerant of inversion.
    pub fn contains(&self, point: Point) -> bool {
        let b = self.bounds();
        let (x0, x1) = (b.west.min(b.east), b.west.max(b.east));
        let (y0, y1) = (b.south.min(b.north), b.south.max(b.north));
        (x0..=x1).contains(&point.x) && (y0..=y1).contains(&point.y)
    }

    fn set_vertex(&mut self, index: usize, p: Point) {
        self.ring[index] = p;
        if index == 0 {
            self.ring[4] = p;
        }
    }
}

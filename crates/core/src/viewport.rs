//! Screen to map coordinate mapping for the selection canvas.
//!
//! The canvas uses a plain equirectangular projection sized like a web map:
//! at zoom `z` the world is `256 * 2^z` pixels wide.

use crate::geometry::{Bounds, Point};
use eframe::egui;

/// Width of one map tile in screen pixels.
pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 19.0;

/// Visible map area: a center point and a zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: Point,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(lat: f64, lng: f64, zoom: f64) -> Self {
        Self {
            center: Point::new(lng, lat.clamp(-90.0, 90.0)),
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }

    /// Degrees covered by one screen pixel.
    pub fn degrees_per_pixel(&self) -> f64 {
        360.0 / (TILE_SIZE * 2f64.powf(self.zoom))
    }

    pub fn to_map(&self, pos: egui::Pos2, screen: egui::Rect) -> Point {
        let dpp = self.degrees_per_pixel();
        let offset = pos - screen.center();
        Point::new(
            self.center.x + f64::from(offset.x) * dpp,
            self.center.y - f64::from(offset.y) * dpp,
        )
    }

    pub fn to_screen(&self, point: Point, screen: egui::Rect) -> egui::Pos2 {
        let dpp = self.degrees_per_pixel();
        let c = screen.center();
        egui::pos2(
            c.x + ((point.x - self.center.x) / dpp) as f32,
            c.y - ((point.y - self.center.y) / dpp) as f32,
        )
    }

    /// Map extent visible in `screen`.
    pub fn bounds(&self, screen: egui::Rect) -> Bounds {
        let sw = self.to_map(screen.left_bottom(), screen);
        let ne = self.to_map(screen.right_top(), screen);
        Bounds {
            west: sw.x,
            south: sw.y,
            east: ne.x,
            north: ne.y,
        }
    }

    /// Moves the map with the pointer, as a basemap drag would.
    pub fn pan(&mut self, delta: egui::Vec2) {
        let dpp = self.degrees_per_pixel();
        self.center.x -= f64::from(delta.x) * dpp;
        self.center.y = (self.center.y + f64::from(delta.y) * dpp).clamp(-90.0, 90.0);
    }

    /// Zooms by `steps` levels keeping the map point under `anchor` fixed.
    pub fn zoom_around(&mut self, steps: f64, anchor: egui::Pos2, screen: egui::Rect) {
        let before = self.to_map(anchor, screen);
        self.zoom = (self.zoom + steps).clamp(MIN_ZOOM, MAX_ZOOM);
        let after = self.to_map(anchor, screen);
        self.center.x += before.x - after.x;
        self.center.y = (self.center.y + before.y - after.y).clamp(-90.0, 90.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(1024.0, 512.0))
    }

    #[test]
    fn zoom_zero_shows_the_whole_world_across_four_tiles() {
        let viewport = Viewport::new(0.0, 0.0, 0.0);
        let bounds = viewport.bounds(screen());
        // 1024 px at 256 px per 360 degrees
        assert!((bounds.width() - 1440.0).abs() < 1e-6);
        assert!((bounds.height() - 720.0).abs() < 1e-6);
        assert!(bounds.center().distance_sq(Point::new(0.0, 0.0)) < 1e-9);
    }

    #[test]
    fn screen_and_map_coordinates_round_trip() {
        let viewport = Viewport::new(7.6, -12.7, 8.0);
        let p = Point::new(-12.5, 7.9);
        let back = viewport.to_map(viewport.to_screen(p, screen()), screen());
        assert!(back.distance_sq(p) < 1e-6);
    }

    #[test]
    fn north_is_up() {
        let viewport = Viewport::new(0.0, 0.0, 3.0);
        let top = viewport.to_map(egui::pos2(512.0, 0.0), screen());
        let bottom = viewport.to_map(egui::pos2(512.0, 512.0), screen());
        assert!(top.y > bottom.y);
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut viewport = Viewport::new(10.0, 20.0, 4.0);
        let anchor = egui::pos2(800.0, 100.0);
        let before = viewport.to_map(anchor, screen());
        viewport.zoom_around(1.0, anchor, screen());
        let after = viewport.to_map(anchor, screen());
        assert_eq!(viewport.zoom, 5.0);
        assert!(before.distance_sq(after) < 1e-9);
    }
}

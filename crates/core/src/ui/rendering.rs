//! Drawing of the selection overlay, the graticule and the colorbar.

use super::selection::MARKER_RADIUS;
use crate::colormap::ColorMap;
use crate::geometry::{CornerMarkers, Point};
use crate::viewport::Viewport;
use eframe::egui;

/// Border and marker outline color.
pub const OUTLINE: egui::Color32 = egui::Color32::from_rgb(0x2E, 0x2D, 0x29);

/// Candidate graticule spacings in degrees.
const GRATICULE_STEPS: [f64; 9] = [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 90.0];

/// Minimum pixel gap between graticule lines.
const GRATICULE_MIN_GAP: f64 = 80.0;

/// Draws the ring: half-transparent white fill, dashed dark border.
pub fn draw_selection(
    painter: &egui::Painter,
    ring: &[Point; 5],
    viewport: &Viewport,
    screen: egui::Rect,
) {
    let points: Vec<egui::Pos2> = ring.iter().map(|p| viewport.to_screen(*p, screen)).collect();

    let fill = egui::Rect::from_two_pos(points[0], points[2]);
    painter.rect_filled(fill, 0.0, egui::Color32::from_white_alpha(128));

    painter.extend(egui::Shape::dashed_line(
        &points,
        egui::Stroke::new(2.0, OUTLINE),
        8.0,
        6.0,
    ));
}

/// Draws the four corner markers: a dark disc with a white center.
pub fn draw_markers(
    painter: &egui::Painter,
    markers: &CornerMarkers,
    viewport: &Viewport,
    screen: egui::Rect,
) {
    for (_, point) in markers.iter() {
        let center = viewport.to_screen(point, screen);
        painter.circle_filled(center, MARKER_RADIUS, OUTLINE);
        painter.circle_filled(center, MARKER_RADIUS - 2.0, egui::Color32::WHITE);
    }
}

/// Draws latitude and longitude lines with their labels.
pub fn draw_graticule(painter: &egui::Painter, viewport: &Viewport, screen: egui::Rect) {
    let dpp = viewport.degrees_per_pixel();
    let step = GRATICULE_STEPS
        .iter()
        .copied()
        .find(|s| s / dpp >= GRATICULE_MIN_GAP)
        .unwrap_or(90.0);

    let bounds = viewport.bounds(screen);
    let stroke = egui::Stroke::new(1.0, egui::Color32::from_gray(70));
    let font = egui::FontId::monospace(10.0);
    let text_color = egui::Color32::from_gray(140);

    let mut x = (bounds.west / step).ceil() * step;
    while x <= bounds.east {
        let top = viewport.to_screen(Point::new(x, bounds.north), screen);
        let bottom = viewport.to_screen(Point::new(x, bounds.south), screen);
        painter.line_segment([top, bottom], stroke);
        painter.text(
            bottom + egui::vec2(3.0, -3.0),
            egui::Align2::LEFT_BOTTOM,
            format_degrees(x, step),
            font.clone(),
            text_color,
        );
        x += step;
    }

    let mut y = (bounds.south.max(-90.0) / step).ceil() * step;
    while y <= bounds.north.min(90.0) {
        let left = viewport.to_screen(Point::new(bounds.west, y), screen);
        let right = viewport.to_screen(Point::new(bounds.east, y), screen);
        painter.line_segment([left, right], stroke);
        painter.text(
            left + egui::vec2(3.0, -3.0),
            egui::Align2::LEFT_BOTTOM,
            format_degrees(y, step),
            font.clone(),
            text_color,
        );
        y += step;
    }
}

fn format_degrees(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 { 0 } else { 2 };
    format!("{:.*}°", decimals, value)
}

/// Draws the colormap as a horizontal bar filling `rect`.
pub fn draw_colorbar(painter: &egui::Painter, rect: egui::Rect, colormap: &ColorMap) {
    let width = rect.width() / 256.0;
    for index in 0..=255u8 {
        let Some([r, g, b, a]) = colormap.interpolate(index) else {
            continue;
        };
        let x = rect.left() + f32::from(index) * width;
        let slice = egui::Rect::from_min_max(
            egui::pos2(x, rect.top()),
            egui::pos2(x + width + 0.5, rect.bottom()),
        );
        painter.rect_filled(slice, 0.0, egui::Color32::from_rgba_unmultiplied(r, g, b, a));
    }
    painter.rect_stroke(
        rect,
        0.0,
        egui::Stroke::new(1.0, egui::Color32::GRAY),
        egui::StrokeKind::Middle,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_labels_follow_step_precision() {
        assert_eq!(format_degrees(-12.0, 1.0), "-12°");
        assert_eq!(format_degrees(7.25, 0.05), "7.25°");
    }
}

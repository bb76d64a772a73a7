//! Routing of canvas pointer input to the edit session or the map.
//!
//! A press over the rectangle belongs to the [`EditSession`]; any other
//! press pans the viewport, like dragging a basemap.

use crate::editor::{Cursor, EditSession, PointerOutcome};
use crate::viewport::Viewport;
use eframe::egui;

/// Screen radius of a corner marker, also used as its hit radius.
pub const MARKER_RADIUS: f32 = 7.0;

/// Scroll distance that zooms by one level.
const SCROLL_PER_ZOOM_LEVEL: f32 = 120.0;

/// Who owns the current drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragOwner {
    #[default]
    None,
    Editor,
    Map,
}

/// Marker hit radius converted to map units.
pub fn hit_tolerance(viewport: &Viewport) -> f64 {
    f64::from(MARKER_RADIUS) * viewport.degrees_per_pixel()
}

/// Feeds one frame of canvas input to the session or the viewport.
///
/// Returns the new drag owner; the caller keeps it between frames.
pub fn process_pointer(
    response: &egui::Response,
    owner: DragOwner,
    session: &mut EditSession,
    viewport: &mut Viewport,
    screen: egui::Rect,
) -> DragOwner {
    let mut owner = owner;
    let tolerance = hit_tolerance(viewport);

    if response.drag_started() {
        // the press origin, not the position after the drag threshold
        let origin = response
            .ctx
            .input(|i| i.pointer.press_origin())
            .or_else(|| response.interact_pointer_pos());
        owner = match origin {
            Some(pos) => match session.pointer_down(viewport.to_map(pos, screen), tolerance) {
                PointerOutcome::Captured(_) => DragOwner::Editor,
                PointerOutcome::PassThrough => DragOwner::Map,
            },
            None => DragOwner::None,
        };
    }

    if response.dragged() {
        match owner {
            DragOwner::Editor => {
                if let Some(pos) = response.interact_pointer_pos() {
                    session.pointer_move(viewport.to_map(pos, screen));
                }
            }
            DragOwner::Map => viewport.pan(response.drag_delta()),
            DragOwner::None => {}
        }
    }

    if response.drag_stopped() {
        session.pointer_up();
        owner = DragOwner::None;
    }

    if let Some(anchor) = response.hover_pos() {
        let scroll = response.ctx.input(|i| i.smooth_scroll_delta.y);
        if scroll != 0.0 {
            viewport.zoom_around(f64::from(scroll / SCROLL_PER_ZOOM_LEVEL), anchor, screen);
        }
    }

    owner
}

/// Cursor icon for the hovered canvas position.
pub fn cursor_icon(
    response: &egui::Response,
    owner: DragOwner,
    session: &EditSession,
    viewport: &Viewport,
    screen: egui::Rect,
) -> egui::CursorIcon {
    if owner == DragOwner::Map {
        return egui::CursorIcon::Grabbing;
    }
    let hover = response.hover_pos().map(|p| viewport.to_map(p, screen));
    match session.cursor(hover, hit_tolerance(viewport)) {
        Cursor::Default => egui::CursorIcon::Default,
        Cursor::Move => egui::CursorIcon::Move,
        Cursor::Grab => egui::CursorIcon::Grab,
        Cursor::Grabbing => egui::CursorIcon::Grabbing,
    }
}

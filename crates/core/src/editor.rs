//! Pointer-driven editing of the selection rectangle.
//!
//! [`EditSession`] owns the rectangle and the drag state. It is the only
//! writer of the rectangle while a drag is active; renderers read it through
//! [`EditSession::rectangle`] and watch [`EditSession::revision`] for changes.
//!
//! The state machine:
//!
//! ```text
//! Idle --down on marker--> DraggingVertex(corner) --up--> Idle
//! Idle --down on fill----> DraggingBox { origin }  --up--> Idle
//! ```
//!
//! Pointer-move and pointer-up listeners exist only for the duration of a
//! drag; moves that arrive while idle are dropped.
//!
//! A [`RenderSink`] can be attached to receive the ring and markers after
//! every geometry change.

use crate::error::{ClipError, Result};
use crate::geometry::{Bounds, Corner, CornerMarkers, Point, Rectangle};
use tracing::trace;

/// Current drag interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    /// A corner marker is being dragged.
    DraggingVertex(Corner),
    /// The whole box is being dragged; `origin` is the previous pointer position.
    DraggingBox { origin: Point },
}

/// What a pointer position is over. Markers win over the fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Vertex(Corner),
    Fill,
}

/// Cursor the host should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Default,
    Move,
    Grab,
    Grabbing,
}

/// Result of a pointer-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    /// The session took the pointer; the host must not pan the map.
    Captured(HitTarget),
    /// Nothing editable under the pointer; default map behavior applies.
    PassThrough,
}

/// Receives the geometry after each change.
pub trait RenderSink {
    fn redraw(&mut self, ring: &[Point; 5], markers: &CornerMarkers);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DragListeners {
    pointer_move: bool,
    pointer_up: bool,
}

impl DragListeners {
    fn attach(&mut self) {
        self.pointer_move = true;
        self.pointer_up = true;
    }

    fn detach(&mut self) {
        *self = Self::default();
    }

    fn count(self) -> usize {
        usize::from(self.pointer_move) + usize::from(self.pointer_up)
    }
}

/// Editing state for one selection rectangle.
pub struct EditSession {
    rectangle: Option<Rectangle>,
    drag: DragState,
    listeners: DragListeners,
    active: bool,
    revision: u64,
    sink: Option<Box<dyn RenderSink + Send>>,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("rectangle", &self.rectangle)
            .field("drag", &self.drag)
            .field("active", &self.active)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            rectangle: None,
            drag: DragState::Idle,
            listeners: DragListeners::default(),
            active: false,
            revision: 0,
            sink: None,
        }
    }

    pub fn set_render_sink(&mut self, sink: impl RenderSink + Send + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// Shows the editor. The first activation places the rectangle at a
    /// third of the visible extent around `center`; later ones keep it.
    pub fn activate(&mut self, visible: Bounds, center: Point) -> Result<()> {
        if self.rectangle.is_none() {
            self.rectangle = Some(Rectangle::centered_third(visible, center)?);
            self.bump();
        }
        self.active = true;
        Ok(())
    }

    /// Hides the editor, ending any drag and detaching its listeners.
    pub fn teardown(&mut self) {
        self.end_drag();
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Replaces the rectangle with typed-in bounds.
    ///
    /// # Errors
    ///
    /// [`ClipError::NotReady`] while a drag is in progress, or
    /// [`ClipError::InvalidBounds`] for out-of-order extents.
    pub fn set_bounds(&mut self, bounds: Bounds) -> Result<()> {
        if self.drag != DragState::Idle {
            return Err(ClipError::not_ready("rectangle is being dragged"));
        }
        self.rectangle = Some(Rectangle::from_bounds(
            bounds.west,
            bounds.east,
            bounds.south,
            bounds.north,
        )?);
        self.bump();
        Ok(())
    }

    pub fn rectangle(&self) -> Option<&Rectangle> {
        self.rectangle.as_ref()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.rectangle.as_ref().map(Rectangle::bounds)
    }

    pub fn markers(&self) -> Option<CornerMarkers> {
        self.rectangle.as_ref().map(Rectangle::corner_markers)
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    /// Incremented on every geometry change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of pointer listeners currently attached (0 when idle).
    pub fn attached_listeners(&self) -> usize {
        self.listeners.count()
    }

    /// Finds what is under `pos`; `tolerance` is the marker radius in map units.
    pub fn hit_test(&self, pos: Point, tolerance: f64) -> Option<HitTarget> {
        if !self.active {
            return None;
        }
        let rect = self.rectangle.as_ref()?;
        let tolerance_sq = tolerance * tolerance;

        let nearest = rect
            .corner_markers()
            .iter()
            .map(|(corner, p)| (corner, p.distance_sq(pos)))
            .filter(|(_, d)| *d <= tolerance_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((corner, _)) = nearest {
            return Some(HitTarget::Vertex(corner));
        }

        rect.contains(pos).then_some(HitTarget::Fill)
    }

    /// Starts a drag if the pointer is over a marker or the fill.
    pub fn pointer_down(&mut self, pos: Point, tolerance: f64) -> PointerOutcome {
        let Some(target) = self.hit_test(pos, tolerance) else {
            return PointerOutcome::PassThrough;
        };

        // a lost pointer-up must not leave a second set of listeners behind
        self.listeners.detach();
        self.drag = match target {
            HitTarget::Vertex(corner) => DragState::DraggingVertex(corner),
            HitTarget::Fill => DragState::DraggingBox { origin: pos },
        };
        self.listeners.attach();
        trace!(?target, "drag started");
        PointerOutcome::Captured(target)
    }

    /// Applies a pointer move. Returns whether the rectangle changed.
    pub fn pointer_move(&mut self, pos: Point) -> bool {
        if !self.listeners.pointer_move {
            return false;
        }
        let Some(rect) = self.rectangle.as_mut() else {
            return false;
        };

        match self.drag {
            DragState::Idle => return false,
            DragState::DraggingVertex(corner) => rect.update_corner(corner, pos.x, pos.y),
            DragState::DraggingBox { origin } => {
                rect.translate(pos.x - origin.x, pos.y - origin.y);
                self.drag = DragState::DraggingBox { origin: pos };
            }
        }
        self.bump();
        true
    }

    /// Ends the current drag.
    pub fn pointer_up(&mut self) {
        if self.listeners.pointer_up {
            self.end_drag();
        }
    }

    /// Cursor for the current hover position and drag.
    pub fn cursor(&self, hover: Option<Point>, tolerance: f64) -> Cursor {
        match self.drag {
            DragState::DraggingVertex(_) | DragState::DraggingBox { .. } => Cursor::Grabbing,
            DragState::Idle => match hover.and_then(|p| self.hit_test(p, tolerance)) {
                Some(HitTarget::Vertex(_)) => Cursor::Grab,
                Some(HitTarget::Fill) => Cursor::Move,
                None => Cursor::Default,
            },
        }
    }

    fn end_drag(&mut self) {
        if self.drag != DragState::Idle {
            trace!(drag = ?self.drag, "drag ended");
        }
        self.drag = DragState::Idle;
        self.listeners.detach();
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        if let (Some(sink), Some(rect)) = (self.sink.as_mut(), self.rectangle.as_ref()) {
            sink.redraw(rect.ring(), &rect.corner_markers());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 0.1;

    fn session() -> EditSession {
        let mut s = EditSession::new();
        let visible = Bounds {
            west: -3.0,
            south: -3.0,
            east: 3.0,
            north: 3.0,
        };
        s.activate(visible, visible.center()).unwrap();
        s
    }

    #[test]
    fn first_activation_places_a_third_of_the_view() {
        let s = session();
        let b = s.bounds().unwrap();
        assert_eq!(b.to_bbox(), [-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn markers_take_priority_over_fill() {
        let s = session();
        assert_eq!(
            s.hit_test(Point::new(-0.95, -0.95), TOL),
            Some(HitTarget::Vertex(Corner::Sw))
        );
        assert_eq!(s.hit_test(Point::new(0.0, 0.0), TOL), Some(HitTarget::Fill));
        assert_eq!(s.hit_test(Point::new(2.0, 2.0), TOL), None);
    }

    #[test]
    fn vertex_drag_updates_corner_until_pointer_up() {
        let mut s = session();
        let outcome = s.pointer_down(Point::new(1.0, 1.0), TOL);
        assert_eq!(outcome, PointerOutcome::Captured(HitTarget::Vertex(Corner::Ne)));
        assert_eq!(s.attached_listeners(), 2);

        assert!(s.pointer_move(Point::new(2.0, 1.5)));
        let m = s.markers().unwrap();
        assert_eq!(m.ne, Point::new(2.0, 1.5));
        assert_eq!(m.nw, Point::new(-1.0, 1.5));
        assert_eq!(m.se, Point::new(2.0, -1.0));
        assert_eq!(m.sw, Point::new(-1.0, -1.0));

        s.pointer_up();
        assert_eq!(s.drag_state(), DragState::Idle);
        assert!(!s.pointer_move(Point::new(5.0, 5.0)));
        assert_eq!(s.markers().unwrap().ne, Point::new(2.0, 1.5));
    }

    #[test]
    fn box_drag_uses_incremental_deltas() {
        let mut s = session();
        s.pointer_down(Point::new(0.0, 0.0), TOL);
        s.pointer_move(Point::new(0.5, 0.0));
        s.pointer_move(Point::new(1.0, 0.25));
        assert_eq!(
            s.drag_state(),
            DragState::DraggingBox {
                origin: Point::new(1.0, 0.25)
            }
        );
        s.pointer_up();

        let b = s.bounds().unwrap();
        assert_eq!(b.to_bbox(), [0.0, -0.75, 2.0, 1.25]);
    }

    #[test]
    fn pointer_down_outside_passes_through() {
        let mut s = session();
        assert_eq!(
            s.pointer_down(Point::new(2.5, 2.5), TOL),
            PointerOutcome::PassThrough
        );
        assert_eq!(s.drag_state(), DragState::Idle);
        assert_eq!(s.attached_listeners(), 0);
    }

    #[test]
    fn repeated_drags_never_accumulate_listeners() {
        let mut s = session();
        for _ in 0..10 {
            s.pointer_down(Point::new(0.0, 0.0), TOL);
            // pointer-up lost: the next down must replace, not add
            s.pointer_down(Point::new(0.0, 0.0), TOL);
            assert_eq!(s.attached_listeners(), 2);
            s.pointer_up();
            assert_eq!(s.attached_listeners(), 0);
        }
    }

    #[test]
    fn teardown_detaches_and_ignores_stray_moves() {
        let mut s = session();
        s.pointer_down(Point::new(-1.0, 1.0), TOL);
        s.teardown();
        assert_eq!(s.attached_listeners(), 0);
        let revision = s.revision();
        assert!(!s.pointer_move(Point::new(9.0, 9.0)));
        assert_eq!(s.revision(), revision);
        assert!(!s.is_active());
        assert_eq!(s.hit_test(Point::new(0.0, 0.0), TOL), None);
    }

    #[test]
    fn reactivation_keeps_the_edited_rectangle() {
        let mut s = session();
        s.pointer_down(Point::new(0.0, 0.0), TOL);
        s.pointer_move(Point::new(1.0, 1.0));
        s.pointer_up();
        s.teardown();

        let elsewhere = Bounds {
            west: 10.0,
            south: 10.0,
            east: 20.0,
            north: 20.0,
        };
        s.activate(elsewhere, elsewhere.center()).unwrap();
        assert_eq!(s.bounds().unwrap().to_bbox(), [0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn set_bounds_is_refused_mid_drag() {
        let mut s = session();
        s.pointer_down(Point::new(0.0, 0.0), TOL);
        let target = Bounds {
            west: 0.0,
            south: 0.0,
            east: 1.0,
            north: 1.0,
        };
        assert!(matches!(s.set_bounds(target), Err(ClipError::NotReady(_))));
        s.pointer_up();
        s.set_bounds(target).unwrap();
        assert_eq!(s.bounds(), Some(target));
    }

    #[derive(Clone, Default)]
    struct Recorder(std::sync::Arc<std::sync::Mutex<Vec<Point>>>);

    impl RenderSink for Recorder {
        fn redraw(&mut self, ring: &[Point; 5], markers: &CornerMarkers) {
            assert_eq!(ring[0], markers.sw);
            self.0.lock().unwrap().push(markers.ne);
        }
    }

    #[test]
    fn render_sink_sees_every_change() {
        let mut s = session();
        let recorder = Recorder::default();
        s.set_render_sink(recorder.clone());

        s.pointer_down(Point::new(1.0, 1.0), TOL);
        s.pointer_move(Point::new(1.5, 1.5));
        s.pointer_move(Point::new(2.0, 2.0));
        s.pointer_up();
        s.pointer_move(Point::new(3.0, 3.0));

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec![Point::new(1.5, 1.5), Point::new(2.0, 2.0)]);
    }

    #[test]
    fn cursor_follows_hover_and_drag() {
        let mut s = session();
        assert_eq!(s.cursor(Some(Point::new(0.0, 0.0)), TOL), Cursor::Move);
        assert_eq!(s.cursor(Some(Point::new(1.0, -1.0)), TOL), Cursor::Grab);
        assert_eq!(s.cursor(Some(Point::new(2.5, 0.0)), TOL), Cursor::Default);
        s.pointer_down(Point::new(0.0, 0.0), TOL);
        assert_eq!(s.cursor(None, TOL), Cursor::Grabbing);
    }
}

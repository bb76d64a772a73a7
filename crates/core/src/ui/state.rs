//! UI-side plumbing shared by the window and the background runner.

use crate::client::ClipResponse;
use crate::jobs::EventSink;
use crate::workflow::WorkflowEvent;
use eframe::egui;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Last finished clip, handed back to the caller once the window closes.
pub type SharedOutcome = Arc<Mutex<Option<ClipResponse>>>;

/// Forwards events to the UI thread and wakes the event loop.
#[derive(Clone)]
pub(crate) struct RepaintingSink {
    tx: Sender<WorkflowEvent>,
    ctx: egui::Context,
}

impl RepaintingSink {
    pub(crate) fn new(tx: Sender<WorkflowEvent>, ctx: egui::Context) -> Self {
        Self { tx, ctx }
    }
}

impl EventSink for RepaintingSink {
    fn emit(&self, event: WorkflowEvent) {
        if self.tx.send(event).is_ok() {
            self.ctx.request_repaint();
        }
    }
}

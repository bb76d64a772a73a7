//! Main clipping window.
//!
//! `ClipperApp` implements `eframe::App`: a map canvas with the selection
//! overlay on the right and the raster and job controls in a side panel.

use super::rendering::{draw_colorbar, draw_graticule, draw_markers, draw_selection};
use super::selection::{DragOwner, cursor_icon, process_pointer};
use super::settings::Settings;
use super::state::{RepaintingSink, SharedOutcome};
use crate::client::RasterClient;
use crate::config::Config;
use crate::editor::{DragState, EditSession};
use crate::error::{ClipError, Result};
use crate::geometry::Bounds;
use crate::jobs::JobRunner;
use crate::viewport::Viewport;
use crate::workflow::{ClipWorkflow, IndicatorStatus, JobState, JobUpdate, WorkflowEvent};
use eframe::egui;
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;
use tracing::warn;

/// Repaint interval while work is in flight.
const BUSY_REPAINT: Duration = Duration::from_millis(200);

pub struct ClipperApp {
    workflow: ClipWorkflow,
    session: EditSession,
    viewport: Viewport,
    runner: JobRunner<RepaintingSink>,
    rx: Receiver<WorkflowEvent>,
    settings: Settings,
    cog_input: String,
    drag_owner: DragOwner,
    /// Bounds typed into the side panel, applied on change.
    bounds_input: Option<Bounds>,
    /// Short-lived message for input errors.
    notice: Option<String>,
    outcome: SharedOutcome,
}

impl ClipperApp {
    /// Creates the window state and starts loading `initial_url`, if any.
    pub fn new(
        ctx: &egui::Context,
        config: Config,
        initial_url: Option<String>,
        initial_bounds: Option<Bounds>,
        outcome: SharedOutcome,
    ) -> Result<Self> {
        let (tx, rx) = channel();
        let client = RasterClient::new(&config)?;
        let runner = JobRunner::new(client, RepaintingSink::new(tx, ctx.clone()));

        let settings = Settings::load();
        let mut workflow = ClipWorkflow::new(&config);
        workflow.form = settings.form();

        let mut session = EditSession::new();
        if let Some(bounds) = initial_bounds {
            session.set_bounds(bounds)?;
        }

        let cog_input = initial_url
            .clone()
            .unwrap_or_else(|| settings.last_cog_url.clone());

        let mut app = Self {
            workflow,
            session,
            viewport: Viewport::new(config.start_lat, config.start_lng, config.start_zoom),
            runner,
            rx,
            settings,
            cog_input,
            drag_owner: DragOwner::None,
            bounds_input: None,
            notice: None,
            outcome,
        };
        if initial_url.is_some() {
            app.load_raster();
        }
        Ok(app)
    }

    fn load_raster(&mut self) {
        match self.workflow.activate_raster(&self.cog_input) {
            Ok(aborted) => {
                if let Some(job) = aborted {
                    self.runner.abort(job);
                }
                self.notice = None;
                let url = self.cog_input.trim().to_string();
                self.settings.last_cog_url = url.clone();
                self.save_settings();
                if let Err(e) = self.runner.fetch_metadata(url) {
                    self.notice = Some(e.to_string());
                }
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    fn lookup_epsg(&mut self) {
        let (Some(url), Ok(code)) = (
            self.workflow.raster_url(),
            self.workflow.form.epsg.trim().parse::<u32>(),
        ) else {
            return;
        };
        if let Err(e) = self.runner.lookup_epsg(url.to_string(), code) {
            self.notice = Some(e.to_string());
        }
    }

    fn submit(&mut self) {
        let Some(bounds) = self.session.bounds() else {
            self.notice = Some("Draw a selection first".to_string());
            return;
        };
        self.settings.remember_form(&self.workflow.form);
        self.save_settings();

        match self.workflow.begin_submit(bounds) {
            Ok((job, request)) => {
                self.notice = None;
                if let Err(e) = self.runner.start_job(job, request) {
                    self.workflow.apply(WorkflowEvent::Job {
                        job,
                        update: JobUpdate::Failed(e),
                    });
                }
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    fn cancel(&mut self) {
        if let Some(job) = self.workflow.cancel() {
            self.runner.abort(job);
        }
    }

    fn save_settings(&self) {
        if let Err(e) = self.settings.save() {
            warn!(error = %e, "failed to save settings");
        }
    }

    /// Applies pending background events.
    fn process_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.workflow.apply(event);
        }
        if let Some(response) = self.workflow.download() {
            if let Ok(mut slot) = self.outcome.lock() {
                *slot = Some(response.clone());
            }
        }
    }

    fn render_side_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Clip raster");
        ui.add_space(4.0);

        ui.label("Cloud-optimized GeoTIFF URL:");
        let response = ui.add(
            egui::TextEdit::singleline(&mut self.cog_input)
                .desired_width(f32::INFINITY)
                .hint_text("https://.../raster.tif"),
        );
        let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        if ui.button("Load").clicked() || enter {
            self.load_raster();
        }

        if self.workflow.state() == JobState::FetchingMetadata {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading raster details...");
            });
        }

        if let Some(title) = self.workflow.title() {
            ui.separator();
            ui.strong(title);
        }
        if let Some(attribution) = self.workflow.attribution() {
            ui.small(format!("© {}", attribution));
        }
        if let Some(colormap) = self.workflow.colormap() {
            let (rect, _) =
                ui.allocate_exact_size(egui::vec2(ui.available_width(), 14.0), egui::Sense::hover());
            draw_colorbar(ui.painter(), rect, colormap);
        }
        if let Some(tile_url) = self.workflow.tile_url() {
            if ui.small_button("Copy tile URL").clicked() {
                copy_to_clipboard(tile_url);
            }
        }

        ui.separator();
        self.render_bounds(ui);

        ui.separator();
        self.render_overrides(ui);

        ui.separator();
        self.render_job(ui);

        if let Some(notice) = &self.notice {
            ui.add_space(4.0);
            ui.colored_label(egui::Color32::LIGHT_RED, notice);
        }
    }

    fn render_bounds(&mut self, ui: &mut egui::Ui) {
        ui.label("Selection (W, S, E, N):");
        let Some(current) = self.session.bounds() else {
            ui.weak("Load a raster to place the selection");
            return;
        };
        if self.session.drag_state() != DragState::Idle {
            self.bounds_input = None;
        }
        let mut edited = self.bounds_input.unwrap_or(current);
        let mut changed = false;
        egui::Grid::new("bounds_grid").num_columns(2).show(ui, |ui| {
            for (label, value) in [
                ("West", &mut edited.west),
                ("South", &mut edited.south),
                ("East", &mut edited.east),
                ("North", &mut edited.north),
            ] {
                ui.label(label);
                changed |= ui
                    .add(egui::DragValue::new(value).speed(0.01).max_decimals(6))
                    .changed();
                ui.end_row();
            }
        });

        if changed {
            match self.session.set_bounds(edited) {
                Ok(()) => self.bounds_input = None,
                // keep the typed values until they form a valid extent
                Err(_) => self.bounds_input = Some(edited),
            }
        }
    }

    fn render_overrides(&mut self, ui: &mut egui::Ui) {
        let form = &mut self.workflow.form;

        ui.checkbox(&mut form.epsg_enabled, "Reproject to EPSG");
        let mut lookup = false;
        ui.add_enabled_ui(form.epsg_enabled, |ui| {
            let response = ui.add(egui::TextEdit::singleline(&mut form.epsg).desired_width(80.0));
            lookup = response.lost_focus();
        });

        ui.checkbox(&mut form.cellsize_enabled, "Resample cell size");
        ui.add_enabled_ui(form.cellsize_enabled, |ui| {
            ui.horizontal(|ui| {
                ui.label("x");
                ui.add(egui::TextEdit::singleline(&mut form.cellsize_x).desired_width(70.0));
                ui.label("y");
                ui.add(egui::TextEdit::singleline(&mut form.cellsize_y).desired_width(70.0));
            });
        });

        if lookup {
            self.lookup_epsg();
        }

        match (self.workflow.epsg_name(), self.workflow.epsg_message()) {
            (Some(name), _) => {
                let units = self.workflow.epsg_units().unwrap_or_default();
                ui.small(format!("{} ({})", name, units));
            }
            (None, Some(message)) => {
                ui.colored_label(egui::Color32::YELLOW, message);
            }
            (None, None) => {}
        }
    }

    fn render_job(&mut self, ui: &mut egui::Ui) {
        let can_submit = self.workflow.can_submit() && self.session.bounds().is_some();
        ui.horizontal(|ui| {
            let submit = egui::Button::new(self.workflow.submit_label());
            if ui.add_enabled(can_submit, submit).clicked() {
                self.submit();
            }
            if self.workflow.state().is_busy() && ui.button("Cancel").clicked() {
                self.cancel();
            }
        });

        let indicator = &self.workflow.indicator;
        match indicator.status {
            IndicatorStatus::Hidden => {}
            IndicatorStatus::Busy | IndicatorStatus::Success => {
                ui.add(
                    egui::ProgressBar::new(indicator.fraction)
                        .text(indicator.label.as_str())
                        .animate(indicator.animated),
                );
            }
            IndicatorStatus::Error => {
                ui.colored_label(egui::Color32::LIGHT_RED, indicator.label.as_str());
            }
        }

        if let (Some(download), Some(label)) =
            (self.workflow.download(), self.workflow.download_label())
        {
            ui.hyperlink_to(label, &download.url);
            if ui.small_button("Copy link").clicked() {
                copy_to_clipboard(&download.url);
            }
        }
    }

    fn render_canvas(&mut self, ui: &mut egui::Ui) {
        let screen = ui.max_rect();
        let response = ui.interact(screen, ui.id().with("canvas"), egui::Sense::drag());

        if self.workflow.raster_url().is_some() && !self.session.is_active() {
            let visible = self.viewport.bounds(screen);
            if let Err(e) = self.session.activate(visible, self.viewport.center) {
                self.notice = Some(e.to_string());
            }
        }

        self.drag_owner = process_pointer(
            &response,
            self.drag_owner,
            &mut self.session,
            &mut self.viewport,
            screen,
        );
        if response.hovered() || self.drag_owner != DragOwner::None {
            ui.ctx().set_cursor_icon(cursor_icon(
                &response,
                self.drag_owner,
                &self.session,
                &self.viewport,
                screen,
            ));
        }

        let painter = ui.painter_at(screen);
        painter.rect_filled(screen, 0.0, egui::Color32::from_gray(24));
        draw_graticule(&painter, &self.viewport, screen);

        if self.session.is_active() {
            if let (Some(rect), Some(markers)) = (self.session.rectangle(), self.session.markers()) {
                draw_selection(&painter, rect.ring(), &self.viewport, screen);
                draw_markers(&painter, &markers, &self.viewport, screen);
            }
        }

        painter.text(
            screen.right_bottom() - egui::vec2(6.0, 6.0),
            egui::Align2::RIGHT_BOTTOM,
            format!(
                "{:.4}, {:.4}  z{:.1}",
                self.viewport.center.y, self.viewport.center.x, self.viewport.zoom
            ),
            egui::FontId::monospace(11.0),
            egui::Color32::from_gray(160),
        );
    }
}

impl eframe::App for ClipperApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(egui::Visuals::dark());
        self.process_events();

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.cancel();
        }

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.render_side_panel(ui));
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| self.render_canvas(ui));

        if matches!(
            self.workflow.state(),
            JobState::FetchingMetadata | JobState::Submitting | JobState::StreamingProgress
        ) {
            ctx.request_repaint_after(BUSY_REPAINT);
        }
    }
}

fn copy_to_clipboard(text: &str) {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => {
            if let Err(e) = clipboard.set_text(text) {
                warn!(error = %e, "clipboard write failed");
            }
        }
        Err(e) => warn!(error = %e, "clipboard unavailable"),
    }
}

/// Opens the clipping window and blocks until it is closed.
///
/// Returns the last finished clip, if any.
pub fn run(
    config: Config,
    initial_url: Option<String>,
    initial_bounds: Option<Bounds>,
) -> Result<Option<crate::client::ClipResponse>> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("cogclip")
            .with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };

    let outcome = SharedOutcome::default();
    let app_outcome = outcome.clone();

    eframe::run_native(
        "cogclip",
        options,
        Box::new(move |cc| {
            let app = ClipperApp::new(&cc.egui_ctx, config, initial_url, initial_bounds, app_outcome)?;
            Ok(Box::new(app) as Box<dyn eframe::App>)
        }),
    )
    .map_err(|e| ClipError::ui(format!("Failed to run UI: {}", e)))?;

    let lock = outcome
        .lock()
        .map_err(|_| ClipError::ui("Failed to acquire result lock"))?;
    Ok(lock.clone())
}

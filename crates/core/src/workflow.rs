//! Clip workflow state machine.
//!
//! [`ClipWorkflow`] holds everything the user sees about the active raster
//! and the current clip job. It never performs I/O: background tasks report
//! through [`WorkflowEvent`]s, and the owner applies them in arrival order
//! with [`ClipWorkflow::apply`].
//!
//! ```text
//! Idle -> FetchingMetadata -> ReadyToSubmit -> Submitting -> StreamingProgress
//!                                   ^                              |
//!                                   +---- Completed | Cancelled | Failed
//! ```

use crate::client::{ClipRequest, ClipResponse, EpsgInfo, LayerMetadata, RasterInfo};
use crate::colormap::{ColorMap, DEFAULT_RAMP, RasterStatistics, build_colormap};
use crate::config::Config;
use crate::error::{ClipError, Result};
use crate::geometry::Bounds;
use crate::progress::{LogRecord, ProgressUpdate};
use crate::tiles::colorized_tile_url;
use tracing::{debug, error, info, trace, warn};

/// Identifier of one clip submission.
pub type JobId = u64;

/// EPSG code sent when neither an override nor the raster's own code is known.
pub const FALLBACK_EPSG: u32 = 4326;

pub const SUBMIT_LABEL: &str = "Clip raster";
pub const SUBMITTING_LABEL: &str = "Clipping...";
pub const STARTING_LABEL: &str = "Starting ...";
pub const DONE_LABEL: &str = "Done!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    FetchingMetadata,
    ReadyToSubmit,
    Submitting,
    StreamingProgress,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    /// Whether a clip job is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, JobState::Submitting | JobState::StreamingProgress)
    }
}

/// Result of one metadata call for a raster.
#[derive(Debug)]
pub enum Enrichment {
    ProbeFailed(ClipError),
    Statistics(Result<RasterStatistics>),
    Metadata(Result<LayerMetadata>),
    Info(Result<RasterInfo>),
    EpsgInfo { code: u32, result: Result<EpsgInfo> },
}

/// Progress of a running clip job.
#[derive(Debug)]
pub enum JobUpdate {
    StreamOpened,
    Progress(LogRecord),
    /// The status stream closed; the error says why, if known.
    StreamEnded(Option<ClipError>),
    Completed(ClipResponse),
    Failed(ClipError),
}

/// Message from a background task to the workflow owner.
#[derive(Debug)]
pub enum WorkflowEvent {
    Enrichment {
        raster_url: String,
        update: Enrichment,
    },
    Job {
        job: JobId,
        update: JobUpdate,
    },
}

/// Reprojection and resampling overrides as typed by the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetForm {
    pub epsg: String,
    pub epsg_enabled: bool,
    pub cellsize_x: String,
    pub cellsize_y: String,
    pub cellsize_enabled: bool,
}

impl TargetForm {
    fn epsg_override(&self) -> Result<Option<u32>> {
        if !self.epsg_enabled {
            return Ok(None);
        }
        self.epsg
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ClipError::config(format!("Invalid EPSG code: {:?}", self.epsg)))
    }

    fn cellsize_override(&self) -> Result<Option<[f64; 2]>> {
        if !self.cellsize_enabled {
            return Ok(None);
        }
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite() && *n != 0.0)
                .ok_or_else(|| ClipError::config(format!("Invalid cell size: {:?}", v)))
        };
        Ok(Some([parse(&self.cellsize_x)?, parse(&self.cellsize_y)?]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorStatus {
    #[default]
    Hidden,
    Busy,
    Success,
    Error,
}

/// What the progress bar shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressIndicator {
    pub label: String,
    /// Bar width in `0.0..=1.0`.
    pub fraction: f32,
    /// Indeterminate animation while no percentage is known.
    pub animated: bool,
    pub status: IndicatorStatus,
}

impl ProgressIndicator {
    fn starting(&mut self) {
        *self = Self {
            label: STARTING_LABEL.to_string(),
            fraction: 0.0,
            animated: true,
            status: IndicatorStatus::Busy,
        };
    }

    fn update(&mut self, update: &ProgressUpdate) {
        self.label = update.label().to_string();
        self.fraction = update.fraction();
        self.animated = matches!(update, ProgressUpdate::Finalizing);
    }

    fn succeed(&mut self) {
        self.label = DONE_LABEL.to_string();
        self.fraction = 1.0;
        self.animated = false;
        self.status = IndicatorStatus::Success;
    }

    fn fail(&mut self, message: String) {
        self.label = message;
        self.animated = false;
        self.status = IndicatorStatus::Error;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// State of the raster being clipped and of its clip jobs.
#[derive(Debug)]
pub struct ClipWorkflow {
    tiles_endpoint: String,
    state: JobState,
    raster_url: Option<String>,
    /// Cleared when the raster did not answer the HEAD probe.
    reachable: bool,
    next_job: JobId,
    active_job: Option<JobId>,
    colormap: Option<ColorMap>,
    tile_url: Option<String>,
    metadata: Option<LayerMetadata>,
    info: Option<RasterInfo>,
    epsg: Option<EpsgInfo>,
    epsg_message: Option<String>,
    result: Option<ClipResponse>,
    last_error: Option<String>,
    /// Overrides edited by the user.
    pub form: TargetForm,
    pub indicator: ProgressIndicator,
}

impl ClipWorkflow {
    pub fn new(config: &Config) -> Self {
        Self {
            tiles_endpoint: config.tiles_endpoint(),
            state: JobState::Idle,
            raster_url: None,
            reachable: false,
            next_job: 0,
            active_job: None,
            colormap: None,
            tile_url: None,
            metadata: None,
            info: None,
            epsg: None,
            epsg_message: None,
            result: None,
            last_error: None,
            form: TargetForm::default(),
            indicator: ProgressIndicator::default(),
        }
    }

    /// Switches to a new raster and starts over.
    ///
    /// A job still in flight is cancelled; its id is returned so the caller
    /// can abort the task behind it.
    ///
    /// # Errors
    ///
    /// [`ClipError::Config`] if `raster_url` is not an absolute http(s) URL.
    /// The workflow is left untouched in that case.
    pub fn activate_raster(&mut self, raster_url: &str) -> Result<Option<JobId>> {
        let parsed = url::Url::parse(raster_url.trim())
            .map_err(|e| ClipError::config(format!("Invalid raster URL {:?}: {}", raster_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClipError::config(format!(
                "Raster URL must use http or https: {}",
                raster_url
            )));
        }

        let aborted = self.cancel();
        info!(raster_url = %parsed, "activating raster");

        self.raster_url = Some(raster_url.trim().to_string());
        self.reachable = true;
        self.state = JobState::FetchingMetadata;
        self.active_job = None;
        self.colormap = None;
        self.tile_url = None;
        self.metadata = None;
        self.info = None;
        self.epsg = None;
        self.epsg_message = None;
        self.result = None;
        self.last_error = None;
        self.indicator.reset();
        Ok(aborted)
    }

    /// Applies a background event. Returns whether anything changed;
    /// events for another raster or a superseded job are dropped.
    pub fn apply(&mut self, event: WorkflowEvent) -> bool {
        match event {
            WorkflowEvent::Enrichment { raster_url, update } => {
                if self.raster_url.as_deref() != Some(raster_url.as_str()) {
                    trace!(raster_url, "dropping enrichment for inactive raster");
                    return false;
                }
                self.apply_enrichment(&raster_url, update)
            }
            WorkflowEvent::Job { job, update } => {
                if self.active_job != Some(job) {
                    trace!(job, "dropping event from superseded job");
                    return false;
                }
                self.apply_job_update(job, update)
            }
        }
    }

    fn apply_enrichment(&mut self, raster_url: &str, update: Enrichment) -> bool {
        match update {
            Enrichment::ProbeFailed(err) => {
                if self.state != JobState::FetchingMetadata {
                    return false;
                }
                error!(raster_url, error = %err, "raster is unreachable");
                self.reachable = false;
                self.state = JobState::Failed;
                self.indicator.fail(err.to_string());
                self.last_error = Some(err.to_string());
            }
            Enrichment::Statistics(Ok(stats)) => {
                let Some(band) = stats.band(1) else {
                    warn!(raster_url, "statistics carry no band 1");
                    return false;
                };
                if let Err(err) = band.check() {
                    warn!(raster_url, error = %err, "colorizing a constant raster");
                }
                let colormap = build_colormap(band, &DEFAULT_RAMP);
                self.tile_url = Some(colorized_tile_url(
                    &self.tiles_endpoint,
                    raster_url,
                    band,
                    &colormap,
                ));
                self.colormap = Some(colormap);
            }
            Enrichment::Statistics(Err(err)) => {
                warn!(raster_url, error = %err, "statistics unavailable");
                return false;
            }
            Enrichment::Metadata(Ok(metadata)) => self.metadata = Some(metadata),
            Enrichment::Metadata(Err(err)) => {
                warn!(raster_url, error = %err, "metadata unavailable");
                return false;
            }
            Enrichment::Info(result) => {
                match result {
                    Ok(info) => {
                        if !self.form.epsg_enabled {
                            self.form.epsg = info.epsg.map(|c| c.to_string()).unwrap_or_default();
                        }
                        if !self.form.cellsize_enabled {
                            self.form.cellsize_x = info.pixel_size.0.to_string();
                            self.form.cellsize_y = info.pixel_size.1.to_string();
                        }
                        self.info = Some(info);
                    }
                    Err(err) => warn!(raster_url, error = %err, "raster info unavailable"),
                }
                if self.state == JobState::FetchingMetadata {
                    self.state = JobState::ReadyToSubmit;
                }
            }
            Enrichment::EpsgInfo { code, result } => match result {
                Ok(info) if info.is_success() => {
                    self.epsg_message = None;
                    self.epsg = Some(info);
                }
                Ok(_) => {
                    warn!(code, "EPSG code not recognized");
                    self.epsg = None;
                    self.epsg_message = Some(format!("EPSG:{} is not a recognized code", code));
                }
                Err(err) => {
                    warn!(code, error = %err, "EPSG lookup failed");
                    self.epsg = None;
                    self.epsg_message = Some(format!("Could not look up EPSG:{}", code));
                }
            },
        }
        true
    }

    fn apply_job_update(&mut self, job: JobId, update: JobUpdate) -> bool {
        match update {
            JobUpdate::StreamOpened => {
                debug!(job, "status stream opened");
                if self.state == JobState::Submitting {
                    self.state = JobState::StreamingProgress;
                }
            }
            JobUpdate::Progress(record) => {
                let Some(progress) = record.progress() else {
                    trace!(job, logger = %record.name, message = %record.message, "status");
                    return false;
                };
                if self.state == JobState::Submitting {
                    self.state = JobState::StreamingProgress;
                }
                self.indicator.update(&progress);
            }
            JobUpdate::StreamEnded(reason) => {
                match reason {
                    Some(err) => warn!(job, error = %err, "status stream ended"),
                    None => debug!(job, "status stream ended"),
                }
                return false;
            }
            JobUpdate::Completed(response) => {
                info!(job, url = %response.url, size = %response.size, "clip finished");
                self.state = JobState::Completed;
                self.active_job = None;
                self.indicator.succeed();
                self.result = Some(response);
            }
            JobUpdate::Failed(err) => {
                error!(job, error = %err, "clip failed");
                self.state = JobState::Failed;
                self.active_job = None;
                self.indicator.fail(err.to_string());
                self.last_error = Some(err.to_string());
            }
        }
        true
    }

    /// Whether [`begin_submit`](Self::begin_submit) would be accepted.
    pub fn can_submit(&self) -> bool {
        self.raster_url.is_some()
            && self.reachable
            && matches!(
                self.state,
                JobState::ReadyToSubmit
                    | JobState::Completed
                    | JobState::Cancelled
                    | JobState::Failed
            )
    }

    /// Starts a clip job over `bounds` and returns its id with the request
    /// to send.
    ///
    /// # Errors
    ///
    /// [`ClipError::NotReady`] outside the submittable states, or
    /// [`ClipError::Config`] when an enabled override does not parse.
    pub fn begin_submit(&mut self, bounds: Bounds) -> Result<(JobId, ClipRequest)> {
        if !self.can_submit() {
            return Err(ClipError::not_ready(format!(
                "cannot submit while {:?}",
                self.state
            )));
        }
        let Some(cog_url) = self.raster_url.clone() else {
            return Err(ClipError::not_ready("no raster selected"));
        };

        let target_epsg = self
            .form
            .epsg_override()?
            .or_else(|| self.info.and_then(|i| i.epsg))
            .unwrap_or(FALLBACK_EPSG);
        let request = ClipRequest {
            cog_url,
            target_bbox: bounds.to_bbox(),
            target_epsg,
            target_cellsize: self.form.cellsize_override()?,
        };

        self.next_job += 1;
        let job = self.next_job;
        info!(job, bbox = ?request.target_bbox, epsg = target_epsg, "submitting clip");

        self.active_job = Some(job);
        self.state = JobState::Submitting;
        self.result = None;
        self.last_error = None;
        self.indicator.starting();
        Ok((job, request))
    }

    /// Cancels the running job, returning its id so the task can be aborted.
    pub fn cancel(&mut self) -> Option<JobId> {
        if !self.state.is_busy() {
            return None;
        }
        let job = self.active_job.take();
        info!(job, "clip cancelled");
        self.state = JobState::Cancelled;
        self.indicator.reset();
        job
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn raster_url(&self) -> Option<&str> {
        self.raster_url.as_deref()
    }

    pub fn active_job(&self) -> Option<JobId> {
        self.active_job
    }

    pub fn submit_label(&self) -> &'static str {
        if self.state.is_busy() {
            SUBMITTING_LABEL
        } else {
            SUBMIT_LABEL
        }
    }

    /// The finished clip. Only present in [`JobState::Completed`].
    pub fn download(&self) -> Option<&ClipResponse> {
        match self.state {
            JobState::Completed => self.result.as_ref(),
            _ => None,
        }
    }

    pub fn download_label(&self) -> Option<String> {
        self.download()
            .map(|r| format!("Download clipped raster ({})", r.size))
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref()?.title.as_deref()
    }

    pub fn attribution(&self) -> Option<&str> {
        self.metadata.as_ref()?.attribution()
    }

    pub fn tile_url(&self) -> Option<&str> {
        self.tile_url.as_deref()
    }

    pub fn colormap(&self) -> Option<&ColorMap> {
        self.colormap.as_ref()
    }

    pub fn raster_info(&self) -> Option<&RasterInfo> {
        self.info.as_ref()
    }

    pub fn epsg_name(&self) -> Option<&str> {
        self.epsg.as_ref().map(|e| e.epsg_name.as_str())
    }

    pub fn epsg_units(&self) -> Option<&str> {
        self.epsg.as_ref().map(|e| e.srs_units.as_str())
    }

    /// User-facing note about an unrecognized or unresolvable EPSG code.
    pub fn epsg_message(&self) -> Option<&str> {
        self.epsg_message.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RASTER: &str = "https://storage.example/bucket/awc.tif";

    fn bounds() -> Bounds {
        Bounds {
            west: -13.3,
            south: 7.2,
            east: -12.2,
            north: 8.0,
        }
    }

    fn ready() -> ClipWorkflow {
        let mut wf = ClipWorkflow::new(&Config::default());
        wf.activate_raster(RASTER).unwrap();
        wf.apply(WorkflowEvent::Enrichment {
            raster_url: RASTER.into(),
            update: Enrichment::Info(Ok(RasterInfo {
                epsg: Some(32628),
                pixel_size: (30.0, -30.0),
            })),
        });
        wf
    }

    #[test]
    fn rejects_non_http_urls() {
        let mut wf = ClipWorkflow::new(&Config::default());
        assert!(matches!(
            wf.activate_raster("s3://bucket/a.tif"),
            Err(ClipError::Config(_))
        ));
        assert!(wf.activate_raster("not a url").is_err());
        assert_eq!(wf.state(), JobState::Idle);
    }

    #[test]
    fn info_fills_form_defaults() {
        let wf = ready();
        assert_eq!(wf.state(), JobState::ReadyToSubmit);
        assert_eq!(wf.form.epsg, "32628");
        assert_eq!(wf.form.cellsize_x, "30");
        assert_eq!(wf.form.cellsize_y, "-30");
    }

    #[test]
    fn disabled_overrides_use_native_epsg_and_omit_cellsize() {
        let mut wf = ready();
        wf.form.epsg = "3857".into();
        let (_, request) = wf.begin_submit(bounds()).unwrap();
        assert_eq!(request.target_epsg, 32628);
        assert_eq!(request.target_cellsize, None);
        assert_eq!(request.target_bbox, [-13.3, 7.2, -12.2, 8.0]);
    }

    #[test]
    fn enabled_overrides_are_sent() {
        let mut wf = ready();
        wf.form.epsg = "3857".into();
        wf.form.epsg_enabled = true;
        wf.form.cellsize_x = "100".into();
        wf.form.cellsize_y = "-100".into();
        wf.form.cellsize_enabled = true;
        let (_, request) = wf.begin_submit(bounds()).unwrap();
        assert_eq!(request.target_epsg, 3857);
        assert_eq!(request.target_cellsize, Some([100.0, -100.0]));
    }

    #[test]
    fn invalid_override_keeps_workflow_ready() {
        let mut wf = ready();
        wf.form.epsg = "web mercator".into();
        wf.form.epsg_enabled = true;
        assert!(matches!(wf.begin_submit(bounds()), Err(ClipError::Config(_))));
        assert_eq!(wf.state(), JobState::ReadyToSubmit);
        assert_eq!(wf.active_job(), None);
    }

    #[test]
    fn missing_info_falls_back_to_wgs84() {
        let mut wf = ClipWorkflow::new(&Config::default());
        wf.activate_raster(RASTER).unwrap();
        wf.apply(WorkflowEvent::Enrichment {
            raster_url: RASTER.into(),
            update: Enrichment::Info(Err(ClipError::malformed("info", "no geoTransform"))),
        });
        assert_eq!(wf.state(), JobState::ReadyToSubmit);
        let (_, request) = wf.begin_submit(bounds()).unwrap();
        assert_eq!(request.target_epsg, FALLBACK_EPSG);
    }

    #[test]
    fn submit_labels_follow_state() {
        let mut wf = ready();
        assert_eq!(wf.submit_label(), SUBMIT_LABEL);
        wf.begin_submit(bounds()).unwrap();
        assert_eq!(wf.submit_label(), SUBMITTING_LABEL);
        assert_eq!(wf.indicator.label, STARTING_LABEL);
        assert!(!wf.can_submit());
    }

    #[test]
    fn unrecognized_epsg_is_reported() {
        let mut wf = ready();
        wf.apply(WorkflowEvent::Enrichment {
            raster_url: RASTER.into(),
            update: Enrichment::EpsgInfo {
                code: 999999,
                result: Ok(EpsgInfo {
                    status: "failure".into(),
                    epsg_name: String::new(),
                    srs_units: String::new(),
                }),
            },
        });
        assert_eq!(wf.epsg_name(), None);
        assert!(wf.epsg_message().unwrap().contains("999999"));
    }

    #[test]
    fn enrichment_for_previous_raster_is_dropped() {
        let mut wf = ready();
        wf.activate_raster("https://storage.example/bucket/other.tif")
            .unwrap();
        let changed = wf.apply(WorkflowEvent::Enrichment {
            raster_url: RASTER.into(),
            update: Enrichment::Metadata(Ok(LayerMetadata {
                title: Some("AWC".into()),
                contact: None,
            })),
        });
        assert!(!changed);
        assert_eq!(wf.title(), None);
        assert_eq!(wf.state(), JobState::FetchingMetadata);
    }
}

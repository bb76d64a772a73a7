//! cogclip Core Library
//!
//! This library provides the core functionality for cogclip, a client that
//! clips cloud-optimized GeoTIFFs through a remote clipping service.
//!
//! # Overview
//!
//! A user picks a raster, drags a rectangle over the map and submits it,
//! optionally with a target projection or cell size. The library handles:
//!
//! - **Geometry**: the selection ring and its corner edits via [`geometry`]
//! - **Editing**: pointer-driven drag state via [`editor`] and [`viewport`]
//! - **Preview**: percentile colormaps and tile URLs via [`colormap`] and [`tiles`]
//! - **Workflow**: the clip job state machine via [`workflow`] and [`jobs`]
//! - **Networking**: tile server and clipping service calls via [`client`]
//! - **User Interface**: the desktop window via [`ui`]
//!
//! # Quick Start
//!
//! ```ignore
//! use cogclip_core::{ClipWorkflow, Config, RasterClient, jobs};
//!
//! let config = Config::load()?;
//! let client = RasterClient::new(&config)?;
//! let mut workflow = ClipWorkflow::new(&config);
//!
//! workflow.activate_raster(raster_url)?;
//! jobs::fetch_metadata(&client, raster_url, &sink).await;
//! // apply events from `sink`, then:
//! let (job, request) = workflow.begin_submit(bounds)?;
//! jobs::run_clip_job(&client, job, request, &sink).await;
//! ```
//!
//! # Module Structure
//!
//! - [`client`]: HTTP calls and wire types
//! - [`colormap`]: statistics to color ramp mapping
//! - [`config`]: Configuration loading and management
//! - [`editor`]: rectangle edit session
//! - [`error`]: Error types and result aliases
//! - [`geometry`]: points, corners and the selection ring
//! - [`jobs`]: async pipelines and the background runner
//! - [`progress`]: status stream decoding
//! - [`tiles`]: colorized tile URL templates
//! - [`ui`]: User interface components
//! - [`viewport`]: screen to map mapping
//! - [`workflow`]: clip job state machine

pub mod client;
pub mod colormap;
pub mod config;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod jobs;
pub mod progress;
pub mod tiles;
pub mod ui;
pub mod viewport;
pub mod workflow;

// Re-export primary types for convenience
pub use client::{ClipRequest, ClipResponse, RasterClient};
pub use config::Config;
pub use editor::EditSession;
pub use error::{ClipError, Result};
pub use geometry::{Bounds, Corner, Point, Rectangle};
pub use jobs::{EventSink, JobRunner};
pub use workflow::{ClipWorkflow, JobState, WorkflowEvent};

/// Loads `.env` files so [`Config::load`] sees their variables.
///
/// Call this once at application startup.
pub fn init() {
    let _ = dotenvy::dotenv();
}

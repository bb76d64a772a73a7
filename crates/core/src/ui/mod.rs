//! Desktop window for interactive clipping.
//!
//! # Architecture
//!
//! The UI is split into focused submodules:
//! - [`state`]: channel plumbing between the window and background tasks
//! - [`settings`]: user preferences and persistence
//! - [`rendering`]: selection overlay, graticule and colorbar drawing
//! - [`selection`]: pointer routing between the editor and the map
//! - [`clipper`]: the window itself
//!
//! # Usage
//!
//! ```ignore
//! use cogclip_core::{ui, Config};
//!
//! let config = Config::load()?;
//! if let Some(clip) = ui::run_clip_ui(config, Some(raster_url), None)? {
//!     println!("{}", clip.url);
//! }
//! ```

mod clipper;
mod rendering;
mod selection;
mod settings;
mod state;

pub use clipper::ClipperApp;
pub use settings::Settings;
pub use state::SharedOutcome;

use crate::client::ClipResponse;
use crate::config::Config;
use crate::error::Result;
use crate::geometry::Bounds;

/// Opens the clipping window and returns the last finished clip, if any.
///
/// # Arguments
/// * `config` - Endpoints and start view
/// * `initial_url` - Raster to load on start
/// * `initial_bounds` - Selection to start from instead of the default placement
pub fn run_clip_ui(
    config: Config,
    initial_url: Option<String>,
    initial_bounds: Option<Bounds>,
) -> Result<Option<ClipResponse>> {
    clipper::run(config, initial_url, initial_bounds)
}

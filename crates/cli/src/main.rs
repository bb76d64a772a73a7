use anyhow::{Context, Result, bail};
use arboard::Clipboard;
use clap::Parser;
use cogclip_core::{
    ClipWorkflow, Config, JobState, RasterClient, Rectangle, WorkflowEvent, init, jobs, ui,
    workflow::IndicatorStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Ticks of the progress bar for a full job.
const BAR_LENGTH: u64 = 1000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cloud-optimized GeoTIFF to clip
    cog_url: Option<String>,

    /// Area to clip, in the raster's geographic coordinates
    #[arg(
        long,
        num_args = 4,
        value_names = ["WEST", "SOUTH", "EAST", "NORTH"],
        allow_negative_numbers = true
    )]
    bbox: Option<Vec<f64>>,

    /// Reproject the result to this EPSG code
    #[arg(long)]
    epsg: Option<u32>,

    /// Resample the result to this cell size
    #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
    cellsize: Option<Vec<f64>>,

    /// Open the map window instead of clipping from the terminal
    #[arg(short, long, default_value_t = false)]
    interactive: bool,

    /// Override TITILER_URL
    #[arg(long)]
    titiler_url: Option<String>,

    /// Override CLIP_SERVICE_URL
    #[arg(long)]
    service_url: Option<String>,

    /// Map start latitude
    #[arg(long, allow_negative_numbers = true, requires = "lng")]
    lat: Option<f64>,

    /// Map start longitude
    #[arg(long, allow_negative_numbers = true, requires = "lat")]
    lng: Option<f64>,

    /// Map start zoom level
    #[arg(long)]
    zoom: Option<f64>,

    /// Copy the download link to the clipboard
    #[arg(short, long, default_value_t = false)]
    copy: bool,

    /// Verbose logging (RUST_LOG takes precedence)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init();
    let args = Args::parse();
    setup_logging(args.verbose);

    let config = load_config(&args).context("Failed to load configuration")?;
    let bounds = match &args.bbox {
        Some(b) => Some(
            Rectangle::from_bounds(b[0], b[2], b[1], b[3])
                .context("Invalid --bbox")?
                .bounds(),
        ),
        None => None,
    };

    if args.interactive || bounds.is_none() {
        let clip = ui::run_clip_ui(config, args.cog_url.clone(), bounds)
            .context("Failed to run the map window")?;
        match clip {
            Some(clip) => report(&clip.url, &format!("Download clipped raster ({})", clip.size), args.copy),
            None => println!("No raster clipped"),
        }
        return Ok(());
    }

    let (Some(cog_url), Some(bounds)) = (args.cog_url.as_deref(), bounds) else {
        bail!("A raster URL is required to clip from the terminal");
    };

    let client = RasterClient::new(&config).context("Failed to create HTTP client")?;
    let mut workflow = ClipWorkflow::new(&config);
    let (tx, mut rx) = unbounded_channel::<WorkflowEvent>();

    // Raster details
    workflow
        .activate_raster(cog_url)
        .context("Invalid raster URL")?;
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message("Loading raster details...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    jobs::fetch_metadata(&client, cog_url, &tx).await;
    drain(&mut rx, &mut workflow);
    spinner.finish_and_clear();

    if workflow.state() == JobState::Failed {
        bail!(
            "{}",
            workflow.last_error().unwrap_or("Raster could not be loaded")
        );
    }
    if let Some(title) = workflow.title() {
        println!("{}", title);
    }
    if let Some(name) = workflow.epsg_name() {
        println!("Native projection: {}", name);
    }

    // Overrides
    if let Some(code) = args.epsg {
        workflow.form.epsg = code.to_string();
        workflow.form.epsg_enabled = true;
    }
    if let Some(cells) = &args.cellsize {
        workflow.form.cellsize_x = cells[0].to_string();
        workflow.form.cellsize_y = cells[1].to_string();
        workflow.form.cellsize_enabled = true;
    }

    let (job, request) = workflow
        .begin_submit(bounds)
        .context("Failed to prepare clip request")?;
    debug!(?request, "clip request");

    let bar = ProgressBar::new(BAR_LENGTH);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")?
            .progress_chars("=> "),
    );
    bar.set_message(workflow.indicator.label.clone());
    bar.enable_steady_tick(Duration::from_millis(100));

    let job_future = jobs::run_clip_job(&client, job, request, &tx);
    tokio::pin!(job_future);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            () = &mut job_future => break,
            Some(event) = rx.recv() => {
                if workflow.apply(event) {
                    show_progress(&bar, &workflow);
                }
            }
            _ = &mut ctrl_c => {
                workflow.cancel();
                bar.abandon_with_message("Cancelled");
                info!(job, "clip cancelled from the terminal");
                return Ok(());
            }
        }
    }
    drain(&mut rx, &mut workflow);

    match workflow.download() {
        Some(clip) => {
            bar.finish_with_message(workflow.indicator.label.clone());
            let label = workflow.download_label().unwrap_or_default();
            report(&clip.url, &label, args.copy);
            Ok(())
        }
        None => {
            bar.abandon_with_message("Failed");
            bail!(
                "{}",
                workflow.last_error().unwrap_or("Clip did not complete")
            )
        }
    }
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> cogclip_core::Result<Config> {
    let mut builder = Config::load()?.to_builder();
    if let Some(url) = &args.titiler_url {
        builder = builder.with_titiler_url(url.as_str());
    }
    if let Some(url) = &args.service_url {
        builder = builder.with_service_url(url.as_str());
    }
    if let (Some(lat), Some(lng)) = (args.lat, args.lng) {
        builder = builder.with_start_center(lat, lng);
    }
    if let Some(zoom) = args.zoom {
        builder = builder.with_start_zoom(zoom);
    }
    builder.build()
}

fn drain(rx: &mut UnboundedReceiver<WorkflowEvent>, workflow: &mut ClipWorkflow) {
    while let Ok(event) = rx.try_recv() {
        workflow.apply(event);
    }
}

fn show_progress(bar: &ProgressBar, workflow: &ClipWorkflow) {
    let indicator = &workflow.indicator;
    if indicator.status == IndicatorStatus::Busy {
        bar.set_position((indicator.fraction * BAR_LENGTH as f32) as u64);
        bar.set_message(indicator.label.clone());
    }
}

fn report(url: &str, label: &str, copy: bool) {
    println!("{}", label);
    println!("{}", url);

    if copy {
        match Clipboard::new() {
            Ok(mut clipboard) => {
                if let Err(e) = clipboard.set_text(url.to_string()) {
                    eprintln!("Warning: Failed to copy to clipboard: {}", e);
                } else {
                    println!("(Copied to clipboard)");
                }
            }
            Err(e) => eprintln!("Warning: Could not access clipboard: {}", e),
        }
    }
}

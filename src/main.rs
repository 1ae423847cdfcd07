//! Deep Zoom Streamer - stream a local tile pyramid into a viewport.
//!
//! This binary drives the streaming engine against tiles on disk, frame by
//! frame, until the viewport is fully displayed or the frame budget runs out.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deepzoom_streamer::{
    Config, FetchingLoader, FsFetcher, PyramidController, RecordingSurface, StreamerStats,
    Viewport,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    run(config).await
}

// =============================================================================
// Stream Command
// =============================================================================

/// Result of one streaming run.
#[derive(Debug, Serialize)]
struct Summary {
    image_width: u32,
    image_height: u32,
    display_width: f64,
    display_height: f64,
    pixel_ratio: f64,
    active_layer_scale: Option<f64>,
    layer_scales: Vec<f64>,
    frames: u32,
    elapsed_ms: u128,
    shown_tiles: usize,
    stats: StreamerStats,
}

async fn run(config: Config) -> ExitCode {
    let (display_width, display_height) = config.display_size();

    info!("Configuration:");
    info!("  Tile root: {}", config.tile_root.display());
    info!("  Tile URL: {} ({})", config.tile_url, config.tile_type);
    info!("  Image: {}x{}", config.image_width, config.image_height);
    info!(
        "  Viewport: {}x{}, display {:.0}x{:.0}",
        config.viewport_width, config.viewport_height, display_width, display_height
    );

    let loader = FetchingLoader::new(FsFetcher::new(config.tile_root.clone()));
    let controller = PyramidController::new(
        config.streamer_options(),
        config.image_descriptor(),
        loader,
        RecordingSurface::new(),
    );
    let mut controller = match controller {
        Ok(controller) => controller.with_device_pixel_ratio(config.pixel_ratio),
        Err(e) => {
            error!("Failed to build pyramid: {}", e);
            return ExitCode::FAILURE;
        }
    };

    controller.set_viewport(
        Viewport::new(config.viewport_width, config.viewport_height)
            .with_pan(config.pan_x, config.pan_y),
    );
    controller.update_size(display_width, display_height);

    let started = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(config.frame_interval_ms.max(1)));
    let mut frames = 0;

    while frames < config.max_frames {
        interval.tick().await;
        controller.frame(Instant::now());
        frames += 1;

        if controller.is_fully_displayed() && !controller.scheduler().is_running() {
            break;
        }
    }

    if !controller.is_fully_displayed() {
        warn!(frames, "Viewport not fully displayed within the frame budget");
    }

    let summary = Summary {
        image_width: config.image_width,
        image_height: config.image_height,
        display_width,
        display_height,
        pixel_ratio: controller.pixel_ratio(),
        active_layer_scale: controller.active_layer_scale(),
        layer_scales: controller.layer_scales(),
        frames,
        elapsed_ms: started.elapsed().as_millis(),
        shown_tiles: controller.surface().tiles.len(),
        stats: controller.stats(),
    };
    controller.destroy();

    if config.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&summary);
    }

    if summary.stats.fully_displayed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_summary(summary: &Summary) {
    println!("Image:          {}x{}", summary.image_width, summary.image_height);
    println!(
        "Display:        {:.0}x{:.0} @ {}x",
        summary.display_width, summary.display_height, summary.pixel_ratio
    );
    match (summary.stats.active_layer, summary.active_layer_scale) {
        (Some(z), Some(scale)) => println!("Active layer:   {} (scale {})", z, scale),
        _ => println!("Active layer:   none (primary image)"),
    }
    println!("Layers:         {}", summary.layer_scales.len());
    println!("Frames:         {} ({} ms)", summary.frames, summary.elapsed_ms);
    println!("Tiles shown:    {}", summary.shown_tiles);
    println!(
        "Tiles:          {} live, {} attached, {} displayed",
        summary.stats.tiles, summary.stats.attached_tiles, summary.stats.displayed_tiles
    );
    println!("Cached:         {}", summary.stats.cached_resources);
    println!(
        "Fully shown:    {}",
        if summary.stats.fully_displayed { "yes" } else { "no" }
    );
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "deepzoom_streamer=debug"
    } else {
        "deepzoom_streamer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

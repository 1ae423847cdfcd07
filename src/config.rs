//! Configuration for the streaming engine and the command-line driver.
//!
//! Two layers of configuration exist:
//!
//! - [`StreamerOptions`]: engine options shared by every image (tile size,
//!   cache and decode limits, fade-in duration, ...). Deserializable from a
//!   partial JSON object; missing keys take their defaults.
//! - [`ImageDescriptor`]: per-image data. Any value set here overrides the
//!   corresponding option.
//!
//! The binary is configured through [`Config`], parsed from command-line
//! arguments and `DZS_*` environment variables.
//!
//! # Environment Variables
//!
//! - `DZS_TILE_ROOT` - Directory holding the tile pyramid (required)
//! - `DZS_TILE_URL` - Tile path template (default: `{z}/{x}_{y}.jpg`)
//! - `DZS_TILE_TYPE` - `deepzoom` or `zoomify` (default: deepzoom)
//! - `DZS_IMAGE_WIDTH`, `DZS_IMAGE_HEIGHT` - Full-resolution image size (required)
//! - `DZS_TILE_SIZE` - Tile edge in pixels (default: 256)
//! - `DZS_TILE_OVERLAP` - Tile overlap in pixels (default: 0)
//! - `DZS_VIEWPORT_WIDTH`, `DZS_VIEWPORT_HEIGHT` - Viewport size (default: 1280x800)
//! - `DZS_DISPLAY_WIDTH` - Displayed image width (default: fit to viewport)
//! - `DZS_PIXEL_RATIO` - Device pixel ratio (default: 1)
//! - `DZS_CACHE_LIMIT` - Cached resources (default: 200)
//! - `DZS_MAX_DECODING` - Concurrent decodes (default: 15)
//! - `DZS_MIN_BATCH` - Minimum simultaneous loads (default: 6)
//! - `DZS_FADE_IN_MS` - Fade-in duration (default: 150)
//! - `DZS_MAX_FRAMES` - Frames to run before giving up (default: 600)

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pyramid::TileType;
use crate::resource::{DEFAULT_CACHE_LIMIT, DEFAULT_MAX_DECODING, DEFAULT_MIN_BATCH_REQUESTS};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default fade-in duration in milliseconds.
pub const DEFAULT_FADE_IN_MS: u64 = 150;

/// Default cap on the tile pixel ratio.
pub const DEFAULT_MAX_TILE_PIXEL_RATIO: f64 = 2.0;

/// Default tile path template for the command-line driver.
pub const DEFAULT_TILE_URL: &str = "{z}/{x}_{y}.jpg";

/// Default viewport width.
pub const DEFAULT_VIEWPORT_WIDTH: f64 = 1280.0;

/// Default viewport height.
pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 800.0;

/// Default number of frames the driver runs before giving up.
pub const DEFAULT_MAX_FRAMES: u32 = 600;

/// Default frame interval in milliseconds.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

// =============================================================================
// Engine Options
// =============================================================================

/// Engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamerOptions {
    /// Tile edge in pixels
    pub tile_size: u32,

    /// Pixels shared by neighbouring tiles
    pub tile_overlap: u32,

    /// Soft capacity of the resource cache
    pub cache_limit: usize,

    /// Maximum concurrent decodes
    pub max_decoding_count: usize,

    /// Below this many in-flight loads, start a new batch
    pub min_batch_request_count: usize,

    /// Fade-in duration; 0 disables fading
    pub fade_in_duration_ms: u64,

    /// Keep the coarsest full-tile layer loaded as a permanent fallback
    pub use_low_res_layer: bool,

    /// Upper bound of the tile pixel ratio on high-density displays
    pub max_tile_pixel_ratio: f64,

    /// Tile URL template
    pub tile_url: Option<String>,

    /// Pyramid layout
    pub tile_type: TileType,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            tile_overlap: 0,
            cache_limit: DEFAULT_CACHE_LIMIT,
            max_decoding_count: DEFAULT_MAX_DECODING,
            min_batch_request_count: DEFAULT_MIN_BATCH_REQUESTS,
            fade_in_duration_ms: DEFAULT_FADE_IN_MS,
            use_low_res_layer: false,
            max_tile_pixel_ratio: DEFAULT_MAX_TILE_PIXEL_RATIO,
            tile_url: None,
            tile_type: TileType::Deepzoom,
        }
    }
}

impl StreamerOptions {
    /// Parse options from a (possibly partial) JSON object.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reject values that make tiling impossible.
    ///
    /// Capacity-like settings are never rejected: a zero cache limit makes
    /// every unowned resource evictable, a zero batch size disables batching.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::InvalidTileSize(self.tile_size));
        }
        if !self.max_tile_pixel_ratio.is_finite() || self.max_tile_pixel_ratio <= 0.0 {
            return Err(ConfigError::InvalidPixelRatio(self.max_tile_pixel_ratio));
        }
        Ok(())
    }

    /// Fade-in duration, `None` when disabled.
    pub fn fade_in(&self) -> Option<std::time::Duration> {
        (self.fade_in_duration_ms > 0)
            .then(|| std::time::Duration::from_millis(self.fade_in_duration_ms))
    }
}

// =============================================================================
// Image Descriptor
// =============================================================================

/// A non-tiled, lower-resolution rendition of the image shown before tiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryImage {
    /// Width of the primary image in pixels
    pub width: u32,

    /// Zoom level (display width / full width) at which the image fits the viewport
    pub fit_zoom_level: f64,
}

/// Per-image data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    /// Full-resolution width
    pub width: u32,

    /// Full-resolution height
    pub height: u32,

    #[serde(default)]
    pub tile_size: Option<u32>,

    #[serde(default)]
    pub tile_overlap: Option<u32>,

    #[serde(default)]
    pub tile_url: Option<String>,

    #[serde(default)]
    pub tile_type: Option<TileType>,

    #[serde(default)]
    pub primary_image: Option<PrimaryImage>,
}

impl ImageDescriptor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tile_size: None,
            tile_overlap: None,
            tile_url: None,
            tile_type: None,
            primary_image: None,
        }
    }

    pub fn with_tile_url(mut self, tile_url: impl Into<String>) -> Self {
        self.tile_url = Some(tile_url.into());
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    pub fn with_tile_overlap(mut self, tile_overlap: u32) -> Self {
        self.tile_overlap = Some(tile_overlap);
        self
    }

    pub fn with_tile_type(mut self, tile_type: TileType) -> Self {
        self.tile_type = Some(tile_type);
        self
    }

    pub fn with_primary_image(mut self, primary_image: PrimaryImage) -> Self {
        self.primary_image = Some(primary_image);
        self
    }

    pub fn tile_size(&self, options: &StreamerOptions) -> u32 {
        self.tile_size.unwrap_or(options.tile_size)
    }

    pub fn tile_overlap(&self, options: &StreamerOptions) -> u32 {
        self.tile_overlap.unwrap_or(options.tile_overlap)
    }

    pub fn tile_type(&self, options: &StreamerOptions) -> TileType {
        self.tile_type.unwrap_or(options.tile_type)
    }

    pub fn tile_url<'a>(&'a self, options: &'a StreamerOptions) -> Option<&'a str> {
        self.tile_url.as_deref().or(options.tile_url.as_deref())
    }

    /// Check dimensions and the effective tile size.
    pub fn validate(&self, options: &StreamerOptions) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyImage {
                width: self.width,
                height: self.height,
            });
        }
        let tile_size = self.tile_size(options);
        if tile_size == 0 {
            return Err(ConfigError::InvalidTileSize(tile_size));
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Deep Zoom Streamer - stream a tile pyramid into a viewport.
///
/// Loads a local Deep Zoom or Zoomify pyramid, drives the streaming engine
/// frame by frame until the viewport is fully displayed, and reports what was
/// loaded.
#[derive(Parser, Debug, Clone)]
#[command(name = "deepzoom-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Pyramid
    // =========================================================================
    /// Directory holding the tile pyramid.
    #[arg(long, env = "DZS_TILE_ROOT")]
    pub tile_root: PathBuf,

    /// Tile path template relative to the root ({x}, {y}, {z}, {group}).
    #[arg(long, default_value = DEFAULT_TILE_URL, env = "DZS_TILE_URL")]
    pub tile_url: String,

    /// Pyramid layout: deepzoom or zoomify.
    #[arg(long, default_value_t = TileType::Deepzoom, env = "DZS_TILE_TYPE")]
    pub tile_type: TileType,

    /// Full-resolution image width.
    #[arg(long, env = "DZS_IMAGE_WIDTH")]
    pub image_width: u32,

    /// Full-resolution image height.
    #[arg(long, env = "DZS_IMAGE_HEIGHT")]
    pub image_height: u32,

    /// Tile edge in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "DZS_TILE_SIZE")]
    pub tile_size: u32,

    /// Tile overlap in pixels.
    #[arg(long, default_value_t = 0, env = "DZS_TILE_OVERLAP")]
    pub tile_overlap: u32,

    // =========================================================================
    // Viewport
    // =========================================================================
    /// Viewport width.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_WIDTH, env = "DZS_VIEWPORT_WIDTH")]
    pub viewport_width: f64,

    /// Viewport height.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_HEIGHT, env = "DZS_VIEWPORT_HEIGHT")]
    pub viewport_height: f64,

    /// Displayed image width. Defaults to fitting the image in the viewport.
    #[arg(long, env = "DZS_DISPLAY_WIDTH")]
    pub display_width: Option<f64>,

    /// Horizontal pan offset of the image origin.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub pan_x: f64,

    /// Vertical pan offset of the image origin.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub pan_y: f64,

    /// Device pixel ratio.
    #[arg(long, default_value_t = 1.0, env = "DZS_PIXEL_RATIO")]
    pub pixel_ratio: f64,

    // =========================================================================
    // Engine
    // =========================================================================
    /// Soft capacity of the resource cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_LIMIT, env = "DZS_CACHE_LIMIT")]
    pub cache_limit: usize,

    /// Maximum concurrent decodes.
    #[arg(long, default_value_t = DEFAULT_MAX_DECODING, env = "DZS_MAX_DECODING")]
    pub max_decoding: usize,

    /// Minimum number of simultaneous load requests.
    #[arg(long, default_value_t = DEFAULT_MIN_BATCH_REQUESTS, env = "DZS_MIN_BATCH")]
    pub min_batch: usize,

    /// Fade-in duration in milliseconds (0 disables fading).
    #[arg(long, default_value_t = DEFAULT_FADE_IN_MS, env = "DZS_FADE_IN_MS")]
    pub fade_in_ms: u64,

    /// Keep the coarsest full-tile layer loaded as a fallback.
    #[arg(long, default_value_t = false)]
    pub low_res_layer: bool,

    /// Upper bound of the tile pixel ratio.
    #[arg(long, default_value_t = DEFAULT_MAX_TILE_PIXEL_RATIO)]
    pub max_tile_pixel_ratio: f64,

    // =========================================================================
    // Driver
    // =========================================================================
    /// Frames to run before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMES, env = "DZS_MAX_FRAMES")]
    pub max_frames: u32,

    /// Interval between frames in milliseconds.
    #[arg(long, default_value_t = DEFAULT_FRAME_INTERVAL_MS)]
    pub frame_interval_ms: u64,

    /// Print the summary as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err("image_width and image_height must be greater than 0".to_string());
        }

        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }

        if self.tile_overlap >= self.tile_size {
            return Err("tile_overlap must be smaller than tile_size".to_string());
        }

        for placeholder in ["{x}", "{y}", "{z}"] {
            if !self.tile_url.contains(placeholder) {
                return Err(format!("tile_url must contain {}", placeholder));
            }
        }

        if !(self.viewport_width > 0.0 && self.viewport_height > 0.0) {
            return Err("viewport size must be positive".to_string());
        }

        if let Some(width) = self.display_width {
            if !(width.is_finite() && width > 0.0) {
                return Err("display_width must be positive".to_string());
            }
        }

        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err("pixel_ratio must be positive".to_string());
        }

        if self.max_frames == 0 {
            return Err("max_frames must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Engine options derived from the arguments.
    pub fn streamer_options(&self) -> StreamerOptions {
        StreamerOptions {
            tile_size: self.tile_size,
            tile_overlap: self.tile_overlap,
            cache_limit: self.cache_limit,
            max_decoding_count: self.max_decoding,
            min_batch_request_count: self.min_batch,
            fade_in_duration_ms: self.fade_in_ms,
            use_low_res_layer: self.low_res_layer,
            max_tile_pixel_ratio: self.max_tile_pixel_ratio,
            tile_url: Some(self.tile_url.clone()),
            tile_type: self.tile_type,
        }
    }

    pub fn image_descriptor(&self) -> ImageDescriptor {
        ImageDescriptor::new(self.image_width, self.image_height)
    }

    /// Displayed image size: the explicit width, or the image fitted to the viewport.
    pub fn display_size(&self) -> (f64, f64) {
        let (w, h) = (self.image_width as f64, self.image_height as f64);
        let width = self
            .display_width
            .unwrap_or_else(|| w * (self.viewport_width / w).min(self.viewport_height / h));
        (width, width * h / w)
    }
}

// =============================================================================
// Tests
// =============================================================================

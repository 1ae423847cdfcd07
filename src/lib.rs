//! # Deep Zoom Streamer
//!
//! A tile streaming engine for multi-resolution image pyramids (Deep Zoom and
//! Zoomify).
//!
//! Given the display size of an image and the current viewport, the engine
//! decides which pyramid level to show, which tiles of that level are visible,
//! and fills gaps with tiles from neighbouring levels that are already loaded.
//! Tile loads and decodes are admission controlled and bounded by a cache that
//! evicts in insertion order.
//!
//! ## Features
//!
//! - **Active layer selection**: the coarsest level whose native width covers
//!   the display width at the tile pixel ratio
//! - **Placeholders**: decoded ancestors and descendants cover tiles that are
//!   still loading
//! - **Admission control**: bounded concurrent decodes, batched loads,
//!   active-layer tiles first
//! - **Resize coalescing**: repeated same-size updates collapse into one
//!   recompute per frame
//! - **Fade-in**: tiles become "fully displayed" once their fade has run
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`pyramid`] - Tile identities, layers, URL schemes and the controller
//! - [`tile`] - Tile lifecycle and the tile store
//! - [`resource`] - Image resources, the resource cache and the decode scheduler
//! - [`host`] - Traits the host implements (loader, display surface)
//! - [`config`] - Options, image descriptors and CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Instant;
//!
//! use deepzoom_streamer::{
//!     FetchingLoader, FsFetcher, ImageDescriptor, PyramidController, RecordingSurface,
//!     StreamerOptions, Viewport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = StreamerOptions {
//!         tile_url: Some("{z}/{x}_{y}.jpg".to_string()),
//!         ..Default::default()
//!     };
//!     let image = ImageDescriptor::new(8000, 6000);
//!     let loader = FetchingLoader::new(FsFetcher::new("./tiles"));
//!
//!     let mut controller =
//!         PyramidController::new(options, image, loader, RecordingSurface::new())?;
//!     controller.set_viewport(Viewport::new(1280.0, 800.0));
//!     controller.update_size(1066.0, 800.0);
//!
//!     while !controller.is_fully_displayed() {
//!         controller.frame(Instant::now());
//!         tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod pyramid;
pub mod resource;
pub mod tile;

// Re-export commonly used types
pub use config::{Config, ImageDescriptor, PrimaryImage, StreamerOptions};
pub use error::{ConfigError, ResourceError};
pub use host::{
    decode_tile, CompletionSink, DisplaySurface, FetchingLoader, FsFetcher, LoadCompletion,
    LoadRequest, RecordingSurface, ShownTile, TileFetcher, TileLoader, TilePlacement, Transition,
};
pub use pyramid::{
    deepzoom_max_level, zoomify_grids, AddressingScheme, PyramidController, ResolutionLayer,
    StreamerStats, TileId, TileType, TileUrlFn, Viewport, ZOOMIFY_TILES_PER_GROUP,
};
pub use resource::{
    BatchEntry, DecodeRequest, DecodeScheduler, DecodeState, DecodedTile, ImageResource,
    LoadState, LoadTicket, ResourceCache, ResourceEvent, SchedulerLimits, DEFAULT_CACHE_LIMIT,
    DEFAULT_MAX_DECODING, DEFAULT_MIN_BATCH_REQUESTS,
};
pub use tile::{Tile, TileStore, FULLY_DISPLAYED_GRACE};

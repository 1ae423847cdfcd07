//! Test utilities for integration tests.
//!
//! This module provides a manually driven tile loader, a controllable clock
//! and helpers for writing tile pyramids to disk.

use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, Instant};

use image::{ImageFormat, Rgba, RgbaImage};

use deepzoom_streamer::{
    CompletionSink, DecodedTile, ImageDescriptor, LoadRequest, PyramidController,
    RecordingSurface, ResourceError, StreamerOptions, TileId, TileLoader,
};

pub const TILE_URL: &str = "{z}/{x}_{y}.jpg";

// =============================================================================
// Manual Loader
// =============================================================================

/// A loader that records requests and completes them only when told to.
#[derive(Debug, Default)]
pub struct ManualLoader {
    pending: Vec<(LoadRequest, CompletionSink)>,
    urls: Vec<String>,
}

impl ManualLoader {
    /// Every URL ever requested, in request order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn request_count(&self) -> usize {
        self.urls.len()
    }

    pub fn pending_ids(&self) -> Vec<TileId> {
        self.pending.iter().map(|(request, _)| request.id()).collect()
    }

    /// Complete the oldest `n` pending requests with a blank bitmap.
    pub fn complete_first(&mut self, n: usize) -> usize {
        let n = n.min(self.pending.len());
        for (request, sink) in self.pending.drain(..n) {
            sink.complete(request.ticket, Ok(DecodedTile::empty(256, 256)));
        }
        n
    }

    pub fn complete_all(&mut self) -> usize {
        self.complete_first(self.pending.len())
    }

    pub fn fail_all(&mut self) -> usize {
        let count = self.pending.len();
        for (request, sink) in self.pending.drain(..) {
            let error = ResourceError::Load(format!("404: {}", request.url));
            sink.complete(request.ticket, Err(error));
        }
        count
    }
}

impl TileLoader for ManualLoader {
    fn begin(&mut self, request: LoadRequest, sink: CompletionSink) {
        self.urls.push(request.url.clone());
        self.pending.push((request, sink));
    }
}

// =============================================================================
// Controller Helpers
// =============================================================================

pub type TestController = PyramidController<ManualLoader, RecordingSurface>;

/// Options with a tile URL and no fade-in.
pub fn options() -> StreamerOptions {
    StreamerOptions {
        tile_url: Some(TILE_URL.to_string()),
        fade_in_duration_ms: 0,
        ..Default::default()
    }
}

pub fn controller(width: u32, height: u32, options: StreamerOptions) -> TestController {
    PyramidController::new(
        options,
        ImageDescriptor::new(width, height),
        ManualLoader::default(),
        RecordingSurface::new(),
    )
    .expect("valid pyramid")
}

/// A frame clock that only moves when told to.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    now: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Advance by one 16 ms frame.
    pub fn tick(&mut self) -> Instant {
        self.advance(Duration::from_millis(16))
    }

    pub fn advance(&mut self, by: Duration) -> Instant {
        self.now += by;
        self.now
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Run frames, completing every load, until the viewport is fully displayed
/// and the scheduler is idle. Returns the number of frames run.
pub fn settle(controller: &mut TestController, clock: &mut Clock) -> usize {
    for frame in 1..=100 {
        controller.frame(clock.tick());
        controller.loader_mut().complete_all();

        if controller.is_fully_displayed()
            && !controller.scheduler().is_running()
            && !controller.is_recompute_pending()
        {
            return frame;
        }
    }
    panic!("viewport did not settle within 100 frames");
}

// =============================================================================
// Tile Files
// =============================================================================

/// Encode a solid-color PNG.
pub fn encode_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 120, 40, 255]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

/// Write the tiles of one Deep Zoom level as `{z}/{x}_{y}.png`.
pub fn write_level(root: &Path, z: u32, columns: u32, rows: u32, tile_size: u32) {
    let dir = root.join(z.to_string());
    std::fs::create_dir_all(&dir).expect("create level dir");

    let png = encode_png(tile_size, tile_size);
    for y in 0..rows {
        for x in 0..columns {
            std::fs::write(dir.join(format!("{}_{}.png", x, y)), &png).expect("write tile");
        }
    }
}

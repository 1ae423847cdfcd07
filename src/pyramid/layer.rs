//! Resolution layers and viewport-to-tile mapping.

use super::identity::TileId;

/// Current viewport state reported by the host.
///
/// `zoom_scale` is the ratio between the current zoom and the settled display
/// resolution. It is `1.0` whenever no zoom gesture or animation is running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Viewport width in CSS pixels
    pub width: f64,

    /// Viewport height in CSS pixels
    pub height: f64,

    /// Horizontal offset of the image origin relative to the viewport
    pub pan_x: f64,

    /// Vertical offset of the image origin relative to the viewport
    pub pan_y: f64,

    /// Gesture scale (1.0 = settled)
    pub zoom_scale: f64,
}

impl Viewport {
    /// Viewport of the given size with no pan and no gesture in progress.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            pan_x: 0.0,
            pan_y: 0.0,
            zoom_scale: 1.0,
        }
    }

    /// Set the pan offset.
    pub fn with_pan(mut self, pan_x: f64, pan_y: f64) -> Self {
        self.pan_x = pan_x;
        self.pan_y = pan_y;
        self
    }

    /// Set the gesture scale.
    pub fn with_zoom_scale(mut self, zoom_scale: f64) -> Self {
        self.zoom_scale = zoom_scale;
        self
    }

    /// Whether a zoom gesture or animation is in progress.
    pub fn is_gesture_in_progress(&self) -> bool {
        self.zoom_scale != 1.0
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// One zoom level of the pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionLayer {
    /// Level index (0 = coarsest)
    pub z: u32,

    /// Scale relative to the full-resolution image (1.0 = full resolution)
    pub scale: f64,

    /// Native width of this level in pixels
    pub width: u32,

    /// Native height of this level in pixels
    pub height: u32,

    /// Number of tile columns
    pub columns: u32,

    /// Number of tile rows
    pub rows: u32,

    /// Display scale of this level's pixels (display width / native width)
    pub tile_scale: f64,

    /// Whether the layer's display surface has been allocated
    pub is_active: bool,

    /// Whether this is the always-warm low-resolution layer
    pub is_low_res: bool,
}

impl ResolutionLayer {
    /// Create a layer from its scale relative to the full-resolution image.
    pub fn new(z: u32, scale: f64, full_width: u32, full_height: u32, tile_size: u32) -> Self {
        let width = (full_width as f64 * scale).ceil() as u32;
        let height = (full_height as f64 * scale).ceil() as u32;
        let tile_size = tile_size.max(1);

        Self {
            z,
            scale,
            width,
            height,
            columns: width.div_ceil(tile_size),
            rows: height.div_ceil(tile_size),
            tile_scale: 1.0,
            is_active: false,
            is_low_res: false,
        }
    }

    /// Mark the layer active. Returns `true` the first time.
    pub fn activate(&mut self) -> bool {
        if self.is_active {
            return false;
        }
        self.is_active = true;
        true
    }

    /// Recompute the display scale for the given display width.
    pub fn update_scale(&mut self, display_width: f64) -> f64 {
        if self.width > 0 {
            self.tile_scale = display_width / self.width as f64;
        }
        self.tile_scale
    }

    /// Whether this layer's native size covers at least one whole tile.
    pub fn covers_tile(&self, tile_size: u32) -> bool {
        self.width >= tile_size || self.height >= tile_size
    }

    /// Tile coordinates intersecting the viewport.
    ///
    /// ```text
    /// edge   = base_tile_size * tile_scale * zoom_scale
    /// x from = clamp(floor(-pan_x / edge), 0, columns - 1)
    /// x to   = clamp(floor((viewport_width - pan_x) / edge), 0, columns - 1)
    /// ```
    ///
    /// Rows are computed the same way. The result is row-major.
    pub fn visible_tile_coordinates(&self, viewport: &Viewport, base_tile_size: u32) -> Vec<TileId> {
        if self.columns == 0 || self.rows == 0 {
            return Vec::new();
        }

        let edge = base_tile_size as f64 * self.tile_scale * viewport.zoom_scale;
        if !(edge.is_finite() && edge > 0.0) {
            return Vec::new();
        }

        let left = tile_coordinate(-viewport.pan_x, edge, self.columns);
        let right = tile_coordinate(viewport.width - viewport.pan_x, edge, self.columns);
        let top = tile_coordinate(-viewport.pan_y, edge, self.rows);
        let bottom = tile_coordinate(viewport.height - viewport.pan_y, edge, self.rows);

        let mut coordinates = Vec::new();
        for y in top..=bottom {
            for x in left..=right {
                coordinates.push(TileId::new(x, y, self.z));
            }
        }
        coordinates
    }
}

fn tile_coordinate(position: f64, edge: f64, count: u32) -> u32 {
    let coordinate = (position / edge).floor();
    coordinate.clamp(0.0, (count - 1) as f64) as u32
}

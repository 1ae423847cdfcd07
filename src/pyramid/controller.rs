//! Pyramid controller: active-layer selection, resize coalescing and the
//! per-frame pipeline.
//!
//! # Frame
//!
//! The host calls [`PyramidController::frame`] once per rendering frame:
//!
//! ```text
//! 1. drain load completions → tiles become pending / failed resources leave the cache
//! 2. insert pending tiles into the surface (immediately or fading in)
//! 3. promote finished fades to fully displayed (re-issues update_size)
//! 4. run the deferred recompute scheduled before this frame
//! 5. tick the decode scheduler
//! ```
//!
//! # Recompute
//!
//! ```text
//! reset tile roles ─▶ pick low-res layer ─▶ primary image covers it? ──yes──▶ release tiles
//!                                                   │ no
//!                                                   ▼
//!          pick active layer ─▶ per layer: activate, scale, visible tiles (+ placeholders)
//!                                                   │
//!                                                   ▼
//!                          release unused tiles ─▶ attach new ones (unless blocked)
//! ```

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::addressing::{deepzoom_max_level, zoomify_grids, AddressingScheme, TileType, TileUrlFn};
use super::identity::TileId;
use super::layer::{ResolutionLayer, Viewport};
use crate::config::{ImageDescriptor, StreamerOptions};
use crate::error::ConfigError;
use crate::host::{DisplaySurface, TileLoader, TilePlacement};
use crate::resource::{DecodeScheduler, ResourceEvent, SchedulerLimits};
use crate::tile::{Tile, TileStore};

/// Snapshot of the engine state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamerStats {
    /// Number of recomputes run so far
    pub recompute_count: u64,

    /// Level of the active layer, if any
    pub active_layer: Option<u32>,

    /// Live tiles in the store
    pub tiles: usize,

    /// Tiles currently attached
    pub attached_tiles: usize,

    /// Tiles shown at full opacity
    pub displayed_tiles: usize,

    /// Resources waiting in the scheduler queue
    pub queued_resources: usize,

    /// Resources held by the cache
    pub cached_resources: usize,

    /// Resources decoding as of the last tick
    pub decoding: usize,

    /// Resources loading as of the last tick
    pub loading: usize,

    /// Whether every active-layer tile is displayed or fading in
    pub fully_displayed: bool,
}

// =============================================================================
// Pyramid Controller
// =============================================================================

/// Drives one image pyramid.
///
/// # Type Parameters
///
/// * `L` - The host's tile loader
/// * `S` - The host's display surface
pub struct PyramidController<L, S> {
    options: StreamerOptions,
    image: ImageDescriptor,
    tile_size: u32,
    overlap: u32,
    scheme: AddressingScheme,

    /// Coarsest first; `layers[z].z == z`
    layers: Vec<ResolutionLayer>,
    active_layer: Option<usize>,

    store: TileStore,
    scheduler: DecodeScheduler<L>,
    surface: S,

    viewport: Viewport,
    pixel_ratio: f64,

    /// Display size of the image
    width: f64,
    height: f64,
    prev_size: Option<(f64, f64)>,

    recompute_pending: bool,
    loading_blocked: bool,
    recompute_count: u64,
    destroyed: bool,
}

impl<L: TileLoader, S: DisplaySurface> PyramidController<L, S> {
    /// Build a controller, resolving the tile URL scheme from the options and image.
    pub fn new(
        options: StreamerOptions,
        image: ImageDescriptor,
        loader: L,
        surface: S,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        image.validate(&options)?;

        let template = image
            .tile_url(&options)
            .ok_or(ConfigError::MissingTileUrl)?
            .to_string();

        let scheme = match image.tile_type(&options) {
            TileType::Deepzoom => AddressingScheme::templated(template)?,
            TileType::Zoomify => AddressingScheme::indexed(
                template,
                image.width,
                image.height,
                image.tile_size(&options),
            )?,
        };

        Self::with_scheme(options, image, scheme, loader, surface)
    }

    /// Build a controller whose tile URLs come from a host closure.
    pub fn with_url_fn(
        options: StreamerOptions,
        image: ImageDescriptor,
        url_fn: TileUrlFn,
        loader: L,
        surface: S,
    ) -> Result<Self, ConfigError> {
        Self::with_scheme(
            options,
            image,
            AddressingScheme::Custom(url_fn),
            loader,
            surface,
        )
    }

    /// Build a controller with an explicit addressing scheme.
    pub fn with_scheme(
        options: StreamerOptions,
        image: ImageDescriptor,
        scheme: AddressingScheme,
        loader: L,
        surface: S,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        image.validate(&options)?;

        let tile_size = image.tile_size(&options);
        let overlap = image.tile_overlap(&options);
        let layers = build_layers(&image, image.tile_type(&options), tile_size);

        let limits = SchedulerLimits {
            max_decoding: options.max_decoding_count,
            min_batch_requests: options.min_batch_request_count,
            cache_limit: options.cache_limit,
        };

        debug!(
            width = image.width,
            height = image.height,
            tile_size,
            levels = layers.len(),
            "Created pyramid"
        );

        Ok(Self {
            options,
            image,
            tile_size,
            overlap,
            scheme,
            layers,
            active_layer: None,
            store: TileStore::new(),
            scheduler: DecodeScheduler::new(loader, limits),
            surface,
            viewport: Viewport::default(),
            pixel_ratio: 1.0,
            width: 0.0,
            height: 0.0,
            prev_size: None,
            recompute_pending: false,
            loading_blocked: false,
            recompute_count: 0,
            destroyed: false,
        })
    }

    /// Set the device pixel ratio.
    ///
    /// Tiles are picked for `min(device, max_tile_pixel_ratio)` when both
    /// exceed 1, otherwise for a ratio of 1.
    pub fn with_device_pixel_ratio(mut self, device_pixel_ratio: f64) -> Self {
        let max = self.options.max_tile_pixel_ratio;
        self.pixel_ratio = if device_pixel_ratio.is_finite() && max > 1.0 && device_pixel_ratio > 1.0
        {
            device_pixel_ratio.min(max)
        } else {
            1.0
        };
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn layers(&self) -> &[ResolutionLayer] {
        &self.layers
    }

    pub fn active_layer(&self) -> Option<&ResolutionLayer> {
        self.active_layer.and_then(|i| self.layers.get(i))
    }

    /// Scale of the active layer relative to the full-resolution image.
    pub fn active_layer_scale(&self) -> Option<f64> {
        self.active_layer().map(|layer| layer.scale)
    }

    /// Scales of all layers, coarsest first.
    pub fn layer_scales(&self) -> Vec<f64> {
        self.layers.iter().map(|layer| layer.scale).collect()
    }

    pub fn tile(&self, id: &TileId) -> Option<&Tile> {
        self.store.get(id)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.store.iter()
    }

    pub fn tile_url(&self, id: TileId) -> String {
        self.scheme.resolve(id)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn display_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn options(&self) -> &StreamerOptions {
        &self.options
    }

    pub fn scheduler(&self) -> &DecodeScheduler<L> {
        &self.scheduler
    }

    pub fn loader_mut(&mut self) -> &mut L {
        self.scheduler.loader_mut()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn is_loading_blocked(&self) -> bool {
        self.loading_blocked
    }

    pub fn is_recompute_pending(&self) -> bool {
        self.recompute_pending
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether every active-layer tile is fully displayed or fading in.
    pub fn is_fully_displayed(&self) -> bool {
        self.store.active_tiles_displayed()
    }

    pub fn stats(&self) -> StreamerStats {
        StreamerStats {
            recompute_count: self.recompute_count,
            active_layer: self.active_layer().map(|layer| layer.z),
            tiles: self.store.len(),
            attached_tiles: self.store.iter().filter(|t| t.is_attached()).count(),
            displayed_tiles: self.store.iter().filter(|t| t.is_fully_displayed()).count(),
            queued_resources: self.scheduler.queued_len(),
            cached_resources: self.scheduler.cache().len(),
            decoding: self.scheduler.decoding_count(),
            loading: self.scheduler.loading_count(),
            fully_displayed: self.is_fully_displayed(),
        }
    }

    // -------------------------------------------------------------------------
    // Host API
    // -------------------------------------------------------------------------

    /// Update pan and gesture state. Takes effect on the next recompute.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Report the display size of the image.
    ///
    /// Ignored during a gesture. A changed size recomputes right away; an
    /// unchanged size schedules one recompute for the next frame.
    pub fn update_size(&mut self, width: f64, height: f64) {
        if self.destroyed || self.viewport.is_gesture_in_progress() {
            return;
        }

        self.width = width;
        self.height = height;

        let changed = self.prev_size != Some((width, height));
        self.prev_size = Some((width, height));

        if changed {
            self.recompute_pending = false;
            self.recompute();
            return;
        }

        if self.recompute_pending {
            return;
        }
        self.recompute_pending = true;
    }

    /// Suspend or resume attaching new tiles.
    ///
    /// Resuming recomputes immediately so tiles held back during the gesture
    /// start loading.
    pub fn set_loading_blocked(&mut self, blocked: bool) {
        self.loading_blocked = blocked;

        if !blocked && self.prev_size.is_some() && !self.destroyed {
            self.recompute_pending = false;
            self.recompute();
        }
    }

    /// Recompute the active layer and the tile set.
    pub fn recompute(&mut self) {
        if self.destroyed || self.layers.is_empty() {
            return;
        }
        self.recompute_count += 1;

        self.store.reset_relations();

        let low_res = if self.options.use_low_res_layer {
            self.layers
                .iter()
                .position(|layer| layer.covers_tile(self.tile_size))
        } else {
            None
        };
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.is_low_res = Some(i) == low_res;
        }

        if self.primary_image_visible() {
            trace!(width = self.width, "Primary image covers display size");
            self.store
                .destroy_unused(&mut self.scheduler, &mut self.surface);
            return;
        }

        // Coarsest layer that covers the display width, else the finest
        let active = self
            .layers
            .iter()
            .position(|layer| layer.width as f64 / self.pixel_ratio >= self.width)
            .unwrap_or(self.layers.len() - 1);

        if self.active_layer != Some(active) {
            debug!(
                z = self.layers[active].z,
                width = self.width,
                "Active layer changed"
            );
        }
        self.active_layer = Some(active);

        for i in 0..self.layers.len() {
            let layer = &mut self.layers[i];
            if layer.activate() {
                self.surface.activate_layer(layer.z);
            }
            let scale = layer.update_scale(self.width);
            self.surface.set_layer_scale(layer.z, scale);

            if i == active {
                self.update_tile_visibility(i, false);
            } else if Some(i) == low_res {
                self.update_tile_visibility(i, true);
            }
        }

        // Even when blocked, so a long gesture does not pile up tiles
        self.store
            .destroy_unused(&mut self.scheduler, &mut self.surface);

        if !self.loading_blocked {
            self.display_tiles();
        }
    }

    /// Mark the layer's visible tiles and search placeholders for incomplete ones.
    fn update_tile_visibility(&mut self, index: usize, is_low_res: bool) {
        let layer = &self.layers[index];
        let coordinates = layer.visible_tile_coordinates(&self.viewport, self.tile_size);
        let max_z = layer.z + 1;

        for id in coordinates {
            let tile = self.store.get_or_create(id);
            tile.is_in_active_layer = true;
            tile.is_placeholder = is_low_res;
            if is_low_res {
                continue;
            }

            let incomplete = !tile.can_be_displayed(&self.scheduler) || !tile.is_fully_displayed();
            if incomplete {
                self.store.show_placeholder_below(id, &self.scheduler);
                self.store
                    .show_placeholders_above(id, max_z, &self.scheduler);
            }
        }
    }

    /// Attach every needed tile that is not attached yet, in batch order.
    fn display_tiles(&mut self) {
        let entries = self.store.pending_attach();
        if entries.is_empty() {
            return;
        }

        let ordered = self.scheduler.insert_batch(&entries);
        trace!(count = ordered.len(), "Attaching tiles");

        for id in ordered {
            if let Some(tile) = self.store.get_mut(&id) {
                let scheme = &self.scheme;
                tile.attach(&mut self.scheduler, || scheme.resolve(id));
            }
            self.scheduler.cache_resource(id);
        }
    }

    fn primary_image_visible(&self) -> bool {
        let Some(primary) = self.image.primary_image else {
            return false;
        };
        if self.width <= 0.0 {
            return false;
        }

        // Smaller than the "fit" zoom level
        if self.width <= (primary.fit_zoom_level * self.image.width as f64).round() {
            return true;
        }

        primary.width as f64 / self.pixel_ratio >= self.width
    }

    /// Run one frame of the pipeline.
    pub fn frame(&mut self, now: Instant) {
        if self.destroyed {
            return;
        }
        let deferred = std::mem::take(&mut self.recompute_pending);

        for event in self.scheduler.drain_events() {
            match event {
                ResourceEvent::Decoded(id) => {
                    if let Some(tile) = self.store.get_mut(&id) {
                        tile.on_decoded();
                    }
                }
                ResourceEvent::Failed(id, err) => {
                    warn!(tile = %id, error = %err, "Tile stays a placeholder");
                    self.scheduler.uncache(&id);
                }
            }
        }

        let fade = self.options.fade_in();
        let pending: Vec<TileId> = self
            .store
            .iter()
            .filter(|tile| tile.is_pending_display())
            .map(Tile::id)
            .collect();

        let mut displayed = false;
        for id in pending {
            let in_low_res = self
                .layers
                .get(id.z as usize)
                .is_some_and(|layer| layer.is_low_res);
            let placement = TilePlacement::for_tile(id, self.tile_size, self.overlap);

            if let Some(tile) = self.store.get_mut(&id) {
                displayed |= tile.show(
                    now,
                    fade,
                    in_low_res,
                    placement,
                    &self.scheduler,
                    &mut self.surface,
                );
            }
        }

        for tile in self.store.iter_mut() {
            displayed |= tile.poll_fade(now);
        }

        // Placeholders may no longer be needed
        if displayed {
            self.update_size(self.width, self.height);
        }

        if deferred {
            self.recompute();
        }

        if self.scheduler.is_running() {
            self.scheduler.tick();
        }
    }

    // -------------------------------------------------------------------------
    // Zoom stepping
    // -------------------------------------------------------------------------

    /// The layer scale closest to `scale`.
    pub fn closest_layer_scale(&self, scale: f64) -> f64 {
        self.layers
            .iter()
            .map(|layer| layer.scale)
            .reduce(|best, candidate| {
                if (candidate - scale).abs() < (best - scale).abs() {
                    candidate
                } else {
                    best
                }
            })
            .unwrap_or(scale)
    }

    /// Target zoom level for one zoom-in step: double, snapped to a larger
    /// layer scale when one is closest, capped at `max`.
    pub fn zoom_in_target(&self, current: f64, max: f64) -> f64 {
        let mut target = current * 2.0;
        let closest = self.closest_layer_scale(target);
        if closest > current {
            target = closest;
        }
        target.min(max)
    }

    /// Target zoom level for one zoom-out step: halve, snapped to a smaller
    /// layer scale when one is closest, floored at `min`.
    pub fn zoom_out_target(&self, current: f64, min: f64) -> f64 {
        let mut target = current / 2.0;
        let closest = self.closest_layer_scale(target);
        if closest < current {
            target = closest;
        }
        target.max(min)
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Release every tile, resource and layer. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.store.destroy(&mut self.scheduler, &mut self.surface);
        for layer in &mut self.layers {
            if layer.is_active {
                self.surface.remove_layer(layer.z);
                layer.is_active = false;
            }
        }
        self.scheduler.destroy();
        self.active_layer = None;
        self.recompute_pending = false;
        self.destroyed = true;
        debug!("Destroyed pyramid");
    }
}

/// Layers `0..=max_z`, where layer `z` has scale `1 / 2^(max_z - z)`.
fn build_layers(image: &ImageDescriptor, tile_type: TileType, tile_size: u32) -> Vec<ResolutionLayer> {
    let max_z = match tile_type {
        TileType::Deepzoom => deepzoom_max_level(image.width, image.height),
        TileType::Zoomify => {
            zoomify_grids(image.width, image.height, tile_size).len() as u32 - 1
        }
    };

    (0..=max_z)
        .map(|z| {
            let scale = 1.0 / 2f64.powi((max_z - z) as i32);
            ResolutionLayer::new(z, scale, image.width, image.height, tile_size)
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

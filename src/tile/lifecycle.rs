//! Tile display lifecycle.
//!
//! ```text
//! Detached ──attach──▶ Attached(loading)
//!                          │ decoded
//!                          ▼
//!              Attached(displayable, fading)
//!                          │ fade + grace elapsed, still attached
//!                          ▼
//!               Attached(fully displayed)
//! ```
//!
//! Any state returns to `Detached` on [`Tile::detach`], which also cancels a
//! pending "fully displayed" transition.

use std::time::{Duration, Instant};

use crate::host::{DisplaySurface, TileLoader, TilePlacement, Transition};
use crate::pyramid::TileId;
use crate::resource::DecodeScheduler;

/// Extra time after a fade before a tile counts as fully displayed.
pub const FULLY_DISPLAYED_GRACE: Duration = Duration::from_millis(200);

/// Display progress of an attached tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Display {
    /// Not on the surface
    Hidden,

    /// Decoded; will be inserted on the next display step
    Pending,

    /// On the surface, fading in until the deadline
    Fading { until: Instant },

    /// On the surface at full opacity
    Shown,
}

/// One grid cell of one layer.
#[derive(Debug, Clone)]
pub struct Tile {
    id: TileId,

    /// Used to fill a gap while a better tile loads
    pub is_placeholder: bool,

    /// Part of the active layer's visible set
    pub is_in_active_layer: bool,

    is_attached: bool,
    is_destroyed: bool,
    display: Display,
}

impl Tile {
    pub fn new(id: TileId) -> Self {
        Self {
            id,
            is_placeholder: false,
            is_in_active_layer: false,
            is_attached: false,
            is_destroyed: false,
            display: Display::Hidden,
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached
    }

    pub fn is_destroyed(&self) -> bool {
        self.is_destroyed
    }

    pub fn is_fading(&self) -> bool {
        matches!(self.display, Display::Fading { .. })
    }

    pub fn is_fully_displayed(&self) -> bool {
        self.display == Display::Shown
    }

    /// Whether the tile has been inserted into the surface.
    pub fn is_inserted(&self) -> bool {
        matches!(self.display, Display::Fading { .. } | Display::Shown)
    }

    /// Whether the tile waits for its display step.
    pub fn is_pending_display(&self) -> bool {
        self.display == Display::Pending
    }

    /// Whether the tile is needed in either role.
    pub fn is_needed(&self) -> bool {
        self.is_placeholder || self.is_in_active_layer
    }

    /// A tile can be displayed once its resource has its bytes.
    pub fn can_be_displayed<L: TileLoader>(&self, scheduler: &DecodeScheduler<L>) -> bool {
        scheduler.has_loaded(&self.id)
    }

    /// Start using the tile's resource and queue it for decoding.
    ///
    /// No-op if already attached or destroyed.
    pub fn attach<L: TileLoader>(
        &mut self,
        scheduler: &mut DecodeScheduler<L>,
        url: impl FnOnce() -> String,
    ) {
        if self.is_attached || self.is_destroyed {
            return;
        }
        self.is_attached = true;

        scheduler.get_or_create(self.id, url);
        if self.is_in_active_layer && self.is_placeholder {
            scheduler.set_low_priority(&self.id);
        }
        scheduler.mark_attached(&self.id);
        scheduler.enqueue(self.id);
    }

    /// The resource finished decoding.
    ///
    /// Decoding is asynchronous: a tile detached in the meantime ignores it.
    pub fn on_decoded(&mut self) {
        if self.is_attached && self.display == Display::Hidden {
            self.display = Display::Pending;
        }
    }

    /// Insert the tile into the surface.
    ///
    /// Fades only when a fade duration is set and the tile is neither a
    /// placeholder nor part of the low-resolution layer. Returns `true` when
    /// the tile became fully displayed immediately.
    pub fn show<L: TileLoader, S: DisplaySurface>(
        &mut self,
        now: Instant,
        fade: Option<Duration>,
        in_low_res_layer: bool,
        placement: TilePlacement,
        scheduler: &DecodeScheduler<L>,
        surface: &mut S,
    ) -> bool {
        if !self.is_attached || self.display != Display::Pending {
            return false;
        }
        let Some(bitmap) = scheduler.resource(&self.id).and_then(|r| r.bitmap()) else {
            return false;
        };

        match fade.filter(|d| !d.is_zero()) {
            Some(duration) if !in_low_res_layer && !self.is_placeholder => {
                surface.insert_tile(self.id, placement, bitmap, Transition::FadeIn(duration));
                self.display = Display::Fading {
                    until: now + duration + FULLY_DISPLAYED_GRACE,
                };
                false
            }
            _ => {
                surface.insert_tile(self.id, placement, bitmap, Transition::Immediate);
                self.display = Display::Shown;
                true
            }
        }
    }

    /// Finish a fade whose deadline passed. Returns `true` on transition.
    pub fn poll_fade(&mut self, now: Instant) -> bool {
        match self.display {
            Display::Fading { until } if self.is_attached && now >= until => {
                self.display = Display::Shown;
                true
            }
            _ => false,
        }
    }

    /// Stop using the resource and take the tile off the surface.
    pub fn detach<L: TileLoader, S: DisplaySurface>(
        &mut self,
        scheduler: &mut DecodeScheduler<L>,
        surface: &mut S,
    ) {
        if self.is_attached {
            scheduler.mark_detached(&self.id);
            if self.is_inserted() {
                surface.remove_tile(self.id);
            }
            self.is_attached = false;
        }
        self.display = Display::Hidden;
    }

    /// Detach and mark the tile permanently destroyed. Idempotent.
    pub fn destroy<L: TileLoader, S: DisplaySurface>(
        &mut self,
        scheduler: &mut DecodeScheduler<L>,
        surface: &mut S,
    ) {
        self.detach(scheduler, surface);
        self.is_destroyed = true;
    }
}

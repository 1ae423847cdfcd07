//! Display surface seam.
//!
//! The engine decides *which* tiles are shown, *where* inside their layer and
//! *how* they appear. Actually drawing them is up to the host's
//! [`DisplaySurface`]. Layers are stacked by `z`, finer layers on top.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Serialize;

use crate::pyramid::TileId;
use crate::resource::DecodedTile;

/// How a tile appears once inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transition {
    /// Shown at full opacity right away
    Immediate,

    /// Inserted at zero opacity, then faded to full opacity linearly
    FadeIn(Duration),
}

/// Position of a tile inside its layer, in the layer's native pixels.
///
/// Tiles after the first row/column are shifted back by the overlap so that
/// overlapping borders line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TilePlacement {
    pub x: u32,
    pub y: u32,
}

impl TilePlacement {
    pub fn for_tile(id: TileId, tile_size: u32, overlap: u32) -> Self {
        let offset = |i: u32| {
            if i > 0 {
                (i * tile_size).saturating_sub(overlap)
            } else {
                0
            }
        };
        Self {
            x: offset(id.x),
            y: offset(id.y),
        }
    }
}

/// Host capability that shows decoded tiles.
pub trait DisplaySurface {
    /// Allocate the container for a layer. Called once per layer.
    fn activate_layer(&mut self, z: u32);

    /// Scale a layer's container (display width / native layer width).
    fn set_layer_scale(&mut self, z: u32, scale: f64);

    /// Show a decoded tile.
    fn insert_tile(
        &mut self,
        id: TileId,
        placement: TilePlacement,
        bitmap: &DecodedTile,
        transition: Transition,
    );

    /// Hide a tile. Called for tiles that may never have been inserted.
    fn remove_tile(&mut self, id: TileId);

    /// Release a layer's container.
    fn remove_layer(&mut self, z: u32);
}

// =============================================================================
// Recording Surface
// =============================================================================

/// A tile currently shown on a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShownTile {
    pub placement: TilePlacement,
    pub transition: Transition,
    pub width: u32,
    pub height: u32,
}

/// In-memory surface that records what would be drawn.
///
/// Used by the command-line driver and by tests.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RecordingSurface {
    /// Active layers and their current scale
    pub layers: BTreeMap<u32, f64>,

    /// Tiles currently shown
    #[serde(skip)]
    pub tiles: HashMap<TileId, ShownTile>,

    /// Number of insertions since creation
    pub inserted: usize,

    /// Number of removals of shown tiles since creation
    pub removed: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shown(&self, id: &TileId) -> bool {
        self.tiles.contains_key(id)
    }

    /// Shown tiles of one layer, sorted.
    pub fn tiles_in_layer(&self, z: u32) -> Vec<TileId> {
        let mut ids: Vec<TileId> = self.tiles.keys().filter(|id| id.z == z).copied().collect();
        ids.sort();
        ids
    }

    pub fn layer_scale(&self, z: u32) -> Option<f64> {
        self.layers.get(&z).copied()
    }
}

impl DisplaySurface for RecordingSurface {
    fn activate_layer(&mut self, z: u32) {
        self.layers.entry(z).or_insert(1.0);
    }

    fn set_layer_scale(&mut self, z: u32, scale: f64) {
        if let Some(current) = self.layers.get_mut(&z) {
            *current = scale;
        }
    }

    fn insert_tile(
        &mut self,
        id: TileId,
        placement: TilePlacement,
        bitmap: &DecodedTile,
        transition: Transition,
    ) {
        self.inserted += 1;
        self.tiles.insert(
            id,
            ShownTile {
                placement,
                transition,
                width: bitmap.width,
                height: bitmap.height,
            },
        );
    }

    fn remove_tile(&mut self, id: TileId) {
        if self.tiles.remove(&id).is_some() {
            self.removed += 1;
        }
    }

    fn remove_layer(&mut self, z: u32) {
        self.layers.remove(&z);
        self.tiles.retain(|id, _| id.z != z);
    }
}

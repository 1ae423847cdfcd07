//! Tile store and placeholder search.
//!
//! Tiles are keyed 1:1 by identity. Every recompute first clears the role
//! flags of all tiles, then marks the tiles each layer needs, then releases
//! whatever ended up with no role.
//!
//! # Placeholders
//!
//! While an active tile is not fully displayed, the gap is filled from
//! neighbouring levels using only resources that are already loaded:
//!
//! ```text
//!  z-2   ┌───────────────┐   below: walk parents until a decoded one
//!  z-1   ├───────┬───────┤
//!  z     ├───┬───┼───┬───┤   ← active tile
//!  z+1   ├─┬─┼─┬─┼─┬─┼─┬─┤   above: children, recursing while < 4 decoded
//! ```

use std::collections::HashMap;

use super::lifecycle::Tile;
use crate::host::{DisplaySurface, TileLoader};
use crate::pyramid::TileId;
use crate::resource::{BatchEntry, DecodeScheduler};

/// All live tiles, keyed by identity.
#[derive(Debug, Default)]
pub struct TileStore {
    tiles: HashMap<TileId, Tile>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn get_mut(&mut self, id: &TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(id)
    }

    pub fn get_or_create(&mut self, id: TileId) -> &mut Tile {
        self.tiles.entry(id).or_insert_with(|| Tile::new(id))
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut()
    }

    /// Clear the active/placeholder flags of every tile.
    pub fn reset_relations(&mut self) {
        for tile in self.tiles.values_mut() {
            tile.is_placeholder = false;
            tile.is_in_active_layer = false;
        }
    }

    pub fn create_placeholder(&mut self, id: TileId) {
        self.get_or_create(id).is_placeholder = true;
    }

    /// Show loaded ancestors of `id` as placeholders.
    ///
    /// Stops at the first decoded ancestor. Returns `true` if one was found.
    pub fn show_placeholder_below<L: TileLoader>(
        &mut self,
        id: TileId,
        scheduler: &DecodeScheduler<L>,
    ) -> bool {
        let mut current = id;
        while let Some(parent) = current.parent() {
            if let Some(resource) = scheduler.resource(&parent) {
                if resource.is_loaded() {
                    self.create_placeholder(parent);
                    if resource.is_decoded() {
                        return true;
                    }
                }
            }
            current = parent;
        }
        false
    }

    /// Show loaded descendants of `id` as placeholders, up to level `max_z`.
    ///
    /// Recurses into each child quadrant while fewer than four children are
    /// decoded.
    pub fn show_placeholders_above<L: TileLoader>(
        &mut self,
        id: TileId,
        max_z: u32,
        scheduler: &DecodeScheduler<L>,
    ) {
        if id.z + 1 > max_z {
            return;
        }

        let children = id.children();
        let mut decoded = 0;
        for child in children {
            if let Some(resource) = scheduler.resource(&child) {
                if resource.is_loaded() {
                    self.create_placeholder(child);
                    if resource.is_decoded() {
                        decoded += 1;
                    }
                }
            }
        }

        if decoded < children.len() {
            for child in children {
                self.show_placeholders_above(child, max_z, scheduler);
            }
        }
    }

    /// Detach and drop every tile with no role.
    pub fn destroy_unused<L: TileLoader, S: DisplaySurface>(
        &mut self,
        scheduler: &mut DecodeScheduler<L>,
        surface: &mut S,
    ) -> usize {
        let before = self.tiles.len();
        self.tiles.retain(|_, tile| {
            if tile.is_needed() {
                return true;
            }
            tile.detach(scheduler, surface);
            false
        });
        before - self.tiles.len()
    }

    /// Needed tiles that are not attached yet, coarse levels first, row-major.
    pub fn pending_attach(&self) -> Vec<BatchEntry> {
        let mut entries: Vec<BatchEntry> = self
            .tiles
            .values()
            .filter(|tile| tile.is_needed() && !tile.is_attached())
            .map(|tile| BatchEntry {
                id: tile.id(),
                in_active_layer: tile.is_in_active_layer,
            })
            .collect();
        entries.sort_by_key(|entry| (entry.id.z, entry.id.y, entry.id.x));
        entries
    }

    /// Whether every active-layer tile is fully displayed or fading in.
    pub fn active_tiles_displayed(&self) -> bool {
        self.tiles
            .values()
            .filter(|tile| tile.is_in_active_layer)
            .all(|tile| tile.is_fully_displayed() || tile.is_fading())
    }

    /// Destroy every tile.
    pub fn destroy<L: TileLoader, S: DisplaySurface>(
        &mut self,
        scheduler: &mut DecodeScheduler<L>,
        surface: &mut S,
    ) {
        for tile in self.tiles.values_mut() {
            tile.destroy(scheduler, surface);
        }
        self.tiles.clear();
    }
}

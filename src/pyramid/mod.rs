//! Image pyramid: tile identities, resolution layers, URL addressing and the
//! controller that ties them to the resource and tile layers.
//!
//! # Levels
//!
//! ```text
//!   z = 0          ┌─┐                 1 tile, coarsest
//!   z = 1         ┌┴─┴┐
//!   ...          ...  ...
//!   z = max  ┌───┬───┬───┬───┐         full resolution
//!            └───┴───┴───┴───┘
//! ```
//!
//! Each level doubles the resolution of the previous one. A tile `(x, y, z)`
//! has the parent `(x/2, y/2, z-1)` and four children at `z+1`.
//!
//! # Components
//!
//! - [`TileId`]: identity of one tile
//! - [`ResolutionLayer`]: one level, maps a viewport to tile coordinates
//! - [`AddressingScheme`]: tile identity to URL (Deep Zoom, Zoomify or custom)
//! - [`PyramidController`]: active-layer selection and the frame pipeline

mod addressing;
mod controller;
mod identity;
mod layer;

pub use addressing::{
    deepzoom_max_level, zoomify_grids, AddressingScheme, TileType, TileUrlFn,
    ZOOMIFY_TILES_PER_GROUP,
};
pub use controller::{PyramidController, StreamerStats};
pub use identity::TileId;
pub use layer::{ResolutionLayer, Viewport};

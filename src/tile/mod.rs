//! Tiles: per-cell display lifecycle and the tile store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           PyramidController             │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileStore                 │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  Tile        │  │  placeholder    │  │
//! │  │  (attach,    │  │  search (below/ │  │
//! │  │   fade-in)   │  │  above)         │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ by identity
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            DecodeScheduler              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Tile`]: one grid cell; attach/detach, display step, fade-in
//! - [`TileStore`]: identity-keyed tiles, role bookkeeping, placeholder search

mod lifecycle;
mod store;

pub use lifecycle::{Tile, FULLY_DISPLAYED_GRACE};
pub use store::TileStore;

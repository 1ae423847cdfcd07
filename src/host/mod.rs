//! Host capabilities: tile loading and display.
//!
//! The engine is I/O-free. Everything that touches the outside world goes
//! through the two traits defined here:
//!
//! - [`TileLoader`]: fetches and decodes a tile image asynchronously
//! - [`DisplaySurface`]: shows decoded tiles inside per-layer containers

mod loader;
mod surface;

pub use loader::{
    decode_tile, CompletionSink, FetchingLoader, FsFetcher, LoadCompletion, LoadRequest,
    TileFetcher, TileLoader,
};
pub use surface::{DisplaySurface, RecordingSurface, ShownTile, TilePlacement, Transition};

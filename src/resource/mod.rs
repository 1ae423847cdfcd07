//! Tile image resources: state machine, cache and scheduler.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               DecodeScheduler                │
//! │  ┌───────────────┐  ┌──────────────────────┐ │
//! │  │ queue         │  │ TileId → ImageResource│ │
//! │  └───────────────┘  └──────────────────────┘ │
//! │  ┌───────────────┐                           │
//! │  │ ResourceCache │  (soft-bounded, by age)   │
//! │  └───────────────┘                           │
//! └──────────────────────┬───────────────────────┘
//!                        │ LoadRequest
//!                        ▼
//!                   TileLoader (host)
//! ```

mod cache;
mod image_resource;
mod scheduler;

pub use cache::{ResourceCache, DEFAULT_CACHE_LIMIT};
pub use image_resource::{
    DecodeRequest, DecodeState, DecodedTile, ImageResource, LoadState, LoadTicket, ResourceEvent,
};
pub use scheduler::{
    BatchEntry, DecodeScheduler, SchedulerLimits, DEFAULT_MAX_DECODING,
    DEFAULT_MIN_BATCH_REQUESTS,
};

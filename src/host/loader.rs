//! Tile loading seam.
//!
//! The engine never performs I/O on its own. When the scheduler admits a
//! resource it hands a [`LoadRequest`] to the host's [`TileLoader`], which
//! must eventually report back through the [`CompletionSink`] it was given.
//! Completions are consumed on the next frame, never synchronously.
//!
//! ```text
//! scheduler ──LoadRequest──▶ TileLoader ──(async)──▶ CompletionSink
//!     ▲                                                    │
//!     └──────────────── next frame drains ◀────────────────┘
//! ```
//!
//! [`FetchingLoader`] is the stock implementation: it fetches bytes through a
//! [`TileFetcher`] on a tokio task and decodes them with the `image` crate on
//! the blocking pool.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::ImageReader;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::pyramid::TileId;
use crate::resource::{DecodedTile, LoadTicket};

// =============================================================================
// Requests and Completions
// =============================================================================

/// A request to fetch and decode one tile image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Attempt token; must be echoed back on completion
    pub ticket: LoadTicket,

    /// Source URL of the tile
    pub url: String,
}

impl LoadRequest {
    pub fn id(&self) -> TileId {
        self.ticket.id
    }
}

/// Result of one load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCompletion {
    pub ticket: LoadTicket,
    pub result: Result<DecodedTile, ResourceError>,
}

/// Channel back into the engine for load results.
///
/// Sending after the engine has been dropped is silently ignored.
#[derive(Debug, Clone)]
pub struct CompletionSink {
    sender: UnboundedSender<LoadCompletion>,
}

impl CompletionSink {
    pub(crate) fn new(sender: UnboundedSender<LoadCompletion>) -> Self {
        Self { sender }
    }

    /// Report the outcome of the attempt identified by `ticket`.
    pub fn complete(&self, ticket: LoadTicket, result: Result<DecodedTile, ResourceError>) {
        if self.sender.send(LoadCompletion { ticket, result }).is_err() {
            debug!(tile = %ticket.id, "Dropping completion for closed engine");
        }
    }
}

/// Host capability that starts tile loads.
///
/// `begin` must not block; the result is delivered through `sink`.
pub trait TileLoader {
    fn begin(&mut self, request: LoadRequest, sink: CompletionSink);
}

// =============================================================================
// Fetch + Decode
// =============================================================================

/// Source of raw (encoded) tile bytes.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    /// Fetch the encoded image at `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, ResourceError>;
}

/// Reads tiles from a local directory; URLs are paths relative to `root`.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TileFetcher for FsFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ResourceError> {
        let path = self.root.join(url.trim_start_matches('/'));
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| ResourceError::Load(format!("{}: {}", path.display(), e)))?;
        Ok(Bytes::from(data))
    }
}

/// Decode encoded image bytes (format sniffed from content) into RGBA8.
pub fn decode_tile(data: &[u8]) -> Result<DecodedTile, ResourceError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ResourceError::Decode(e.to_string()))?;

    let img = reader
        .decode()
        .map_err(|e| ResourceError::Decode(e.to_string()))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedTile::new(width, height, rgba.into_raw()))
}

/// [`TileLoader`] that fetches on tokio tasks and decodes on the blocking pool.
///
/// Must be driven from within a tokio runtime.
pub struct FetchingLoader<F> {
    fetcher: Arc<F>,
}

impl<F: TileFetcher + 'static> FetchingLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

impl<F: TileFetcher + 'static> TileLoader for FetchingLoader<F> {
    fn begin(&mut self, request: LoadRequest, sink: CompletionSink) {
        let fetcher = Arc::clone(&self.fetcher);

        tokio::spawn(async move {
            let LoadRequest { ticket, url } = request;

            let result = match fetcher.fetch(&url).await {
                Ok(data) => tokio::task::spawn_blocking(move || decode_tile(&data))
                    .await
                    .unwrap_or_else(|e| Err(ResourceError::Decode(e.to_string()))),
                Err(e) => Err(e),
            };

            if let Err(ref e) = result {
                warn!(tile = %ticket.id, url = %url, error = %e, "Tile load failed");
            }
            sink.complete(ticket, result);
        });
    }
}

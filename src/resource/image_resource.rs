//! Load/decode state machine for a single tile image.
//!
//! One [`ImageResource`] exists per tile identity. It never performs I/O
//! itself: [`ImageResource::request_decode`] tells the caller what to start,
//! and [`ImageResource::complete`] folds the eventual result back in and
//! yields the event that tiles observe.

use bytes::Bytes;

use crate::error::ResourceError;
use crate::pyramid::TileId;

/// Network/fetch state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Error,
}

/// Decode state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Idle,
    Decoding,
    Decoded,
}

/// Token identifying one load or decode attempt.
///
/// Completions carrying a ticket other than the resource's current one are
/// stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket {
    /// Tile the attempt belongs to
    pub id: TileId,

    /// Unique attempt number
    pub seq: u64,
}

/// A decoded RGBA8 bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,

    /// Row-major RGBA8 pixels
    pub pixels: Bytes,
}

impl DecodedTile {
    pub fn new(width: u32, height: u32, pixels: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// A bitmap with no pixel data, for hosts that only track state.
    pub fn empty(width: u32, height: u32) -> Self {
        Self::new(width, height, Bytes::new())
    }
}

/// What the caller must do after [`ImageResource::request_decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeRequest {
    /// Already decoded: the success event should be re-emitted
    Notify,

    /// An attempt is already in flight (or nothing can be done yet)
    Wait,

    /// Bytes are loaded; decode them again under this ticket
    Redecode(LoadTicket),

    /// Start a fresh load+decode of the URL under this ticket
    Fetch(LoadTicket),
}

/// Observable outcome of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Decoded(TileId),
    Failed(TileId, ResourceError),
}

/// One tile image and its load/decode state.
#[derive(Debug)]
pub struct ImageResource {
    id: TileId,
    url: String,
    load_state: LoadState,
    decode_state: DecodeState,
    has_owner: bool,
    low_priority: bool,
    ticket: Option<LoadTicket>,
    bitmap: Option<DecodedTile>,
    destroyed: bool,
}

impl ImageResource {
    /// Create an idle resource for the given tile and URL.
    pub fn new(id: TileId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            load_state: LoadState::Idle,
            decode_state: DecodeState::Idle,
            has_owner: false,
            low_priority: false,
            ticket: None,
            bitmap: None,
            destroyed: false,
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn decode_state(&self) -> DecodeState {
        self.decode_state
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Loaded
    }

    pub fn is_decoded(&self) -> bool {
        self.decode_state == DecodeState::Decoded
    }

    pub fn is_decoding(&self) -> bool {
        self.decode_state == DecodeState::Decoding
    }

    /// Whether the resource has started (or finished) fetching its bytes.
    pub fn has_started(&self) -> bool {
        matches!(self.load_state, LoadState::Loading | LoadState::Loaded) || self.is_decoding()
    }

    pub fn has_owner(&self) -> bool {
        self.has_owner
    }

    pub fn is_low_priority(&self) -> bool {
        self.low_priority
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Flag the resource as a coarse placeholder.
    ///
    /// Low-priority resources bypass the decode cap and are never evicted.
    pub fn set_low_priority(&mut self, low_priority: bool) {
        self.low_priority = low_priority;
    }

    /// The decoded bitmap, once loaded.
    pub fn bitmap(&self) -> Option<&DecodedTile> {
        self.bitmap.as_ref()
    }

    /// Whether the cache may drop this resource.
    pub fn is_evictable(&self) -> bool {
        !self.has_owner && !self.low_priority
    }

    /// A tile started using this resource.
    pub fn mark_attached(&mut self) {
        self.has_owner = true;
    }

    /// The tile using this resource went away.
    ///
    /// An in-flight decode is allowed to finish, but it will end in
    /// [`DecodeState::Idle`] rather than [`DecodeState::Decoded`].
    pub fn mark_detached(&mut self) {
        self.has_owner = false;
        if self.decode_state != DecodeState::Decoding {
            self.decode_state = DecodeState::Idle;
        }
    }

    /// Idempotent entry point for getting the resource decoded.
    ///
    /// `next_seq` supplies a fresh attempt number; it is only consumed when a
    /// new attempt is started.
    pub fn request_decode(&mut self, next_seq: impl FnOnce() -> u64) -> DecodeRequest {
        if self.destroyed {
            return DecodeRequest::Wait;
        }

        match (self.load_state, self.decode_state) {
            (LoadState::Loaded, DecodeState::Decoded) => DecodeRequest::Notify,
            (LoadState::Loaded, DecodeState::Decoding) => DecodeRequest::Wait,
            (LoadState::Loaded, DecodeState::Idle) => {
                let ticket = self.begin(next_seq());
                DecodeRequest::Redecode(ticket)
            }
            (LoadState::Loading, _) => DecodeRequest::Wait,
            (LoadState::Idle, _) | (LoadState::Error, _) => {
                if self.load_state == LoadState::Error {
                    // Recreate the fetch handle before retrying
                    self.bitmap = None;
                }
                self.load_state = LoadState::Loading;
                let ticket = self.begin(next_seq());
                DecodeRequest::Fetch(ticket)
            }
        }
    }

    fn begin(&mut self, seq: u64) -> LoadTicket {
        let ticket = LoadTicket { id: self.id, seq };
        self.ticket = Some(ticket);
        self.decode_state = DecodeState::Decoding;
        ticket
    }

    /// Emit the success event for an already decoded resource.
    pub fn renotify(&mut self) -> ResourceEvent {
        self.finish_decoded();
        ResourceEvent::Decoded(self.id)
    }

    fn finish_decoded(&mut self) {
        // Display cannot be guaranteed without a current consumer
        self.decode_state = if self.has_owner {
            DecodeState::Decoded
        } else {
            DecodeState::Idle
        };
        self.load_state = LoadState::Loaded;
    }

    /// Fold in the result of an attempt.
    ///
    /// Returns `None` for stale tickets and destroyed resources.
    pub fn complete(
        &mut self,
        ticket: LoadTicket,
        result: Result<DecodedTile, ResourceError>,
    ) -> Option<ResourceEvent> {
        if self.destroyed || self.ticket != Some(ticket) {
            return None;
        }
        self.ticket = None;

        match result {
            Ok(bitmap) => {
                self.bitmap = Some(bitmap);
                self.finish_decoded();
                Some(ResourceEvent::Decoded(self.id))
            }
            Err(err) => {
                self.decode_state = DecodeState::Idle;
                self.load_state = LoadState::Error;
                Some(ResourceEvent::Failed(self.id, err))
            }
        }
    }

    /// Release the bitmap and detach any pending completion.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.ticket = None;
        self.bitmap = None;
    }
}

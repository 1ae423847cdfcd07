//! Admission-controlled load/decode scheduler.
//!
//! The scheduler owns every live [`ImageResource`], keyed by tile identity,
//! together with the work queue and the [`ResourceCache`]. Tiles refer to
//! their resource by identity only.
//!
//! # Tick
//!
//! While the queue is non-empty, [`DecodeScheduler::tick`] runs once per
//! frame:
//!
//! ```text
//! 1. drop finished, failed and abandoned resources from the queue
//! 2. count in-flight loads and decodes
//! 3. re-decode owned, loaded, idle resources (cap bypassed for low-priority)
//! 4. if fewer than `min_batch_requests` loads are running, start every
//!    owned resource that is not decoding, up to `max_decoding`
//! 5. stop when the queue is empty
//! ```
//!
//! Completions arrive through an unbounded channel and are only folded in by
//! [`DecodeScheduler::drain_events`], so results are never applied
//! synchronously from inside a tick.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use super::cache::ResourceCache;
use super::image_resource::{
    DecodeRequest, DecodeState, ImageResource, LoadState, LoadTicket, ResourceEvent,
};
use crate::host::{CompletionSink, LoadCompletion, LoadRequest, TileLoader};
use crate::pyramid::TileId;

/// Default cap on concurrently decoding resources.
pub const DEFAULT_MAX_DECODING: usize = 15;

/// Default minimum number of simultaneous load requests.
pub const DEFAULT_MIN_BATCH_REQUESTS: usize = 6;

/// Scheduler limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerLimits {
    /// Maximum resources decoding at once (low-priority resources excepted)
    pub max_decoding: usize,

    /// Below this many in-flight loads, a new batch of loads is started
    pub min_batch_requests: usize,

    /// Soft capacity of the resource cache
    pub cache_limit: usize,
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            max_decoding: DEFAULT_MAX_DECODING,
            min_batch_requests: DEFAULT_MIN_BATCH_REQUESTS,
            cache_limit: super::cache::DEFAULT_CACHE_LIMIT,
        }
    }
}

/// A tile about to be attached, as seen by [`DecodeScheduler::insert_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    pub id: TileId,
    pub in_active_layer: bool,
}

// =============================================================================
// Decode Scheduler
// =============================================================================

/// Owns resources, the work queue and the cache; dispatches loads.
pub struct DecodeScheduler<L> {
    loader: L,

    resources: HashMap<TileId, ImageResource>,

    /// Resources that need loading or decoding, in priority order
    queue: Vec<TileId>,

    cache: ResourceCache,

    limits: SchedulerLimits,

    /// Counters of the last tick
    decoding_count: usize,
    loading_count: usize,

    running: bool,
    next_seq: u64,

    sender: UnboundedSender<LoadCompletion>,
    receiver: UnboundedReceiver<LoadCompletion>,

    /// Events produced without a round trip (already decoded resources)
    ready: Vec<ResourceEvent>,
}

impl<L: TileLoader> DecodeScheduler<L> {
    /// Create a scheduler that dispatches loads to `loader`.
    pub fn new(loader: L, limits: SchedulerLimits) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            loader,
            resources: HashMap::new(),
            queue: Vec::new(),
            cache: ResourceCache::with_limit(limits.cache_limit),
            limits,
            decoding_count: 0,
            loading_count: 0,
            running: false,
            next_seq: 0,
            sender,
            receiver,
            ready: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Resource store
    // -------------------------------------------------------------------------

    /// Look up a resource by identity.
    pub fn resource(&self, id: &TileId) -> Option<&ImageResource> {
        self.resources.get(id)
    }

    /// Look up a resource, creating it with the given URL if it does not exist.
    pub fn get_or_create(
        &mut self,
        id: TileId,
        url: impl FnOnce() -> String,
    ) -> &mut ImageResource {
        self.resources
            .entry(id)
            .or_insert_with(|| ImageResource::new(id, url()))
    }

    /// Whether a resource for `id` exists and has its bytes loaded.
    pub fn has_loaded(&self, id: &TileId) -> bool {
        self.resources.get(id).is_some_and(ImageResource::is_loaded)
    }

    /// A tile started using the resource.
    pub fn mark_attached(&mut self, id: &TileId) {
        if let Some(resource) = self.resources.get_mut(id) {
            resource.mark_attached();
        }
    }

    /// The tile using the resource went away.
    pub fn mark_detached(&mut self, id: &TileId) {
        if let Some(resource) = self.resources.get_mut(id) {
            resource.mark_detached();
        }
        self.release_if_orphaned(id);
    }

    /// Flag a resource as a coarse placeholder.
    pub fn set_low_priority(&mut self, id: &TileId) {
        if let Some(resource) = self.resources.get_mut(id) {
            resource.set_low_priority(true);
        }
    }

    fn release_if_orphaned(&mut self, id: &TileId) {
        let orphaned = self.resources.get(id).is_some_and(|r| !r.has_owner())
            && !self.cache.contains(id)
            && !self.queue.contains(id);
        if orphaned {
            if let Some(mut resource) = self.resources.remove(id) {
                resource.destroy();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Cache
    // -------------------------------------------------------------------------

    /// Add a resource to the cache unless it failed, destroying whatever the
    /// cache evicts to get back to its limit.
    pub fn cache_resource(&mut self, id: TileId) {
        let Some(resource) = self.resources.get(&id) else {
            return;
        };
        if resource.load_state() == LoadState::Error {
            return;
        }

        let resources = &self.resources;
        let evicted = self.cache.add(id, |key| {
            resources.get(key).map_or(true, ImageResource::is_evictable)
        });

        for evicted in evicted {
            debug!(tile = %evicted, "Evicting cached resource");
            self.queue.retain(|queued| *queued != evicted);
            if let Some(mut resource) = self.resources.remove(&evicted) {
                resource.destroy();
            }
        }
    }

    /// Drop a resource from the cache without destroying it.
    pub fn uncache(&mut self, id: &TileId) {
        self.cache.remove_by_key(id);
    }

    pub fn is_cached(&self, id: &TileId) -> bool {
        self.cache.contains(id)
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    // -------------------------------------------------------------------------
    // Queue
    // -------------------------------------------------------------------------

    /// Queue a resource for loading. The first tick runs on the next frame.
    pub fn enqueue(&mut self, id: TileId) {
        if !self.queue.contains(&id) {
            self.queue.push(id);
        }
        self.running = true;
    }

    /// Order a set of tiles about to be attached.
    ///
    /// Tiles whose resource already started loading come first (coarsest
    /// level first), then active-layer tiles, then everything else. Order
    /// within each group is preserved.
    pub fn insert_batch(&self, entries: &[BatchEntry]) -> Vec<TileId> {
        let mut in_flight = Vec::new();
        let mut active = Vec::new();
        let mut others = Vec::new();

        for entry in entries {
            let started = self
                .resources
                .get(&entry.id)
                .is_some_and(ImageResource::has_started);

            if started {
                in_flight.push(entry.id);
            } else if entry.in_active_layer {
                active.push(entry.id);
            } else {
                others.push(entry.id);
            }
        }

        in_flight.sort_by_key(|id| id.z);
        in_flight.extend(active);
        in_flight.extend(others);
        in_flight
    }

    /// Whether the tick loop is scheduled.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn queue(&self) -> &[TileId] {
        &self.queue
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Number of resources decoding as of the last tick.
    pub fn decoding_count(&self) -> usize {
        self.decoding_count
    }

    /// Number of resources loading as of the last tick.
    pub fn loading_count(&self) -> usize {
        self.loading_count
    }

    pub fn limits(&self) -> SchedulerLimits {
        self.limits
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    /// Run one scheduling step.
    pub fn tick(&mut self) {
        self.decoding_count = 0;
        self.loading_count = 0;

        let resources = &self.resources;
        self.queue.retain(|id| {
            let Some(resource) = resources.get(id) else {
                return false;
            };
            if resource.is_destroyed() || resource.load_state() == LoadState::Error {
                return false;
            }
            if resource.is_loaded() && resource.is_decoded() {
                return false;
            }
            // Never started and nothing references it
            !(!resource.has_owner() && resource.decode_state() == DecodeState::Idle)
        });

        for id in &self.queue {
            if let Some(resource) = self.resources.get(id) {
                if resource.load_state() == LoadState::Loading {
                    self.loading_count += 1;
                }
                if resource.is_decoding() {
                    self.decoding_count += 1;
                }
            }
        }

        // Loaded before, then detached, now attached again
        let queue = self.queue.clone();
        for id in &queue {
            let Some(resource) = self.resources.get(id) else {
                continue;
            };
            let redecode = resource.has_owner()
                && resource.is_loaded()
                && resource.decode_state() == DecodeState::Idle;
            if redecode
                && (self.decoding_count < self.limits.max_decoding || resource.is_low_priority())
            {
                self.start(*id);
            }
        }

        if self.loading_count < self.limits.min_batch_requests {
            for id in &queue {
                let Some(resource) = self.resources.get(id) else {
                    continue;
                };
                if resource.has_owner()
                    && !resource.is_decoding()
                    && self.decoding_count < self.limits.max_decoding
                {
                    self.start(*id);
                }
            }
        }

        self.release_orphans();

        self.running = !self.queue.is_empty();
        trace!(
            queued = self.queue.len(),
            loading = self.loading_count,
            decoding = self.decoding_count,
            "Scheduler tick"
        );
    }

    fn start(&mut self, id: TileId) {
        self.decoding_count += 1;

        let next_seq = &mut self.next_seq;
        let Some(resource) = self.resources.get_mut(&id) else {
            return;
        };

        match resource.request_decode(|| {
            *next_seq += 1;
            *next_seq
        }) {
            DecodeRequest::Notify => {
                let event = resource.renotify();
                self.ready.push(event);
            }
            DecodeRequest::Wait => {}
            DecodeRequest::Redecode(ticket) => {
                match resource.bitmap().cloned() {
                    Some(bitmap) => {
                        // Bytes are already here: hand them back on the next frame
                        CompletionSink::new(self.sender.clone()).complete(ticket, Ok(bitmap));
                    }
                    None => self.dispatch(ticket),
                }
            }
            DecodeRequest::Fetch(ticket) => {
                debug!(tile = %id, "Starting tile load");
                self.dispatch(ticket);
            }
        }

        self.cache_resource(id);
    }

    fn dispatch(&mut self, ticket: LoadTicket) {
        let Some(resource) = self.resources.get(&ticket.id) else {
            return;
        };
        let request = LoadRequest {
            ticket,
            url: resource.url().to_string(),
        };
        self.loader
            .begin(request, CompletionSink::new(self.sender.clone()));
    }

    fn release_orphans(&mut self) {
        let cache = &self.cache;
        let queue = &self.queue;
        self.resources.retain(|id, resource| {
            let keep = resource.has_owner() || cache.contains(id) || queue.contains(id);
            if !keep {
                resource.destroy();
            }
            keep
        });
    }

    // -------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------

    /// Fold every pending completion into its resource and return the events.
    ///
    /// Stale completions (superseded or destroyed resources) are dropped.
    pub fn drain_events(&mut self) -> Vec<ResourceEvent> {
        let mut events = std::mem::take(&mut self.ready);

        while let Ok(completion) = self.receiver.try_recv() {
            let id = completion.ticket.id;
            let Some(resource) = self.resources.get_mut(&id) else {
                trace!(tile = %id, "Completion for released resource");
                continue;
            };
            match resource.complete(completion.ticket, completion.result) {
                Some(event) => events.push(event),
                None => trace!(tile = %id, "Ignoring stale completion"),
            }
        }

        events
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Stop the loop and forget the queue.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.running = false;
    }

    /// Destroy every resource and empty the cache.
    pub fn destroy(&mut self) {
        self.clear();
        self.cache.clear();
        for resource in self.resources.values_mut() {
            resource.destroy();
        }
        self.resources.clear();
        self.ready.clear();
        while self.receiver.try_recv().is_ok() {}
    }
}

// =============================================================================
// Tests
// =============================================================================

//! End-to-end streaming through the controller with a manual loader.

use std::sync::Arc;
use std::time::Duration;

use deepzoom_streamer::{
    ImageDescriptor, LoadState, PyramidController, RecordingSurface, StreamerOptions, TileId,
    TileType, Transition, Viewport,
};

use super::test_utils::{controller, options, settle, Clock, ManualLoader};

// =============================================================================
// Basic Streaming
// =============================================================================

#[test]
fn test_streams_visible_tiles() {
    let mut c = controller(1024, 1024, options());
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(512.0, 512.0));
    c.update_size(512.0, 512.0);

    assert_eq!(c.active_layer_scale(), Some(0.5));
    assert!(!c.is_fully_displayed());

    // First frame starts the loads
    c.frame(clock.tick());
    let mut pending = c.scheduler().loader().pending_ids();
    pending.sort();
    assert_eq!(
        pending,
        vec![
            TileId::new(0, 0, 9),
            TileId::new(0, 1, 9),
            TileId::new(1, 0, 9),
            TileId::new(1, 1, 9),
        ]
    );

    // Completions are picked up on the next frame
    c.loader_mut().complete_all();
    assert!(!c.is_fully_displayed());
    c.frame(clock.tick());

    assert!(c.is_fully_displayed());
    assert_eq!(c.surface().tiles_in_layer(9).len(), 4);
    assert!(c
        .surface()
        .tiles
        .values()
        .all(|shown| shown.transition == Transition::Immediate));
    assert_eq!(c.stats().displayed_tiles, 4);
}

#[test]
fn test_tile_placement_with_overlap() {
    let options = StreamerOptions {
        tile_overlap: 1,
        ..options()
    };
    let mut c = controller(1024, 1024, options);
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(512.0, 512.0));
    c.update_size(512.0, 512.0);
    settle(&mut c, &mut clock);

    let shown = &c.surface().tiles;
    assert_eq!(shown[&TileId::new(0, 0, 9)].placement.x, 0);
    assert_eq!(shown[&TileId::new(1, 0, 9)].placement.x, 255);
    assert_eq!(shown[&TileId::new(1, 1, 9)].placement.y, 255);
}

#[test]
fn test_fade_in_then_fully_displayed() {
    let options = StreamerOptions {
        fade_in_duration_ms: 150,
        ..options()
    };
    let mut c = controller(512, 512, options);
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(200.0, 200.0));
    c.update_size(256.0, 256.0);

    let id = TileId::new(0, 0, 8);
    c.frame(clock.tick());
    c.loader_mut().complete_all();
    c.frame(clock.tick());

    // Inserted with a fade, which already counts as displayed
    assert_eq!(
        c.surface().tiles[&id].transition,
        Transition::FadeIn(Duration::from_millis(150))
    );
    assert!(c.is_fully_displayed());
    assert!(!c.tile(&id).unwrap().is_fully_displayed());

    // Not before fade + grace
    c.frame(clock.advance(Duration::from_millis(300)));
    assert!(!c.tile(&id).unwrap().is_fully_displayed());

    c.frame(clock.advance(Duration::from_millis(100)));
    assert!(c.tile(&id).unwrap().is_fully_displayed());

    // Becoming fully displayed schedules a recompute for the next frame
    assert!(c.is_recompute_pending());
    let before = c.stats().recompute_count;
    c.frame(clock.tick());
    assert_eq!(c.stats().recompute_count, before + 1);
}

// =============================================================================
// Admission Control
// =============================================================================

#[test]
fn test_decode_limit_and_batching() {
    let mut c = controller(4096, 4096, options());
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(2048.0, 2048.0));
    c.update_size(2048.0, 2048.0);

    // 8x8 visible tiles, at most 15 in flight
    assert_eq!(c.stats().attached_tiles, 64);
    c.frame(clock.tick());
    assert_eq!(c.scheduler().loader().request_count(), 15);

    // 15 loading is above the batch threshold: nothing new starts
    c.frame(clock.tick());
    assert_eq!(c.scheduler().loader().request_count(), 15);

    // 5 still loading is below the threshold: refill up to the limit
    c.loader_mut().complete_first(10);
    c.frame(clock.tick());
    assert_eq!(c.scheduler().loader().request_count(), 25);
    assert_eq!(c.stats().displayed_tiles, 10);
}

#[test]
fn test_low_res_layer_loads_first() {
    let options = StreamerOptions {
        use_low_res_layer: true,
        fade_in_duration_ms: 150,
        ..options()
    };
    let mut c = controller(4096, 4096, options);
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(2048.0, 2048.0));
    c.update_size(2048.0, 2048.0);

    // Layer 8 is the first covering a whole tile
    let low_res = TileId::new(0, 0, 8);
    assert!(c.layers()[8].is_low_res);
    assert!(c.tile(&low_res).unwrap().is_placeholder);

    c.frame(clock.tick());
    assert_eq!(c.scheduler().loader().urls()[0], "8/0_0.jpg");
    assert!(c.scheduler().resource(&low_res).unwrap().is_low_priority());

    // Low-res tiles never fade
    c.loader_mut().complete_first(1);
    c.frame(clock.tick());
    assert_eq!(c.surface().tiles[&low_res].transition, Transition::Immediate);
}

// =============================================================================
// Resize and Gestures
// =============================================================================

#[test]
fn test_resize_coalescing_across_frames() {
    let mut c = controller(2048, 2048, options());
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(600.0, 600.0));

    c.update_size(600.0, 600.0);
    for _ in 0..5 {
        c.update_size(600.0, 600.0);
    }
    assert_eq!(c.stats().recompute_count, 1);

    c.frame(clock.tick());
    assert_eq!(c.stats().recompute_count, 2);

    // Nothing scheduled: the next frame does not recompute
    c.frame(clock.tick());
    assert_eq!(c.stats().recompute_count, 2);
}

#[test]
fn test_loading_blocked_during_wheel() {
    let mut c = controller(1024, 1024, options());
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(512.0, 512.0));
    c.set_loading_blocked(true);
    c.update_size(512.0, 512.0);

    for _ in 0..3 {
        c.frame(clock.tick());
    }
    assert_eq!(c.scheduler().loader().request_count(), 0);
    assert!(c.is_loading_blocked());

    c.set_loading_blocked(false);
    c.frame(clock.tick());
    assert_eq!(c.scheduler().loader().request_count(), 4);
}

#[test]
fn test_gesture_freezes_tiles() {
    let mut c = controller(2048, 2048, options());
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(600.0, 600.0));
    c.update_size(600.0, 600.0);
    settle(&mut c, &mut clock);
    let layer = c.active_layer_scale();

    c.set_viewport(Viewport::new(600.0, 600.0).with_zoom_scale(2.0));
    c.update_size(1200.0, 1200.0);
    assert_eq!(c.active_layer_scale(), layer);

    // Gesture ended
    c.set_viewport(Viewport::new(600.0, 600.0));
    c.update_size(1200.0, 1200.0);
    assert_eq!(c.active_layer_scale(), Some(1.0));
}

// =============================================================================
// Failures and Re-Attach
// =============================================================================

#[test]
fn test_failed_load_keeps_tile_undisplayed() {
    let mut c = controller(512, 512, options());
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(200.0, 200.0));
    c.update_size(256.0, 256.0);

    let id = TileId::new(0, 0, 8);
    c.frame(clock.tick());
    assert!(c.scheduler().is_cached(&id));

    c.loader_mut().fail_all();
    c.frame(clock.tick());

    let resource = c.scheduler().resource(&id).unwrap();
    assert_eq!(resource.load_state(), LoadState::Error);
    assert!(!c.scheduler().is_cached(&id));
    assert!(!c.surface().is_shown(&id));
    assert!(!c.is_fully_displayed());

    // No retry while the tile stays attached
    for _ in 0..3 {
        c.frame(clock.tick());
    }
    assert_eq!(c.scheduler().loader().request_count(), 1);
}

#[test]
fn test_redecode_without_refetch() {
    let mut c = controller(512, 512, options());
    let mut clock = Clock::new();
    let home = Viewport::new(200.0, 200.0);
    let away = home.with_pan(-300.0, -300.0);
    let first = TileId::new(0, 0, 9);
    let second = TileId::new(1, 1, 9);

    c.set_viewport(home);
    c.update_size(512.0, 512.0);
    c.frame(clock.tick());
    assert_eq!(c.scheduler().loader().pending_ids(), vec![first]);

    // Pan away before the tile arrives
    c.set_viewport(away);
    c.recompute();
    assert!(c.tile(&first).is_none());

    // The late completion lands on the cached resource, not on a tile
    c.loader_mut().complete_all();
    c.frame(clock.tick());
    assert!(!c.surface().is_shown(&first));
    assert!(c.scheduler().has_loaded(&first));

    c.loader_mut().complete_all();
    c.frame(clock.tick());
    assert!(c.surface().is_shown(&second));

    // Pan back: decoded again from the retained bitmap
    c.set_viewport(home);
    c.recompute();
    c.frame(clock.tick());
    c.frame(clock.tick());

    assert!(c.surface().is_shown(&first));
    assert_eq!(c.scheduler().loader().request_count(), 2);
}

// =============================================================================
// Addressing
// =============================================================================

#[test]
fn test_zoomify_urls() {
    let options = StreamerOptions {
        tile_url: Some("TileGroup{group}/{z}-{x}-{y}.jpg".to_string()),
        tile_type: TileType::Zoomify,
        ..options()
    };
    let mut c = controller(1000, 600, options);
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(1000.0, 600.0));
    c.update_size(1000.0, 600.0);
    c.frame(clock.tick());

    let mut urls = c.scheduler().loader().urls().to_vec();
    urls.sort();
    assert_eq!(urls.len(), 12);
    assert_eq!(urls[0], "TileGroup0/2-0-0.jpg");
    assert!(urls.contains(&"TileGroup0/2-3-2.jpg".to_string()));
}

#[test]
fn test_custom_url_function() {
    let mut c = PyramidController::with_url_fn(
        StreamerOptions::default(),
        ImageDescriptor::new(256, 256),
        Arc::new(|id: TileId| format!("https://tiles.example/{}", id)),
        ManualLoader::default(),
        RecordingSurface::new(),
    )
    .unwrap();
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(256.0, 256.0));
    c.update_size(256.0, 256.0);
    c.frame(clock.tick());

    assert_eq!(
        c.scheduler().loader().urls(),
        &["https://tiles.example/0_0_8".to_string()]
    );
}

#[test]
fn test_image_overrides_options() {
    let image = ImageDescriptor::new(1024, 1024)
        .with_tile_url("img/{z}/{x}/{y}.png")
        .with_tile_size(512);
    let mut c = PyramidController::new(
        options(),
        image,
        ManualLoader::default(),
        RecordingSurface::new(),
    )
    .unwrap();
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(1024.0, 1024.0));
    c.update_size(1024.0, 1024.0);
    c.frame(clock.tick());

    assert_eq!(c.tile_size(), 512);
    let mut urls = c.scheduler().loader().urls().to_vec();
    urls.sort();
    assert_eq!(
        urls,
        vec!["img/10/0/0.png", "img/10/0/1.png", "img/10/1/0.png", "img/10/1/1.png"]
    );
}

// =============================================================================
// Teardown
// =============================================================================

#[test]
fn test_destroy_drops_late_completions() {
    let mut c = controller(1024, 1024, options());
    let mut clock = Clock::new();
    c.set_viewport(Viewport::new(512.0, 512.0));
    c.update_size(512.0, 512.0);
    c.frame(clock.tick());

    c.destroy();
    c.loader_mut().complete_all();
    c.frame(clock.tick());

    assert!(c.surface().tiles.is_empty());
    assert!(c.surface().layers.is_empty());
    assert_eq!(c.scheduler().resource_count(), 0);
    assert_eq!(c.stats().tiles, 0);
}

//! Placeholder fallback across levels and cache eviction while panning.

use deepzoom_streamer::{StreamerOptions, TileId, Viewport};

use super::test_utils::{controller, options, settle, Clock, TestController};

/// 1024x1024 image in a 200x200 viewport, settled at the given display width.
fn settled_at(display: f64, clock: &mut Clock) -> TestController {
    let mut c = controller(1024, 1024, options());
    c.set_viewport(Viewport::new(200.0, 200.0));
    c.update_size(display, display);
    settle(&mut c, clock);
    c
}

// =============================================================================
// Zooming In
// =============================================================================

#[test]
fn test_zoom_in_shows_parent_placeholder() {
    let mut clock = Clock::new();
    let mut c = settled_at(256.0, &mut clock);
    let parent = TileId::new(0, 0, 8);
    let child = TileId::new(0, 0, 9);
    assert!(c.surface().is_shown(&parent));

    c.update_size(512.0, 512.0);
    assert_eq!(c.active_layer().map(|l| l.z), Some(9));

    // Parent stays on screen until the child is fully displayed
    assert!(c.tile(&parent).unwrap().is_placeholder);
    assert!(c.surface().is_shown(&parent));
    assert!(!c.surface().is_shown(&child));

    settle(&mut c, &mut clock);
    assert!(c.surface().is_shown(&child));
    assert!(c.tile(&parent).is_none());
    assert!(!c.surface().is_shown(&parent));

    // Released tiles keep their resource in the cache
    assert!(c.scheduler().is_cached(&parent));
    assert!(c.scheduler().has_loaded(&parent));
}

#[test]
fn test_placeholder_below_skips_missing_levels() {
    let mut clock = Clock::new();
    let mut c = settled_at(256.0, &mut clock);
    let requests = c.scheduler().loader().request_count();

    // Layer 9 was never loaded; layer 8 fills in for layer 10
    c.update_size(1024.0, 1024.0);
    assert_eq!(c.active_layer().map(|l| l.z), Some(10));
    assert!(c.tile(&TileId::new(0, 0, 8)).unwrap().is_placeholder);
    assert!(c.tile(&TileId::new(0, 0, 9)).is_none());

    // Placeholder search never loads anything
    c.frame(clock.tick());
    assert_eq!(c.scheduler().loader().request_count(), requests + 1);
    assert_eq!(
        c.scheduler().loader().pending_ids(),
        vec![TileId::new(0, 0, 10)]
    );
}

// =============================================================================
// Zooming Out
// =============================================================================

#[test]
fn test_zoom_out_shows_child_placeholders() {
    let mut clock = Clock::new();
    let mut c = settled_at(512.0, &mut clock);
    let child = TileId::new(0, 0, 9);
    let parent = TileId::new(0, 0, 8);

    c.update_size(256.0, 256.0);
    assert_eq!(c.active_layer().map(|l| l.z), Some(8));

    // Only the loaded child is used; its siblings were never requested
    assert!(c.tile(&child).unwrap().is_placeholder);
    assert!(c.surface().is_shown(&child));
    assert!(c.tile(&TileId::new(1, 1, 9)).is_none());

    settle(&mut c, &mut clock);
    assert!(c.surface().is_shown(&parent));
    assert!(c.tile(&child).is_none());
}

#[test]
fn test_fully_displayed_tile_needs_no_placeholder() {
    let mut clock = Clock::new();
    let mut c = settled_at(512.0, &mut clock);

    // Recompute at the same size: nothing from other levels
    c.recompute();
    assert!(c.tiles().all(|tile| tile.id().z == 9));
    assert!(c.tiles().all(|tile| !tile.is_placeholder));
}

// =============================================================================
// Cache Eviction
// =============================================================================

#[test]
fn test_eviction_while_panning() {
    let options = StreamerOptions {
        cache_limit: 2,
        ..options()
    };
    let mut c = controller(512, 512, options);
    let mut clock = Clock::new();
    let a = TileId::new(0, 0, 9);
    let b = TileId::new(1, 1, 9);
    let d = TileId::new(1, 0, 9);

    c.set_viewport(Viewport::new(200.0, 200.0));
    c.update_size(512.0, 512.0);
    settle(&mut c, &mut clock);

    c.set_viewport(Viewport::new(200.0, 200.0).with_pan(-300.0, -300.0));
    c.recompute();
    settle(&mut c, &mut clock);
    assert!(c.surface().is_shown(&b));
    assert_eq!(c.scheduler().cache().keys(), vec![a, b]);

    // Third tile evicts the oldest unused resource
    c.set_viewport(Viewport::new(200.0, 200.0).with_pan(-300.0, 0.0));
    c.recompute();
    assert!(c.scheduler().resource(&a).is_none());
    assert!(c.scheduler().resource(&b).is_some());
    assert_eq!(c.scheduler().cache().len(), 2);

    settle(&mut c, &mut clock);
    assert!(c.surface().is_shown(&d));
}

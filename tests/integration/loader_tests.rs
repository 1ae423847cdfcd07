//! Streaming real tile files through the fetching loader.

use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, Instant};

use image::{ImageFormat, Rgb, RgbImage};

use deepzoom_streamer::{
    FetchingLoader, FsFetcher, ImageDescriptor, LoadState, PyramidController, RecordingSurface,
    StreamerOptions, TileFetcher, TileId, TileType, Viewport,
};

use super::test_utils::{options, write_level};

type DiskController<F> = PyramidController<FetchingLoader<F>, RecordingSurface>;

fn disk_controller(
    root: &Path,
    width: u32,
    height: u32,
    options: StreamerOptions,
) -> DiskController<FsFetcher> {
    PyramidController::new(
        options,
        ImageDescriptor::new(width, height),
        FetchingLoader::new(FsFetcher::new(root)),
        RecordingSurface::new(),
    )
    .unwrap()
}

/// Drive frames until `done` holds, yielding to the runtime in between.
async fn run_until<F, P>(controller: &mut DiskController<F>, done: P) -> bool
where
    F: TileFetcher + 'static,
    P: Fn(&DiskController<F>) -> bool,
{
    for _ in 0..1000 {
        controller.frame(Instant::now());
        if done(controller) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    false
}

fn settled<F: TileFetcher + 'static>(c: &DiskController<F>) -> bool {
    c.is_fully_displayed() && !c.scheduler().is_running()
}

#[tokio::test]
async fn test_streams_png_tiles_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_level(dir.path(), 9, 2, 2, 256);

    let options = StreamerOptions {
        tile_url: Some("{z}/{x}_{y}.png".to_string()),
        ..options()
    };
    let mut c = disk_controller(dir.path(), 512, 512, options);
    c.set_viewport(Viewport::new(512.0, 512.0));
    c.update_size(512.0, 512.0);

    assert!(run_until(&mut c, settled).await);
    assert_eq!(c.surface().tiles_in_layer(9).len(), 4);
    assert!(c
        .surface()
        .tiles
        .values()
        .all(|shown| shown.width == 256 && shown.height == 256));
}

#[tokio::test]
async fn test_missing_tile_stays_undisplayed() {
    let dir = tempfile::tempdir().unwrap();
    write_level(dir.path(), 9, 2, 2, 256);
    std::fs::remove_file(dir.path().join("9/1_1.png")).unwrap();

    let options = StreamerOptions {
        tile_url: Some("{z}/{x}_{y}.png".to_string()),
        ..options()
    };
    let mut c = disk_controller(dir.path(), 512, 512, options);
    c.set_viewport(Viewport::new(512.0, 512.0));
    c.update_size(512.0, 512.0);

    let missing = TileId::new(1, 1, 9);
    let failed = |c: &DiskController<FsFetcher>| {
        c.stats().displayed_tiles == 3
            && c.scheduler()
                .resource(&missing)
                .is_some_and(|r| r.load_state() == LoadState::Error)
    };

    assert!(run_until(&mut c, failed).await);
    assert!(!c.is_fully_displayed());
    assert!(!c.surface().is_shown(&missing));
    assert!(!c.scheduler().is_cached(&missing));
}

#[tokio::test]
async fn test_streams_zoomify_jpeg_tiles() {
    let dir = tempfile::tempdir().unwrap();

    // 512x512 @ 256: level 0 is one tile, level 1 is 2x2; all in TileGroup0
    let group = dir.path().join("TileGroup0");
    std::fs::create_dir_all(&group).unwrap();
    let jpeg = encode_jpeg(256, 256);
    std::fs::write(group.join("0-0-0.jpg"), &jpeg).unwrap();
    for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        std::fs::write(group.join(format!("1-{}-{}.jpg", x, y)), &jpeg).unwrap();
    }

    let options = StreamerOptions {
        tile_url: Some("TileGroup{group}/{z}-{x}-{y}.jpg".to_string()),
        tile_type: TileType::Zoomify,
        ..options()
    };
    let mut c = disk_controller(dir.path(), 512, 512, options);
    assert_eq!(c.layer_scales(), vec![0.5, 1.0]);

    c.set_viewport(Viewport::new(512.0, 512.0));
    c.update_size(512.0, 512.0);

    assert!(run_until(&mut c, settled).await);
    assert_eq!(c.active_layer_scale(), Some(1.0));
    assert_eq!(c.surface().tiles_in_layer(1).len(), 4);
}

fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 90, 160]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

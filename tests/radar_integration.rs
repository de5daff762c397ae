/*
 *  tests/radar_integration.rs
 *
 *  Integration tests for the radar panels, tiles served from memory
 *
 *  LyMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 */

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lyradar::frame::{Frame, TimeSlot};
use lyradar::frame_cache::{CacheState, FrameCache, LayerSource};
use lyradar::playback::Playback;
use lyradar::projection::{from_pixel, GeoPoint, PixelPoint};
use lyradar::radar::{PanelSettings, RadarLayers, RadarPanel};
use lyradar::sink::FrameSink;
use lyradar::tilegrid::{TileGrid, Viewport};
use lyradar::tiles::{ImageSource, TileError, TileUrl};
use tiny_skia::{Color, Pixmap};
use tokio::sync::watch;

const T: i64 = 1_700_000_400;

/// Green tiles for everything except URLs containing `missing`.
struct MemoryTiles {
    tile: Vec<u8>,
    missing: Option<String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTiles {
    fn new(missing: Option<&str>) -> Self {
        let mut p = Pixmap::new(256, 256).unwrap();
        p.fill(Color::from_rgba8(0, 200, 0, 255));
        Self {
            tile: p.encode_png().unwrap(),
            missing: missing.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ImageSource for MemoryTiles {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
        self.requests.lock().unwrap().push(url.to_string());
        match &self.missing {
            Some(m) if url.contains(m.as_str()) => Err(TileError::Status(404)),
            _ => Ok(self.tile.clone()),
        }
    }
}

#[derive(Clone, Default)]
struct CountingSink {
    frames: Arc<Mutex<Vec<TimeSlot>>>,
}

impl FrameSink for CountingSink {
    fn show_base(&mut self, _base: &Pixmap, _overlay: Option<&Pixmap>) {}
    fn show_frame(&mut self, frame: &Arc<Frame>) {
        self.frames.lock().unwrap().push(frame.slot);
    }
}

/// 300x275 at zoom 7 centred on the corner shared by tiles (69..70, 44..45).
fn corner_viewport() -> Viewport {
    let center = from_pixel(PixelPoint { x: 70.0 * 256.0, y: 45.0 * 256.0 }, 7);
    Viewport::new(300, 275, center, 7).unwrap()
}

#[tokio::test]
async fn test_grid_fetch_composite_cache_and_play() {
    let viewport = corner_viewport();
    let grid = TileGrid::resolve(&viewport);
    assert_eq!(grid.len(), 4);

    // top-right tile of the 2x2 grid never arrives
    let source = Arc::new(MemoryTiles::new(Some("/7/70/44/")));
    let layers = RadarLayers::new(&viewport, Arc::clone(&source), TileUrl::default(), "rainviewer.com").unwrap();

    let now = TimeSlot::floor(T);
    let mut cache = FrameCache::new(5);
    for _ in 0..5 {
        assert!(cache.ensure_slot(now, &layers).await.is_some());
    }
    assert_eq!(cache.state(), CacheState::Steady);
    assert_eq!(source.requests.lock().unwrap().len(), 20);
    assert_eq!(
        cache.slots().iter().map(|s| s.unix()).collect::<Vec<_>>(),
        vec![T - 2400, T - 1800, T - 1200, T - 600, T]
    );

    let newest = cache.from_newest(0).unwrap();
    assert_eq!(newest.absent_tiles, 1);
    assert_eq!((newest.image.width(), newest.image.height()), (300, 275));
    // viewport centre sits on the shared corner: NW quadrant present, NE blank
    assert_eq!(newest.image.pixel(100, 100).unwrap().green(), 200);
    assert_eq!(newest.image.pixel(200, 100).unwrap().alpha(), 0);
    assert_eq!(newest.image.pixel(200, 200).unwrap().green(), 200);

    let mut playback = Playback::new(5);
    let order: Vec<_> = (0..8).map(|_| playback.tick(cache.len()).unwrap()).collect();
    assert_eq!(order, vec![0, 0, 0, 0, 0, 1, 2, 3]);
    assert_eq!(cache.from_newest(order[5]).unwrap().slot.unix(), T - 600);
}

#[tokio::test]
async fn test_layer_urls_follow_template() {
    let viewport = Viewport::new(256, 256, GeoPoint::new(0.0, 0.0), 1).unwrap();
    let source = Arc::new(MemoryTiles::new(None));
    let layers = RadarLayers::new(&viewport, Arc::clone(&source), TileUrl::default(), "").unwrap();
    let frame = layers.layer(TimeSlot::floor(T)).await;
    assert_eq!(frame.absent_tiles, 0);
    let requests = source.requests.lock().unwrap();
    assert!(requests.iter().all(|u| u.starts_with("https://tilecache.rainviewer.com/v2/radar/1700000400/256/1/")));
    assert!(requests.iter().all(|u| u.ends_with("/6/1_1.png")));
}

static NOW: AtomicI64 = AtomicI64::new(T);

fn test_clock() -> TimeSlot {
    TimeSlot::floor(NOW.load(Ordering::SeqCst))
}

#[tokio::test]
async fn test_panel_stop_restart_and_stale_rebuild() {
    let mut settings = PanelSettings::new("integration", corner_viewport());
    settings.tick = Duration::from_millis(10);
    settings.dwell_ticks = 2;

    let sink = CountingSink::default();
    let source = Arc::new(MemoryTiles::new(None));
    let panel = RadarPanel::new(settings, source, Box::new(sink.clone())).unwrap().with_clock(test_clock);

    let handle = panel.start();
    let mut status = handle.status();
    let steady = tokio::time::timeout(
        Duration::from_secs(10),
        status.wait_for(|s| s.state == CacheState::Steady && s.slot.is_some()),
    )
    .await
    .is_ok_and(|r| r.is_ok());
    assert!(steady);

    let panel = handle.stop().await.unwrap();
    assert_eq!(panel.cache().len(), 5);
    let shown_before = sink.frames.lock().unwrap().len();
    assert!(shown_before > 0);

    // two hours pass while stopped: every cached frame is now stale
    let later = NOW.fetch_add(12 * 600, Ordering::SeqCst) + 12 * 600;
    let later = TimeSlot::floor(later);

    let handle = panel.start();
    handle.refresh().await;
    let mut status = handle.status();
    let rebuilt = tokio::time::timeout(
        Duration::from_secs(10),
        status.wait_for(|s| s.state == CacheState::Steady && s.slot.is_some_and(|slot| slot >= later.offset(-4))),
    )
    .await
    .is_ok_and(|r| r.is_ok());
    assert!(rebuilt);

    let panel = handle.stop().await.unwrap();
    assert_eq!(panel.cache().slots(), (0..5).rev().map(|i| later.offset(-i)).collect::<Vec<_>>());
    assert!(sink.frames.lock().unwrap().len() > shown_before);
}

/// Green tiles that are held back until the gate opens.
struct GatedTiles {
    tile: Vec<u8>,
    gate: watch::Receiver<bool>,
    requests: Mutex<Vec<String>>,
}

impl GatedTiles {
    fn new() -> (Self, watch::Sender<bool>) {
        let (open_tx, gate) = watch::channel(false);
        let tiles = Self {
            tile: MemoryTiles::new(None).tile,
            gate,
            requests: Mutex::new(Vec::new()),
        };
        (tiles, open_tx)
    }
}

impl ImageSource for GatedTiles {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
        self.requests.lock().unwrap().push(url.to_string());
        let mut gate = self.gate.clone();
        let _ = gate.wait_for(|open| *open).await;
        Ok(self.tile.clone())
    }
}

fn single_slot_settings(name: &str) -> PanelSettings {
    let mut settings = PanelSettings::new(name, corner_viewport());
    settings.tick = Duration::from_millis(10);
    settings.span_slots = 1;
    settings.max_layer_fetches = 1;
    settings
}

fn fixed_clock() -> TimeSlot {
    TimeSlot::floor(T)
}

async fn wait_status(
    status: &mut watch::Receiver<lyradar::RadarStatus>,
    f: impl FnMut(&lyradar::RadarStatus) -> bool,
) -> bool {
    tokio::time::timeout(Duration::from_secs(10), status.wait_for(f))
        .await
        .is_ok_and(|r| r.is_ok())
}

#[tokio::test]
async fn test_layer_in_flight_at_stop_lands_after_restart() {
    let (tiles, open) = GatedTiles::new();
    let source = Arc::new(tiles);
    let panel = RadarPanel::new(single_slot_settings("gated"), Arc::clone(&source), Box::new(CountingSink::default()))
        .unwrap()
        .with_clock(fixed_clock);

    let handle = panel.start();
    let mut status = handle.status();
    assert!(wait_status(&mut status, |s| s.in_flight == 1).await);

    let panel = handle.stop().await.unwrap();
    assert!(panel.cache().is_empty());
    assert_eq!(panel.status().in_flight, 1);

    // the fetch finishes while the panel is stopped
    open.send_replace(true);

    let handle = panel.start();
    let mut status = handle.status();
    assert!(wait_status(&mut status, |s| s.frames == 1 && s.in_flight == 0).await);

    let panel = handle.stop().await.unwrap();
    assert_eq!(panel.cache().slots(), vec![fixed_clock()]);
    assert_eq!(panel.status().in_flight, 0);
    assert_eq!(panel.status().state, CacheState::Steady);
    // the layer was fetched once, not again after the restart
    assert_eq!(source.requests.lock().unwrap().len(), 4);
}

static EVICT_NOW: AtomicI64 = AtomicI64::new(T);

fn evict_clock() -> TimeSlot {
    TimeSlot::floor(EVICT_NOW.load(Ordering::SeqCst))
}

#[tokio::test]
async fn test_layer_arriving_after_eviction_is_dropped() {
    let (tiles, open) = GatedTiles::new();
    let source = Arc::new(tiles);
    let sink = CountingSink::default();
    let panel = RadarPanel::new(single_slot_settings("evicted"), Arc::clone(&source), Box::new(sink.clone()))
        .unwrap()
        .with_clock(evict_clock);
    let first = evict_clock();

    let handle = panel.start();
    let mut status = handle.status();
    assert!(wait_status(&mut status, |s| s.in_flight == 1).await);
    let panel = handle.stop().await.unwrap();

    // the window moves on before the slow layer comes back
    EVICT_NOW.fetch_add(3 * 600, Ordering::SeqCst);
    let later = evict_clock();

    let handle = panel.start();
    handle.refresh().await;
    let mut status = handle.status();
    assert!(wait_status(&mut status, |s| s.now == Some(later)).await);

    open.send_replace(true);
    assert!(wait_status(&mut status, |s| s.state == CacheState::Steady && s.in_flight == 0).await);

    let panel = handle.stop().await.unwrap();
    assert_eq!(panel.cache().slots(), vec![later]);
    assert!(!sink.frames.lock().unwrap().contains(&first));
    // the stale layer and its replacement
    assert_eq!(source.requests.lock().unwrap().len(), 8);
}

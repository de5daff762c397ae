/*
 *  radar.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Radar panel - owns the frame cache and playback, runs the tick loop
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{Color, Pixmap};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::basemap::{background, build_overlay, fetch_base, BaseMapProvider, Marker};
use crate::compositor::{Compositor, DEFAULT_ATTRIBUTION};
use crate::error::RadarError;
use crate::frame::{Frame, TimeSlot};
use crate::frame_cache::{CacheState, FrameCache, LayerSource, DEFAULT_SPAN_SLOTS};
use crate::pacer::RefreshPacer;
use crate::playback::{Playback, DEFAULT_DWELL_TICKS};
use crate::sink::FrameSink;
use crate::tilegrid::{TileGrid, Viewport};
use crate::tiles::{ImageSource, TileError, TileFetcher, TileUrl};

/// How often the loop asks the pacer whether a refresh is due.
const REFRESH_CHECK: Duration = Duration::from_secs(1);

/// Everything one panel needs, defaults already applied.
#[derive(Debug, Clone)]
pub struct PanelSettings {
    pub name: String,
    pub viewport: Viewport,
    pub tile_url: TileUrl,
    pub basemap: BaseMapProvider,
    pub markers: Vec<Marker>,
    pub dim: Option<Color>,
    pub attribution: String,
    pub span_slots: u32,
    pub refresh: Duration,
    pub tick: Duration,
    pub dwell_ticks: u32,
    pub max_layer_fetches: usize,
    pub first_refresh: Duration,
}

impl PanelSettings {
    pub fn new(name: &str, viewport: Viewport) -> Self {
        Self {
            name: name.to_string(),
            viewport,
            tile_url: TileUrl::default(),
            basemap: BaseMapProvider::None,
            markers: Vec::new(),
            dim: None,
            attribution: DEFAULT_ATTRIBUTION.to_string(),
            span_slots: DEFAULT_SPAN_SLOTS,
            refresh: Duration::from_secs(600),
            tick: Duration::from_millis(200),
            dwell_ticks: DEFAULT_DWELL_TICKS,
            max_layer_fetches: 2,
            first_refresh: Duration::ZERO,
        }
    }
}

/// Fetch + composite for one panel's grid.
pub struct RadarLayers<S: ImageSource> {
    grid: TileGrid,
    fetcher: TileFetcher<S>,
    compositor: Compositor,
}

impl<S: ImageSource> RadarLayers<S> {
    pub fn new(viewport: &Viewport, source: Arc<S>, tile_url: TileUrl, attribution: &str) -> Result<Self, RadarError> {
        let grid = TileGrid::resolve(viewport);
        let compositor = Compositor::new(&grid, attribution)?;
        debug!(
            "radar grid {}x{} tiles at zoom {}, crop {:?}",
            grid.tiles_wide(),
            grid.tiles_high(),
            viewport.zoom(),
            grid.crop_offset()
        );
        Ok(Self { grid, fetcher: TileFetcher::new(source, tile_url), compositor })
    }

    pub fn grid(&self) -> &TileGrid { &self.grid }
    pub fn compositor(&self) -> &Compositor { &self.compositor }
}

impl<S: ImageSource> LayerSource for RadarLayers<S> {
    async fn layer(&self, slot: TimeSlot) -> Frame {
        let layer = self.fetcher.fetch_layer(&self.grid, slot).await;
        self.compositor.composite(&self.grid, &layer)
    }
}

/// Snapshot published after every change the panel makes.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarStatus {
    pub name: String,
    /// Newest slot the window ends at, from the last refresh.
    pub now: Option<TimeSlot>,
    /// Slot currently on screen.
    pub slot: Option<TimeSlot>,
    pub caption: Option<String>,
    /// Nothing left to show, the cache is waiting on a rebuild.
    pub is_stale: bool,
    pub frames: usize,
    pub state: CacheState,
    pub in_flight: usize,
}

#[derive(Debug)]
pub enum RadarCmd {
    /// Refresh now instead of waiting for the pacer.
    Refresh,
    Shutdown,
}

pub struct RadarPanel<S: ImageSource> {
    settings: PanelSettings,
    source: Arc<S>,
    layers: Arc<RadarLayers<S>>,
    cache: FrameCache,
    playback: Playback,
    pacer: RefreshPacer,
    in_flight: HashSet<TimeSlot>,
    now_slot: Option<TimeSlot>,
    shown: Option<TimeSlot>,
    overlay: Option<Pixmap>,
    base_shown: bool,
    clock: fn() -> TimeSlot,
    layer_tx: Sender<Frame>,
    layer_rx: Receiver<Frame>,
    base_tx: Sender<Result<Pixmap, TileError>>,
    base_rx: Receiver<Result<Pixmap, TileError>>,
    status_tx: watch::Sender<RadarStatus>,
    sink: Box<dyn FrameSink>,
}

impl<S: ImageSource> RadarPanel<S> {
    pub fn new(settings: PanelSettings, source: Arc<S>, sink: Box<dyn FrameSink>) -> Result<Self, RadarError> {
        let layers = RadarLayers::new(&settings.viewport, Arc::clone(&source), settings.tile_url.clone(), &settings.attribution)?;
        let overlay = if settings.markers.is_empty() && settings.dim.is_none() {
            None
        } else {
            build_overlay(&settings.viewport, &settings.markers, settings.dim)
        };

        let (layer_tx, layer_rx) = mpsc::channel::<Frame>(16);
        let (base_tx, base_rx) = mpsc::channel::<Result<Pixmap, TileError>>(2);
        let cache = FrameCache::new(settings.span_slots);
        let (status_tx, _) = watch::channel(RadarStatus {
            name: settings.name.clone(),
            now: None,
            slot: None,
            caption: None,
            is_stale: true,
            frames: 0,
            state: CacheState::Empty,
            in_flight: 0,
        });

        Ok(Self {
            playback: Playback::new(settings.dwell_ticks),
            pacer: RefreshPacer::new(settings.refresh, settings.first_refresh),
            layers: Arc::new(layers),
            source,
            cache,
            in_flight: HashSet::new(),
            now_slot: None,
            shown: None,
            overlay,
            base_shown: false,
            clock: TimeSlot::now,
            layer_tx,
            layer_rx,
            base_tx,
            base_rx,
            status_tx,
            sink,
            settings,
        })
    }

    /// Replace the wall clock, e.g. to pin "now" to a fixed slot.
    pub fn with_clock(mut self, clock: fn() -> TimeSlot) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str { &self.settings.name }
    pub fn cache(&self) -> &FrameCache { &self.cache }

    pub fn subscribe(&self) -> watch::Receiver<RadarStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> RadarStatus {
        RadarStatus {
            name: self.settings.name.clone(),
            now: self.now_slot,
            slot: self.shown,
            caption: self.shown.map(|s| self.layers.compositor().caption(s)),
            is_stale: self.cache.is_empty(),
            frames: self.cache.len(),
            state: self.cache.state(),
            in_flight: self.in_flight.len(),
        }
    }

    /// Spawn the panel loop. The panel comes back out of the handle on stop
    /// with its cache intact, so it can be started again.
    pub fn start(self) -> RadarHandle<S> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<RadarCmd>(8);
        let status = self.subscribe();
        let handle = tokio::spawn(self.run(cmd_rx));
        RadarHandle { cmd_tx, status, handle }
    }

    async fn run(mut self, mut cmd_rx: Receiver<RadarCmd>) -> Self {
        info!("radar panel {} running, {}s refresh", self.settings.name, self.settings.refresh.as_secs());
        if !self.base_shown {
            self.show_placeholder_base();
        }

        let mut play = time::interval(self.settings.tick);
        play.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut refresh = time::interval(REFRESH_CHECK.min(self.settings.tick * 5));
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = refresh.tick() => self.on_refresh_check(Instant::now().into_std()),
                _ = play.tick() => self.on_play_tick(),
                Some(frame) = self.layer_rx.recv() => self.on_layer(frame),
                Some(base) = self.base_rx.recv() => self.on_base(base),
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(RadarCmd::Refresh) => {
                            debug!("radar panel {}: refresh requested", self.settings.name);
                            self.pacer.expire(Instant::now().into_std());
                        }
                        Some(RadarCmd::Shutdown) | None => {
                            info!("radar panel {} stopped", self.settings.name);
                            break;
                        }
                    }
                }
            }
        }
        self
    }

    fn on_refresh_check(&mut self, now: std::time::Instant) {
        if !self.pacer.due(now) {
            return;
        }
        let slot = (self.clock)();
        info!("radar panel {} refresh, now {} ({})", self.settings.name, slot, slot.hhmm());
        self.now_slot = Some(slot);
        self.refresh_base();
        self.fill();
        self.publish();
    }

    /// One backfill step: drop what fell out of the window and start a fetch
    /// for the oldest missing slot, if the in-flight cap allows.
    fn fill(&mut self) {
        let Some(now) = self.now_slot else { return };
        self.cache.evict(now);
        if self.cache.take_rebuilt() {
            self.playback.reset();
            self.shown = None;
        }
        if self.in_flight.len() >= self.settings.max_layer_fetches {
            return;
        }
        let Some(slot) = self.cache.next_wanted(now, &self.in_flight) else { return };

        self.in_flight.insert(slot);
        debug!("radar panel {}: fetching layer {}", self.settings.name, slot);
        let layers = Arc::clone(&self.layers);
        let tx = self.layer_tx.clone();
        tokio::spawn(async move {
            let frame = layers.layer(slot).await;
            // the panel owns the receiver, it only goes away with the panel
            let _ = tx.send(frame).await;
        });
    }

    fn on_play_tick(&mut self) {
        self.fill();
        let before = self.shown;
        match self.playback.tick(self.cache.len()) {
            Some(index) => {
                if let Some(frame) = self.cache.from_newest(index).cloned() {
                    if self.shown != Some(frame.slot) {
                        self.sink.show_frame(&frame);
                        self.shown = Some(frame.slot);
                    }
                }
            }
            None => self.shown = None,
        }
        if self.shown != before {
            self.publish();
        }
    }

    fn on_layer(&mut self, frame: Frame) {
        let slot = frame.slot;
        self.in_flight.remove(&slot);
        let Some(now) = self.now_slot else { return };
        if self.cache.insert(frame, now) {
            info!(
                "radar panel {}: cached {} ({}/{} frames)",
                self.settings.name,
                slot.hhmm(),
                self.cache.len(),
                self.cache.span()
            );
        }
        self.publish();
    }

    fn refresh_base(&mut self) {
        let Some(url) = self.settings.basemap.url(&self.settings.viewport) else { return };
        let source = Arc::clone(&self.source);
        let viewport = self.settings.viewport;
        let tx = self.base_tx.clone();
        tokio::spawn(async move {
            let base = fetch_base(source.as_ref(), &url, &viewport).await;
            let _ = tx.send(base).await;
        });
    }

    fn on_base(&mut self, base: Result<Pixmap, TileError>) {
        match base {
            Ok(base) => {
                self.sink.show_base(&base, self.overlay.as_ref());
                self.base_shown = true;
            }
            Err(e) => {
                warn!("radar panel {}: base map unavailable: {}", self.settings.name, e);
                if !self.base_shown {
                    self.show_placeholder_base();
                }
            }
        }
    }

    fn show_placeholder_base(&mut self) {
        let (w, h) = (self.settings.viewport.width_px(), self.settings.viewport.height_px());
        match Pixmap::new(w, h) {
            Some(mut grey) => {
                grey.fill(background());
                self.sink.show_base(&grey, self.overlay.as_ref());
            }
            None => error!("radar panel {}: cannot allocate {}x{} base", self.settings.name, w, h),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

/// A running panel.
pub struct RadarHandle<S: ImageSource> {
    cmd_tx: Sender<RadarCmd>,
    status: watch::Receiver<RadarStatus>,
    handle: JoinHandle<RadarPanel<S>>,
}

impl<S: ImageSource> RadarHandle<S> {
    pub fn status(&self) -> watch::Receiver<RadarStatus> {
        self.status.clone()
    }

    pub async fn refresh(&self) {
        let _ = self.cmd_tx.send(RadarCmd::Refresh).await;
    }

    /// Stop ticking and hand the panel back. Layer fetches already running
    /// keep going and are picked up if the panel is started again.
    pub async fn stop(self) -> Option<RadarPanel<S>> {
        let _ = self.cmd_tx.send(RadarCmd::Shutdown).await;
        match self.handle.await {
            Ok(panel) => Some(panel),
            Err(e) => {
                error!("radar panel task failed: {e}");
                None
            }
        }
    }
}

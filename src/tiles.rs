/*
 *  tiles.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Radar tile fetching: one time slot, every tile, in grid order
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
use log::{debug, info, warn};
use reqwest::{header, Client};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiny_skia::Pixmap;

use crate::frame::TimeSlot;
use crate::projection::{TileIndex, TILE_SIZE};
use crate::tilegrid::TileGrid;

pub const DEFAULT_TILE_BASE: &str = "https://tilecache.rainviewer.com/v2/radar";

/// Why a single tile (or the base map) came back empty.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("image decode error: {0}")]
    Decode(String),
    #[error("unexpected tile size {width}x{height}")]
    Size { width: u32, height: u32 },
}

/// Raw byte transport for remote images.
pub trait ImageSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, TileError>> + Send;
}

/// reqwest backed source, shared by the tile and base map fetches.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("image/png,image/*"));
        headers.insert("Connection", header::HeaderValue::from_static("close"));

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(1500))
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TileError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

pub fn decode_png(bytes: &[u8]) -> Result<Pixmap, TileError> {
    Pixmap::decode_png(bytes).map_err(|e| TileError::Decode(e.to_string()))
}

/// Tile URL template, `{base}/{slot}/256/{zoom}/{x}/{y}/{color}/{smooth}_{snow}.png`,
/// or the older `{base}/{slot}/256/{zoom}/{x}/{y}.png?color={color}` form.
#[derive(Debug, Clone, PartialEq)]
pub struct TileUrl {
    pub base: String,
    pub color: u8,
    pub smooth: u8,
    pub snow: u8,
    pub legacy_color: bool,
}

impl Default for TileUrl {
    fn default() -> Self {
        Self {
            base: DEFAULT_TILE_BASE.to_string(),
            color: 6,
            smooth: 1,
            snow: 1,
            legacy_color: false,
        }
    }
}

impl TileUrl {
    pub fn url(&self, slot: TimeSlot, tile: &TileIndex) -> String {
        let base = self.base.trim_end_matches('/');
        let head = format!("{}/{}/{}/{}/{}/{}", base, slot, TILE_SIZE, tile.zoom, tile.wrapped_x(), tile.y);
        if self.legacy_color {
            format!("{}.png?color={}", head, self.color)
        } else {
            format!("{}/{}/{}_{}.png", head, self.color, self.smooth, self.snow)
        }
    }

    /// Every URL for a layer, in grid order. Cheap, so it is rebuilt per
    /// fetch rather than kept around.
    pub fn layer_urls(&self, grid: &TileGrid, slot: TimeSlot) -> Vec<String> {
        grid.tiles().iter().map(|t| self.url(slot, t)).collect()
    }
}

/// Result of fetching one time slot: a cell per grid position.
pub struct Layer {
    pub slot: TimeSlot,
    pub tiles: Vec<(TileIndex, Option<Pixmap>)>,
}

impl Layer {
    pub fn absent(&self) -> usize {
        self.tiles.iter().filter(|(_, t)| t.is_none()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.absent() == 0
    }
}

pub struct TileFetcher<S: ImageSource> {
    source: Arc<S>,
    template: TileUrl,
}

impl<S: ImageSource> TileFetcher<S> {
    pub fn new(source: Arc<S>, template: TileUrl) -> Self {
        Self { source, template }
    }

    pub fn template(&self) -> &TileUrl { &self.template }

    /// Fetch every tile of `slot`, strictly one at a time and in grid order.
    /// A tile that fails for any reason is left absent and not retried.
    pub async fn fetch_layer(&self, grid: &TileGrid, slot: TimeSlot) -> Layer {
        let urls = self.template.layer_urls(grid, slot);
        let mut tiles = Vec::with_capacity(urls.len());

        for (tile, url) in grid.tiles().iter().zip(urls.iter()) {
            debug!("tile {} <- {}", tile, url);
            let image = match self.fetch_tile(url).await {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("radar tile {} at {} absent: {}", tile, slot, e);
                    None
                }
            };
            tiles.push((*tile, image));
        }

        let layer = Layer { slot, tiles };
        let absent = layer.absent();
        if absent > 0 {
            info!("radar layer {} incomplete: {} of {} tiles absent", slot, absent, layer.tiles.len());
        } else {
            debug!("radar layer {} complete, {} tiles", slot, layer.tiles.len());
        }
        layer
    }

    async fn fetch_tile(&self, url: &str) -> Result<Pixmap, TileError> {
        let bytes = self.source.fetch(url).await?;
        let tile = decode_png(&bytes)?;
        if tile.width() != TILE_SIZE || tile.height() != TILE_SIZE {
            return Err(TileError::Size { width: tile.width(), height: tile.height() });
        }
        Ok(tile)
    }
}

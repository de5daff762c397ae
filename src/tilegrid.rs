/*
 *  tilegrid.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	TODO:
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
use log::debug;

use crate::projection::{
    from_pixel, to_pixel, GeoPoint, PixelPoint, ProjectionError, TileIndex, MAX_ZOOM, TILE_SIZE,
};

const PIXEL_SNAP: f64 = 1e6;
const LAST_PIXEL_INSET: f64 = 1e-3;

/// Fixed geometry of one radar panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    width_px: u32,
    height_px: u32,
    center: GeoPoint,
    zoom: u8,
    center_px: PixelPoint,
}

impl Viewport {
    /// Validates size and centre up front so a bad latitude is a
    /// configuration error and never a runtime one.
    pub fn new(width_px: u32, height_px: u32, center: GeoPoint, zoom: u8) -> Result<Self, ProjectionError> {
        if width_px == 0 || height_px == 0 {
            return Err(ProjectionError::EmptyViewport(width_px, height_px));
        }
        if zoom > MAX_ZOOM {
            return Err(ProjectionError::ZoomTooDeep(zoom));
        }
        let center_px = to_pixel(center, zoom)?;
        Ok(Self { width_px, height_px, center, zoom, center_px })
    }

    pub fn width_px(&self) -> u32 { self.width_px }
    pub fn height_px(&self) -> u32 { self.height_px }
    pub fn center(&self) -> GeoPoint { self.center }
    pub fn zoom(&self) -> u8 { self.zoom }

    /// World pixel of the north-west corner, snapped so projection noise
    /// on a tile boundary does not floor into the previous tile.
    fn north_west_px(&self) -> PixelPoint {
        let snap = |v: f64| (v * PIXEL_SNAP).round() / PIXEL_SNAP;
        PixelPoint {
            x: snap(self.center_px.x - self.width_px as f64 / 2.0),
            y: snap(self.center_px.y - self.height_px as f64 / 2.0),
        }
    }

    /// Where `point` lands inside this viewport, in viewport pixels.
    /// Points off the panel give coordinates outside `0..width`/`0..height`.
    pub fn point_to_viewport(&self, point: GeoPoint) -> Result<(f64, f64), ProjectionError> {
        let p = to_pixel(point, self.zoom)?;
        let nw = self.north_west_px();
        Ok((p.x - nw.x, p.y - nw.y))
    }

    /// Geographic extent of the panel.
    pub fn corners(&self) -> Corners {
        let nw = self.north_west_px();
        let se = PixelPoint {
            x: nw.x + self.width_px as f64,
            y: nw.y + self.height_px as f64,
        };
        let north_west = from_pixel(nw, self.zoom);
        let south_east = from_pixel(se, self.zoom);
        Corners {
            north: north_west.lat,
            south: south_east.lat,
            east: south_east.lng,
            west: north_west.lng,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Corners {
    pub fn north_west(&self) -> GeoPoint { GeoPoint::new(self.north, self.west) }
    pub fn north_east(&self) -> GeoPoint { GeoPoint::new(self.north, self.east) }
    pub fn south_east(&self) -> GeoPoint { GeoPoint::new(self.south, self.east) }
    pub fn south_west(&self) -> GeoPoint { GeoPoint::new(self.south, self.west) }
}

/// The rectangle of tiles under a viewport, row-major, plus the crop that
/// trims the stitched canvas back to the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    tiles: Vec<TileIndex>,
    tiles_wide: u32,
    tiles_high: u32,
    crop_offset_x: u32,
    crop_offset_y: u32,
    viewport: Viewport,
}

impl TileGrid {
    /// Infallible: the viewport was validated when it was built.
    pub fn resolve(viewport: &Viewport) -> Self {
        let zoom = viewport.zoom;

        // Corner tiles come from the corner world pixels rather than a second
        // trip through to_pixel: near the poles a corner may sit past the
        // projectable latitude while the centre is still valid.
        // The panel covers [nw, nw + size), so the far corner is the last
        // pixel inside it and an edge on a tile boundary adds no tiles.
        let nw_px = viewport.north_west_px();
        let se_px = PixelPoint {
            x: nw_px.x + viewport.width_px as f64 - LAST_PIXEL_INSET,
            y: nw_px.y + viewport.height_px as f64 - LAST_PIXEL_INSET,
        };
        let nw = TileIndex::containing(nw_px, zoom);
        let ne = TileIndex::containing(PixelPoint { x: se_px.x, y: nw_px.y }, zoom);
        let se = TileIndex::containing(se_px, zoom);
        let sw = TileIndex::containing(PixelPoint { x: nw_px.x, y: se_px.y }, zoom);

        let min_x = nw.x.min(sw.x);
        let max_x = ne.x.max(se.x);
        let min_y = nw.y.min(ne.y);
        let max_y = sw.y.max(se.y);

        let mut tiles = Vec::with_capacity(((max_x - min_x + 1) * (max_y - min_y + 1)) as usize);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                tiles.push(TileIndex { zoom, x, y });
            }
        }

        let size = TILE_SIZE as f64;
        let grid = Self {
            tiles,
            tiles_wide: (max_x - min_x + 1) as u32,
            tiles_high: (max_y - min_y + 1) as u32,
            crop_offset_x: nw_px.x.rem_euclid(size).floor() as u32,
            crop_offset_y: nw_px.y.rem_euclid(size).floor() as u32,
            viewport: *viewport,
        };
        debug!(
            "tile grid z{} {}x{} tiles from {}, crop {},{} (nw px {:.3},{:.3})",
            zoom, grid.tiles_wide, grid.tiles_high, nw, grid.crop_offset_x, grid.crop_offset_y,
            nw_px.x, nw_px.y
        );
        grid
    }

    pub fn tiles(&self) -> &[TileIndex] { &self.tiles }
    pub fn len(&self) -> usize { self.tiles.len() }
    pub fn is_empty(&self) -> bool { self.tiles.is_empty() }
    pub fn tiles_wide(&self) -> u32 { self.tiles_wide }
    pub fn tiles_high(&self) -> u32 { self.tiles_high }
    pub fn crop_offset(&self) -> (u32, u32) { (self.crop_offset_x, self.crop_offset_y) }
    pub fn total_width(&self) -> u32 { self.tiles_wide * TILE_SIZE }
    pub fn total_height(&self) -> u32 { self.tiles_high * TILE_SIZE }
    pub fn viewport(&self) -> &Viewport { &self.viewport }

    /// Canvas position of the tile at row-major `position`.
    pub fn cell_origin(&self, position: usize) -> (u32, u32) {
        let col = position as u32 % self.tiles_wide;
        let row = position as u32 / self.tiles_wide;
        (col * TILE_SIZE, row * TILE_SIZE)
    }
}

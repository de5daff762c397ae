/*
 *  projection.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Spherical (web) Mercator helpers for the radar panels
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
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

/// Edge of a map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Projectable latitude limit (exclusive), degrees.
pub const MAX_LATITUDE: f64 = 85.05;

/// Deepest zoom any of the tile providers serve.
pub const MAX_ZOOM: u8 = 22;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("latitude {0} is outside the projectable range (-85.05..85.05)")]
    OutOfRange(f64),
    #[error("zoom level {0} is deeper than 22")]
    ZoomTooDeep(u8),
    #[error("viewport {0}x{1} has no area")]
    EmptyViewport(u32, u32),
}

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_projectable(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && self.lat.abs() < MAX_LATITUDE
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lng)
    }
}

/// Continuous "world pixel" coordinate at some zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

/// Integer tile address in the XYZ tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
    pub zoom: u8,
    pub x: i32,
    pub y: i32,
}

impl TileIndex {
    /// Tile that holds the given world pixel.
    pub fn containing(pixel: PixelPoint, zoom: u8) -> Self {
        let size = TILE_SIZE as f64;
        Self {
            zoom,
            x: (pixel.x / size).floor() as i32,
            y: (pixel.y / size).floor() as i32,
        }
    }

    /// Column wrapped into `0..2^zoom`, so grids that straddle the
    /// antimeridian still address real tiles.
    pub fn wrapped_x(&self) -> i32 {
        self.x.rem_euclid(1i32 << self.zoom.min(30))
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Width (and height) of the whole world in pixels at `zoom`.
#[inline]
pub fn world_size(zoom: u8) -> f64 {
    TILE_SIZE as f64 * 2f64.powi(zoom as i32)
}

/// Forward transform: longitude is linear, latitude goes through the
/// inverse Gudermannian.
pub fn to_pixel(point: GeoPoint, zoom: u8) -> Result<PixelPoint, ProjectionError> {
    if zoom > MAX_ZOOM {
        return Err(ProjectionError::ZoomTooDeep(zoom));
    }
    if !point.is_projectable() {
        return Err(ProjectionError::OutOfRange(point.lat));
    }
    let world = world_size(zoom);
    let phi = point.lat.to_radians();
    let x = (point.lng + 180.0) / 360.0 * world;
    let y = (0.5 - (PI / 4.0 + phi / 2.0).tan().ln() / (2.0 * PI)) * world;
    Ok(PixelPoint { x, y })
}

/// Inverse transform. Pixels outside the world give longitudes outside
/// ±180, which is what the grid resolver wants for wrap handling.
pub fn from_pixel(pixel: PixelPoint, zoom: u8) -> GeoPoint {
    let world = world_size(zoom);
    let lng = pixel.x / world * 360.0 - 180.0;
    let n = PI * (1.0 - 2.0 * pixel.y / world);
    GeoPoint {
        lat: n.sinh().atan().to_degrees(),
        lng,
    }
}

pub fn to_tile_index(point: GeoPoint, zoom: u8) -> Result<TileIndex, ProjectionError> {
    to_pixel(point, zoom).map(|p| TileIndex::containing(p, zoom))
}

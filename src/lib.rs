/*
 *  lib.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	LyRadar - animated precipitation radar panels
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

pub mod basemap;
pub mod compositor;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_cache;
pub mod pacer;
pub mod pixbuf;
pub mod playback;
pub mod projection;
pub mod radar;
pub mod sink;
pub mod tilegrid;
pub mod tiles;

pub use error::RadarError;
pub use frame::{Frame, TimeSlot};
pub use projection::GeoPoint;
pub use radar::{PanelSettings, RadarHandle, RadarPanel, RadarStatus};

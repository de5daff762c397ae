/*
 *  frame.rs
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
use chrono::{DateTime, Local, Utc};
use std::fmt;
use tiny_skia::Pixmap;

/// Radar layers are published every ten minutes.
pub const SLOT_SECS: i64 = 600;

/// Unix time truncated to the radar publishing quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlot(i64);

impl TimeSlot {
    pub fn floor(unix_secs: i64) -> Self {
        TimeSlot(unix_secs.div_euclid(SLOT_SECS) * SLOT_SECS)
    }

    pub fn now() -> Self {
        Self::floor(Utc::now().timestamp())
    }

    pub fn unix(&self) -> i64 { self.0 }

    /// `n` slots later (earlier when negative).
    pub fn offset(&self, n: i64) -> Self {
        TimeSlot(self.0 + n * SLOT_SECS)
    }

    pub fn next(&self) -> Self { self.offset(1) }

    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }

    pub fn to_local(&self) -> Option<DateTime<Local>> {
        self.to_utc().map(|t| t.with_timezone(&Local))
    }

    /// Wall-clock "HH:MM" in the local zone.
    pub fn hhmm(&self) -> String {
        match self.to_local() {
            Some(t) => t.format("%H:%M").to_string(),
            None => "--:--".to_string(),
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One composited radar image, already cropped to the viewport.
pub struct Frame {
    pub slot: TimeSlot,
    pub image: Pixmap,
    /// Cells that came back empty while fetching this layer.
    pub absent_tiles: usize,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("slot", &self.slot)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("absent_tiles", &self.absent_tiles)
            .finish()
    }
}

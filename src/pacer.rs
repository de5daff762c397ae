/*
 *  pacer.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Refresh pacing and start jitter for the radar panels
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
use rand::Rng;
use std::ops::Range;
use std::time::{Duration, Instant};

/// Interval gate for the slow radar refresh (base map + newest layer).
#[derive(Debug, Clone)]
pub struct RefreshPacer {
    next_deadline: Instant,
    interval: Duration,
}

// several panels started together would all hit the tile server in the
// same second, so the first refresh lands a few random seconds in
impl RefreshPacer {
    pub fn new(interval: Duration, first_after: Duration) -> Self {
        Self::starting_at(Instant::now(), interval, first_after)
    }

    pub fn starting_at(now: Instant, interval: Duration, first_after: Duration) -> Self {
        Self { next_deadline: now + first_after, interval }
    }

    pub fn interval(&self) -> Duration { self.interval }

    /// Returns true if a refresh is due; if true, it also schedules the next deadline.
    #[inline]
    pub fn due(&mut self, now: Instant) -> bool {
        if now >= self.next_deadline {
            self.next_deadline = now + self.interval;
            true
        } else {
            false
        }
    }

    /// Make the next check fire immediately.
    pub fn expire(&mut self, now: Instant) {
        self.next_deadline = now;
    }
}

/// Random start offset in whole milliseconds, drawn from `secs`.
pub fn start_jitter(secs: Range<f64>) -> Duration {
    if secs.is_empty() {
        return Duration::from_secs_f64(secs.start.max(0.0));
    }
    let mut rng = rand::rng();
    Duration::from_millis((rng.random_range(secs) * 1000.0) as u64)
}

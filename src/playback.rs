/*
 *  playback.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Radar loop playback - decides which cached frame each tick shows
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

pub const DEFAULT_DWELL_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackState {
    /// Position counted back from the newest frame.
    pub displayed_index: usize,
    pub dwell_ticks: u32,
}

/// Walks the cache newest to oldest and wraps, holding on the newest frame
/// for `dwell_threshold` ticks so "now" lingers.
#[derive(Debug, Clone)]
pub struct Playback {
    state: PlaybackState,
    dwell_threshold: u32,
}

impl Playback {
    pub fn new(dwell_threshold: u32) -> Self {
        Self {
            state: PlaybackState::default(),
            dwell_threshold: dwell_threshold.max(1),
        }
    }

    pub fn state(&self) -> PlaybackState { self.state }

    pub fn reset(&mut self) {
        if self.state != PlaybackState::default() {
            log::debug!("playback reset to newest frame");
        }
        self.state = PlaybackState::default();
    }

    /// Advance one tick over a cache holding `frames` frames. Returns the
    /// index (from newest) to show, or None when there is nothing cached.
    pub fn tick(&mut self, frames: usize) -> Option<usize> {
        if frames == 0 {
            self.reset();
            return None;
        }
        if self.state.displayed_index >= frames {
            self.state.displayed_index = 0;
        }

        let shown = self.state.displayed_index;
        if shown == 0 {
            self.state.dwell_ticks += 1;
            if self.state.dwell_ticks >= self.dwell_threshold {
                self.state.dwell_ticks = 0;
                self.state.displayed_index = 1 % frames;
            }
        } else {
            self.state.displayed_index = (shown + 1) % frames;
        }
        Some(shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_dwells_then_walks_back() {
        let mut p = Playback::new(5);
        let shown: Vec<_> = (0..13).map(|_| p.tick(3).unwrap()).collect();
        assert_eq!(shown, vec![0, 0, 0, 0, 0, 1, 2, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_empty_cache_shows_nothing() {
        let mut p = Playback::new(5);
        assert_eq!(p.tick(0), None);
        assert_eq!(p.state(), PlaybackState::default());
    }

    #[test]
    fn test_single_frame_stays_put() {
        let mut p = Playback::new(2);
        for _ in 0..6 {
            assert_eq!(p.tick(1), Some(0));
        }
    }

    #[test]
    fn test_shrinking_cache_wraps_index() {
        let mut p = Playback::new(1);
        assert_eq!(p.tick(4), Some(0));
        assert_eq!(p.tick(4), Some(1));
        assert_eq!(p.tick(4), Some(2));
        assert_eq!(p.tick(4), Some(3));
        // cache lost frames between ticks
        assert_eq!(p.tick(2), Some(0));
    }

    #[test]
    fn test_reset() {
        let mut p = Playback::new(1);
        p.tick(3);
        p.tick(3);
        assert_eq!(p.state().displayed_index, 2);
        p.reset();
        assert_eq!(p.state().displayed_index, 0);
    }
}

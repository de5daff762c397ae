/*
 *  frame_cache.rs
 *
 *  LyMonS - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Rolling window of composited radar frames
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
use log::{debug, info};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use crate::frame::{Frame, TimeSlot};

pub const DEFAULT_SPAN_SLOTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Filling,
    Steady,
}

/// Produces the composited frame for one time slot.
pub trait LayerSource: Send + Sync {
    fn layer(&self, slot: TimeSlot) -> impl Future<Output = Frame> + Send;
}

/// Frames ordered oldest to newest, unique by slot, all inside
/// `[now - (span - 1) slots, now]` for the last `now` seen.
#[derive(Debug)]
pub struct FrameCache {
    frames: Vec<Arc<Frame>>,
    span: u32,
    now: Option<TimeSlot>,
    rebuilt: bool,
}

impl FrameCache {
    pub fn new(span: u32) -> Self {
        Self {
            frames: Vec::new(),
            span: span.max(1),
            now: None,
            rebuilt: false,
        }
    }

    pub fn span(&self) -> u32 { self.span }

    /// Oldest slot the animation keeps for `now`.
    pub fn window_start(&self, now: TimeSlot) -> TimeSlot {
        now.offset(-(self.span as i64 - 1))
    }

    pub fn in_window(&self, slot: TimeSlot, now: TimeSlot) -> bool {
        slot >= self.window_start(now) && slot <= now
    }

    /// Drop everything outside the window. Losing every frame counts as a
    /// rebuild, which playback picks up through `take_rebuilt`.
    pub fn evict(&mut self, now: TimeSlot) {
        let start = self.window_start(now);
        let before = self.frames.len();
        self.frames.retain(|f| f.slot >= start && f.slot <= now);
        let evicted = before - self.frames.len();
        if evicted > 0 {
            debug!("evicted {} radar frames older than {}", evicted, start);
        }
        if before > 0 && self.frames.is_empty() {
            info!("radar cache stale, rebuilding from {}", start);
            self.rebuilt = true;
        }
        self.now = Some(now);
    }

    /// Slots in the window with no frame yet, oldest first.
    pub fn missing(&self, now: TimeSlot) -> Vec<TimeSlot> {
        let mut slot = self.window_start(now);
        let mut missing = Vec::new();
        while slot <= now {
            if !self.contains(slot) {
                missing.push(slot);
            }
            slot = slot.next();
        }
        missing
    }

    /// Oldest missing slot nobody is already fetching.
    pub fn next_wanted(&self, now: TimeSlot, in_flight: &HashSet<TimeSlot>) -> Option<TimeSlot> {
        self.missing(now).into_iter().find(|s| !in_flight.contains(s))
    }

    pub fn contains(&self, slot: TimeSlot) -> bool {
        self.frames.binary_search_by_key(&slot, |f| f.slot).is_ok()
    }

    /// Insert if the slot is still wanted: inside the window for `now` and
    /// not already cached. Late results for evicted slots are dropped.
    pub fn insert(&mut self, frame: Frame, now: TimeSlot) -> bool {
        if !self.in_window(frame.slot, now) {
            debug!("discarding radar frame {}, outside window ending {}", frame.slot, now);
            return false;
        }
        match self.frames.binary_search_by_key(&frame.slot, |f| f.slot) {
            Ok(_) => {
                debug!("discarding duplicate radar frame {}", frame.slot);
                false
            }
            Err(pos) => {
                self.frames.insert(pos, Arc::new(frame));
                true
            }
        }
    }

    /// One backfill step: evict, then fetch and composite the oldest missing
    /// slot only. Returns the slot that was filled.
    pub async fn ensure_slot<L: LayerSource>(&mut self, now: TimeSlot, layers: &L) -> Option<TimeSlot> {
        self.evict(now);
        let slot = *self.missing(now).first()?;
        let frame = layers.layer(slot).await;
        self.insert(frame, now).then_some(slot)
    }

    pub fn state(&self) -> CacheState {
        if self.frames.is_empty() {
            return CacheState::Empty;
        }
        match self.now {
            Some(now) if self.missing(now).is_empty() => CacheState::Steady,
            _ => CacheState::Filling,
        }
    }

    /// True once after the cache emptied out through eviction.
    pub fn take_rebuilt(&mut self) -> bool {
        std::mem::take(&mut self.rebuilt)
    }

    pub fn len(&self) -> usize { self.frames.len() }
    pub fn is_empty(&self) -> bool { self.frames.is_empty() }

    /// `0` is the newest frame, `1` the one before it, and so on.
    pub fn from_newest(&self, index: usize) -> Option<&Arc<Frame>> {
        let len = self.frames.len();
        if index < len { self.frames.get(len - 1 - index) } else { None }
    }

    pub fn slots(&self) -> Vec<TimeSlot> {
        self.frames.iter().map(|f| f.slot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tiny_skia::Pixmap;

    fn frame(slot: TimeSlot) -> Frame {
        Frame { slot, image: Pixmap::new(4, 4).unwrap(), absent_tiles: 0 }
    }

    #[derive(Default)]
    struct CountingLayers {
        calls: Mutex<Vec<TimeSlot>>,
    }

    impl LayerSource for CountingLayers {
        async fn layer(&self, slot: TimeSlot) -> Frame {
            self.calls.lock().unwrap().push(slot);
            frame(slot)
        }
    }

    const T: i64 = 1_700_000_400; // on a slot boundary

    #[tokio::test]
    async fn test_backfill_one_slot_per_call_until_steady() {
        let now = TimeSlot::floor(T);
        let mut cache = FrameCache::new(5);
        let layers = CountingLayers::default();
        assert_eq!(cache.state(), CacheState::Empty);

        for i in 0..5 {
            let missing_before = cache.missing(now).len();
            let filled = cache.ensure_slot(now, &layers).await;
            assert_eq!(filled, Some(now.offset(i - 4)));
            assert_eq!(cache.missing(now).len(), missing_before - 1);
            assert_eq!(layers.calls.lock().unwrap().len(), (i + 1) as usize);
            if i < 4 {
                assert_eq!(cache.state(), CacheState::Filling);
            }
        }

        assert_eq!(cache.state(), CacheState::Steady);
        let expect: Vec<i64> = vec![T - 2400, T - 1800, T - 1200, T - 600, T];
        assert_eq!(cache.slots().iter().map(|s| s.unix()).collect::<Vec<_>>(), expect);

        // nothing left to do
        assert_eq!(cache.ensure_slot(now, &layers).await, None);
        assert_eq!(layers.calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_window_slides_and_evicts() {
        let mut now = TimeSlot::floor(T);
        let mut cache = FrameCache::new(5);
        let layers = CountingLayers::default();
        for _ in 0..5 {
            cache.ensure_slot(now, &layers).await;
        }
        now = now.next();
        assert_eq!(cache.ensure_slot(now, &layers).await, Some(now));
        assert_eq!(cache.len(), 5);
        assert!(cache.slots().iter().all(|s| *s >= cache.window_start(now)));
        assert_eq!(cache.from_newest(0).unwrap().slot, now);
        assert_eq!(cache.from_newest(4).unwrap().slot, now.offset(-4));
        assert!(cache.from_newest(5).is_none());
        assert!(!cache.take_rebuilt());
    }

    #[test]
    fn test_stale_cache_is_rebuilt() {
        let now = TimeSlot::floor(T);
        let mut cache = FrameCache::new(5);
        for i in 0..5 {
            assert!(cache.insert(frame(now.offset(-i)), now));
        }
        let later = now.offset(12);
        cache.evict(later);
        assert!(cache.is_empty());
        assert_eq!(cache.state(), CacheState::Empty);
        assert!(cache.take_rebuilt());
        assert!(!cache.take_rebuilt());
        assert_eq!(cache.missing(later).len(), 5);
    }

    #[test]
    fn test_insert_rejects_duplicates_and_stale_slots() {
        let now = TimeSlot::floor(T);
        let mut cache = FrameCache::new(5);
        assert!(cache.insert(frame(now.offset(-2)), now));
        assert!(!cache.insert(frame(now.offset(-2)), now));
        assert!(!cache.insert(frame(now.offset(-5)), now));
        assert!(!cache.insert(frame(now.offset(1)), now));
        // out of order arrival still lands sorted
        assert!(cache.insert(frame(now), now));
        assert!(cache.insert(frame(now.offset(-4)), now));
        assert_eq!(cache.slots(), vec![now.offset(-4), now.offset(-2), now]);
    }

    #[test]
    fn test_next_wanted_skips_in_flight() {
        let now = TimeSlot::floor(T);
        let cache = FrameCache::new(3);
        let mut in_flight = HashSet::new();
        assert_eq!(cache.next_wanted(now, &in_flight), Some(now.offset(-2)));
        in_flight.insert(now.offset(-2));
        assert_eq!(cache.next_wanted(now, &in_flight), Some(now.offset(-1)));
        in_flight.insert(now.offset(-1));
        in_flight.insert(now);
        assert_eq!(cache.next_wanted(now, &in_flight), None);
    }
}

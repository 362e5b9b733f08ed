use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::trace;

const EVICTION_BATCH_DIVISOR: usize = 16;

/// Occurrences of one key inside the trailing window.
#[derive(Debug)]
struct KeyWindow {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

impl KeyWindow {
    fn new(now: Instant) -> Self {
        Self {
            hits: VecDeque::new(),
            last_seen: now,
        }
    }

    fn discard_before(&mut self, cutoff: Option<Instant>) {
        let Some(cutoff) = cutoff else { return };
        while self.hits.front().is_some_and(|&t| t <= cutoff) {
            self.hits.pop_front();
        }
    }
}

/// Result of recording one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Occurrences inside the window, including the one just recorded.
    pub count: usize,
    /// Oldest occurrence still inside the window.
    pub oldest: Instant,
}

/// Exact sliding-window occurrence counter keyed by client identifier.
///
/// Timestamps come from tokio's monotonic clock. The number of tracked keys is
/// bounded: when a new key pushes the map past `max_keys`, keys whose window
/// has fully elapsed are dropped first, then the least recently seen keys,
/// in batches. An evicted key simply starts over with no history.
#[derive(Debug)]
pub struct SlidingWindowCounter {
    window: Duration,
    max_keys: usize,
    keys: DashMap<String, KeyWindow>,
}

impl SlidingWindowCounter {
    pub fn new(window: Duration, max_keys: usize) -> Self {
        Self {
            window,
            max_keys: max_keys.max(1),
            keys: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an occurrence for `key` now and return the in-window count.
    pub fn record(&self, key: &str) -> WindowCount {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.window);

        let (result, inserted) = match self.keys.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                state.discard_before(cutoff);
                state.hits.push_back(now);
                state.last_seen = now;
                (Self::count_of(state, now), false)
            }
            Entry::Vacant(vacant) => {
                let mut state = KeyWindow::new(now);
                state.hits.push_back(now);
                let result = Self::count_of(&state, now);
                vacant.insert(state);
                (result, true)
            }
        };

        // The entry guard is released above; scanning the map while holding it
        // would deadlock on the same shard.
        if inserted && self.keys.len() > self.max_keys {
            self.shrink_to_capacity(key);
        }

        result
    }

    fn count_of(state: &KeyWindow, now: Instant) -> WindowCount {
        WindowCount {
            count: state.hits.len(),
            oldest: state.hits.front().copied().unwrap_or(now),
        }
    }

    /// Oldest in-window occurrence for `key`, if it has any.
    pub fn oldest(&self, key: &str) -> Option<Instant> {
        let cutoff = Instant::now().checked_sub(self.window);
        self.keys.get(key).and_then(|state| {
            state
                .hits
                .iter()
                .copied()
                .find(|&t| cutoff.is_none_or(|c| t > c))
        })
    }

    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }

    /// Drop every key whose newest occurrence has left the window.
    pub fn purge_expired(&self) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(self.window) else {
            return 0;
        };
        let before = self.keys.len();
        self.keys.retain(|_, state| state.last_seen > cutoff);
        before.saturating_sub(self.keys.len())
    }

    /// Evict down to a low-water mark in one pass: every expired key plus the
    /// least recently seen ones. Between passes `max_keys / 16` new keys fit
    /// without another scan.
    fn shrink_to_capacity(&self, keep: &str) {
        let batch = (self.max_keys / EVICTION_BATCH_DIVISOR).max(1);
        let low_water = self.max_keys + 1 - batch;

        while self.keys.len() > self.max_keys {
            let cutoff = Instant::now().checked_sub(self.window);
            let mut candidates: Vec<(Instant, String)> = self
                .keys
                .iter()
                .filter(|entry| entry.key() != keep)
                .map(|entry| (entry.value().last_seen, entry.key().clone()))
                .collect();
            if candidates.is_empty() {
                break;
            }

            let excess = self
                .keys
                .len()
                .saturating_sub(low_water)
                .min(candidates.len());
            if excess > 0 && excess < candidates.len() {
                candidates.select_nth_unstable(excess - 1);
            }

            let mut evicted = 0;
            for (rank, (last_seen, key)) in candidates.iter().enumerate() {
                let expired = cutoff.is_some_and(|c| *last_seen <= c);
                if rank >= excess && !expired {
                    continue;
                }
                // Another caller may have touched the key since the scan.
                if self
                    .keys
                    .remove_if(key, |_, state| state.last_seen == *last_seen)
                    .is_some()
                {
                    evicted += 1;
                }
            }
            trace!(evicted, tracked = self.keys.len(), "evicted stale rate-limit keys");
            if evicted == 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fresh_key_counts_one() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(60), 10);
        assert_eq!(counter.record("1.2.3.4").count, 1);
        assert_eq!(counter.record("1.2.3.4").count, 2);
        assert_eq!(counter.record("5.6.7.8").count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn old_occurrences_slide_out() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(60), 10);
        let first = counter.record("k");
        tokio::time::advance(Duration::from_secs(30)).await;
        let second = counter.record("k");
        assert_eq!(second.count, 2);
        assert_eq!(second.oldest, first.oldest);

        // 61s after the first hit, only the second remains plus the new one.
        tokio::time::advance(Duration::from_secs(31)).await;
        let third = counter.record("k");
        assert_eq!(third.count, 2);
        assert!(third.oldest > first.oldest);
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_ignores_expired_hits() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(10), 10);
        counter.record("k");
        assert!(counter.oldest("k").is_some());
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(counter.oldest("k"), None);
        assert_eq!(counter.oldest("never-seen"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_least_recently_seen_key() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(600), 2);
        counter.record("a");
        tokio::time::advance(Duration::from_secs(1)).await;
        counter.record("b");
        tokio::time::advance(Duration::from_secs(1)).await;
        counter.record("a");
        tokio::time::advance(Duration::from_secs(1)).await;
        counter.record("c");

        assert_eq!(counter.tracked_keys(), 2);
        // "b" was the stalest and lost its history: it fails open.
        assert_eq!(counter.record("b").count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_runs_in_batches() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(600), 32);
        for i in 0..=32 {
            counter.record(&format!("k{i}"));
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        // 33 keys against a capacity of 32: the two stalest go in one pass.
        assert_eq!(counter.tracked_keys(), 31);
        assert_eq!(counter.oldest("k0"), None);
        assert_eq!(counter.oldest("k1"), None);
        assert!(counter.oldest("k2").is_some());

        // The freed slot takes a new key without evicting anything.
        counter.record("fresh");
        assert_eq!(counter.tracked_keys(), 32);
        assert!(counter.oldest("k2").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_pass_also_drops_expired_keys() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(5), 2);
        counter.record("old-1");
        counter.record("old-2");
        tokio::time::advance(Duration::from_secs(6)).await;

        counter.record("new");
        assert_eq!(counter.tracked_keys(), 1);
        assert!(counter.oldest("new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_drops_idle_keys() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(5), 10);
        counter.record("idle");
        tokio::time::advance(Duration::from_secs(4)).await;
        counter.record("active");
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(counter.purge_expired(), 1);
        assert_eq!(counter.tracked_keys(), 1);
        assert!(counter.oldest("active").is_some());
    }
}

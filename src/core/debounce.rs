//! Suppression strategies for high-frequency, low-information signals.
//!
//! Three small policies share one intent:
//! - [`TrailingDebounce`]: deliver only the last call of a burst, once the
//!   key has been quiet for the window.
//! - [`CountThreshold`]: count calls per key and report according to a
//!   [`ThresholdMode`].
//! - [`OneShotLatch`]: report the first time per key, never again.
//!
//! None of them read a clock. Callers pass `now_ms`, and the trailing
//! debounce is driven by [`TrailingDebounce::poll`].

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Which policy applies to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Reported immediately, every time
    PassThrough,
    TrailingDebounce,
    CountThreshold,
    OneShotLatch,
}

#[derive(Debug, Clone)]
struct Pending<E> {
    deadline_ms: i64,
    event: E,
}

/// Trailing-edge debounce with one independent timer per key.
#[derive(Debug, Clone)]
pub struct TrailingDebounce<K, E> {
    window_ms: i64,
    pending: HashMap<K, Pending<E>>,
}

impl<K: Eq + Hash + Clone, E> TrailingDebounce<K, E> {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms: window_ms.max(0),
            pending: HashMap::new(),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Report a call for `key` at `now_ms`.
    ///
    /// A pending event whose timer has not fired yet is replaced and its
    /// timer restarted. If the pending timer was already due, that event is
    /// returned so it is delivered exactly once before the new burst starts.
    pub fn report(&mut self, key: K, event: E, now_ms: i64) -> Option<E> {
        let deadline_ms = now_ms.saturating_add(self.window_ms);
        let previous = self
            .pending
            .insert(key, Pending { deadline_ms, event })?;

        if previous.deadline_ms <= now_ms {
            Some(previous.event)
        } else {
            None
        }
    }

    /// Remove and return every event whose timer has fired, oldest deadline first.
    pub fn poll(&mut self, now_ms: i64) -> Vec<(K, E)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline_ms <= now_ms)
            .map(|(k, _)| k.clone())
            .collect();

        let mut fired: Vec<(i64, K, E)> = due
            .into_iter()
            .filter_map(|k| {
                self.pending
                    .remove(&k)
                    .map(|p| (p.deadline_ms, k, p.event))
            })
            .collect();
        fired.sort_by_key(|(deadline, _, _)| *deadline);

        fired.into_iter().map(|(_, k, e)| (k, e)).collect()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<i64> {
        self.pending.values().map(|p| p.deadline_ms).min()
    }

    /// Cancel pending timers whose key matches. Returns how many were dropped.
    pub fn cancel_where<F: Fn(&K) -> bool>(&mut self, predicate: F) -> usize {
        let before = self.pending.len();
        self.pending.retain(|k, _| !predicate(k));
        before - self.pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// How a [`CountThreshold`] turns counts into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Report the first `n` calls individually, suppress the rest
    FirstN(u32),
    /// Suppress until the count exceeds `n`, then report exactly once
    OnceAbove(u32),
}

/// Per-key call counter.
#[derive(Debug, Clone)]
pub struct CountThreshold<K> {
    mode: ThresholdMode,
    counts: HashMap<K, u32>,
}

impl<K: Eq + Hash> CountThreshold<K> {
    pub fn new(mode: ThresholdMode) -> Self {
        Self {
            mode,
            counts: HashMap::new(),
        }
    }

    /// Count one call for `key`. Returns the running count when it should
    /// be reported, `None` when suppressed.
    pub fn observe(&mut self, key: K) -> Option<u32> {
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(1);

        let report = match self.mode {
            ThresholdMode::FirstN(n) => *count <= n,
            ThresholdMode::OnceAbove(n) => *count == n.saturating_add(1),
        };
        report.then_some(*count)
    }

    pub fn count(&self, key: &K) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of keys being counted.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn reset_where<F: Fn(&K) -> bool>(&mut self, predicate: F) {
        self.counts.retain(|k, _| !predicate(k));
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

/// Fires once per key.
#[derive(Debug, Clone)]
pub struct OneShotLatch<K> {
    tripped: HashSet<K>,
}

impl<K: Eq + Hash> OneShotLatch<K> {
    pub fn new() -> Self {
        Self {
            tripped: HashSet::new(),
        }
    }

    /// Returns true only the first time `key` is tripped.
    pub fn trip(&mut self, key: K) -> bool {
        self.tripped.insert(key)
    }

    pub fn is_tripped(&self, key: &K) -> bool {
        self.tripped.contains(key)
    }

    pub fn reset_where<F: Fn(&K) -> bool>(&mut self, predicate: F) {
        self.tripped.retain(|k| !predicate(k));
    }

    pub fn clear(&mut self) {
        self.tripped.clear();
    }
}

impl<K: Eq + Hash> Default for OneShotLatch<K> {
    fn default() -> Self {
        Self::new()
    }
}

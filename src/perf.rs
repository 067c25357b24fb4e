//! Live performance counters for a MapReduce run.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Performance statistics of a run and the cache hit/miss rate.
///
/// Counters are updated live and can be read at any time, including
/// mid-run. There is no consistency guarantee across the four counters.
#[derive(Debug, Default)]
pub struct PerfStats {
    mappers_running: AtomicI64,
    reducers_running: AtomicI64,
    cache_hits: AtomicI64,
    cache_misses: AtomicI64,
}

/// A point-in-time copy of [`PerfStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PerfSnapshot {
    pub mappers_running: i64,
    pub reducers_running: i64,
    pub cache_hits: i64,
    pub cache_misses: i64,
}

impl fmt::Display for PerfSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mappers={} reducers={} hits={} misses={}",
            self.mappers_running, self.reducers_running, self.cache_hits, self.cache_misses
        )
    }
}

impl PerfStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mappers currently running.
    pub fn mappers_running(&self) -> i64 {
        self.mappers_running.load(Ordering::Relaxed)
    }

    /// Number of reducers currently running.
    pub fn reducers_running(&self) -> i64 {
        self.reducers_running.load(Ordering::Relaxed)
    }

    /// Number of mappers skipped because the cache already held their output.
    pub fn cache_hits(&self) -> i64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Number of mappers that ran because their key was not cached.
    pub fn cache_misses(&self) -> i64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PerfSnapshot {
        PerfSnapshot {
            mappers_running: self.mappers_running(),
            reducers_running: self.reducers_running(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mapper_started(&self) -> RunningGuard<'_> {
        RunningGuard::new(&self.mappers_running)
    }

    pub(crate) fn reducer_started(&self) -> RunningGuard<'_> {
        RunningGuard::new(&self.reducers_running)
    }
}

/// Increments a running counter on creation and decrements it on drop, so
/// the counter returns to zero even when the task unwinds.
pub(crate) struct RunningGuard<'a> {
    counter: &'a AtomicI64,
}

impl<'a> RunningGuard<'a> {
    fn new(counter: &'a AtomicI64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

//! Wires input keys through the map stage, the accumulation channel and the
//! reduce stage to the caller's output.
//!
//! ```text
//! input keys -> [map stage] -> accumulated pairs -> [reduce stage] -> output pairs
//! ```

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::{Error, KeyValue, Mapper, MappingCache, PerfStats, Reducer};

mod map;
mod reduce;

use map::MapStage;
use reduce::ReduceStage;

/// Tunables of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the channel between the map and the reduce stage.
    pub accumulator_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accumulator_capacity: 1,
        }
    }
}

impl EngineConfig {
    pub fn with_accumulator_capacity(mut self, capacity: usize) -> Self {
        self.accumulator_capacity = capacity;
        self
    }

    fn effective_capacity(&self) -> usize {
        self.accumulator_capacity.max(1)
    }
}

/// A configured MapReduce job, runnable any number of times.
pub struct MapReduce<M: Mapper, R> {
    mapper: Arc<M>,
    reducer: Arc<R>,
    cache: Option<Arc<MappingCache<M::Value>>>,
    perf: Option<Arc<PerfStats>>,
    config: EngineConfig,
}

impl<M, R> MapReduce<M, R>
where
    M: Mapper,
    R: Reducer<M::Value>,
{
    pub fn new(mapper: M, reducer: R) -> Self {
        Self {
            mapper: Arc::new(mapper),
            reducer: Arc::new(reducer),
            cache: None,
            perf: None,
            config: EngineConfig::default(),
        }
    }

    /// Uses `cache` to skip mapping keys seen in a previous run.
    pub fn with_cache(mut self, cache: Arc<MappingCache<M::Value>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Updates `perf` live while running.
    pub fn with_perf_stats(mut self, perf: Arc<PerfStats>) -> Self {
        self.perf = Some(perf);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a complete map reduce and returns when done.
    ///
    /// Exhausts `input` and closes `out` once every mapper and reducer has
    /// finished. Errors go to `errors` and never stop the run, so the caller
    /// must keep draining it.
    pub async fn run(
        &self,
        input: mpsc::Receiver<String>,
        out: mpsc::Sender<KeyValue<R::Output>>,
        errors: mpsc::Sender<Error>,
    ) {
        let (acc_tx, acc_rx) = mpsc::channel(self.config.effective_capacity());

        let map_stage = MapStage {
            mapper: self.mapper.clone(),
            cache: self.cache.clone(),
            perf: self.perf.clone(),
            errors: errors.clone(),
        };
        let reduce_stage = ReduceStage {
            reducer: self.reducer.clone(),
            perf: self.perf.clone(),
            errors,
            _value: PhantomData,
        };

        tokio::join!(
            map_stage.run(input, acc_tx),
            reduce_stage.run(acc_rx, out)
        );

        match &self.perf {
            Some(perf) => info!(stats = %perf.snapshot(), "map reduce done"),
            None => info!("map reduce done"),
        }
    }
}

/// Runs a complete map reduce with the given collaborators.
///
/// Shorthand for building a [`MapReduce`] and calling [`MapReduce::run`].
pub async fn map_reduce<M, R>(
    input: mpsc::Receiver<String>,
    out: mpsc::Sender<KeyValue<R::Output>>,
    errors: mpsc::Sender<Error>,
    cache: Option<Arc<MappingCache<M::Value>>>,
    perf: Option<Arc<PerfStats>>,
    mapper: M,
    reducer: R,
) where
    M: Mapper,
    R: Reducer<M::Value>,
{
    let mut job = MapReduce::new(mapper, reducer);
    job.cache = cache;
    job.perf = perf;
    job.run(input, out, errors).await
}

//! A single-process, generic MapReduce (lite) engine with a mapping cache.
//!
//! Users supply a [`Mapper`] and a [`Reducer`]; the engine maps every input
//! key in parallel, groups the emitted pairs by reduce key and runs one
//! reducer per distinct key. An optional [`MappingCache`] remembers what each
//! input key emitted, so re-running over the same inputs skips the mapper.
//!
//! This is mostly useful when harvesting something slow (a remote site, a
//! large tree of files) through a mapper and then reducing the data for
//! analysis: the harvested data is cached and re-execution is much faster.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub mod cache;
pub mod cmd;
pub mod engine;
pub mod error;
pub mod perf;
pub mod utils;
pub mod workload;

pub use cache::MappingCache;
pub use engine::{map_reduce, EngineConfig, MapReduce};
pub use error::{Error, Result};
pub use perf::{PerfSnapshot, PerfStats};

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// Bound for values flowing from mappers to reducers.
///
/// Values must be serializable so a [`MappingCache`] can record and replay
/// them. Blanket-implemented for every qualifying type.
pub trait Value: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Value for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Generates reduce pairs from one input key.
///
/// Each input key is mapped at most once per run, in its own task.
#[async_trait]
pub trait Mapper: Send + Sync + 'static {
    /// The type of every value this mapper emits.
    type Value: Value;

    /// Maps the key exposed by `io`, emitting any number of pairs.
    async fn map(&self, io: &mut MapIo<Self::Value>) -> anyhow::Result<()>;
}

/// Reduces the values emitted for one reduce key.
#[async_trait]
pub trait Reducer<V>: Send + Sync + 'static {
    /// The type of the final values this reducer outputs.
    type Output: Send + 'static;

    /// Consumes the values for the key exposed by `io` and outputs results.
    async fn reduce(&self, io: &mut ReduceIo<V, Self::Output>) -> anyhow::Result<()>;
}

/// Passes the mapped values through as-is, under their reduce key.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReducePassThrough;

#[async_trait]
impl<V: Send + 'static> Reducer<V> for ReducePassThrough {
    type Output = V;

    async fn reduce(&self, io: &mut ReduceIo<V, V>) -> anyhow::Result<()> {
        let key = io.reduce_key().to_string();
        while let Some(value) = io.next_value().await {
            io.output(key.clone(), value).await;
        }
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue<V> {
    /// The key.
    pub key: String,
    /// The value.
    pub value: V,
}

impl<V> KeyValue<V> {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Get the key of this key-value pair.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the value of this key-value pair.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Consumes the key-value pair and returns both halves.
    #[inline]
    pub fn into_parts(self) -> (String, V) {
        (self.key, self.value)
    }
}

/////////////////////////////////////////////////////////////////////////////
// Mapper and reducer contexts
/////////////////////////////////////////////////////////////////////////////

/// The argument to [`Mapper::map`].
pub struct MapIo<V> {
    map_key: String,
    accumulator: mpsc::Sender<KeyValue<V>>,
    cache: Option<std::sync::Arc<MappingCache<V>>>,
    errors: mpsc::Sender<Error>,
}

impl<V: Value> MapIo<V> {
    pub(crate) fn new(
        map_key: String,
        accumulator: mpsc::Sender<KeyValue<V>>,
        cache: Option<std::sync::Arc<MappingCache<V>>>,
        errors: mpsc::Sender<Error>,
    ) -> Self {
        Self {
            map_key,
            accumulator,
            cache,
            errors,
        }
    }

    /// The input key being mapped.
    pub fn map_key(&self) -> &str {
        &self.map_key
    }

    /// Emits one pair towards the reducers.
    ///
    /// With a cache configured the value is also recorded under the input
    /// key. A value that fails to encode is reported on the error channel
    /// and left out of the cache, but is still forwarded.
    pub async fn emit(&self, reduce_key: impl Into<String>, value: V) {
        let reduce_key = reduce_key.into();
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.add(&self.map_key, &reduce_key, &value) {
                utils::report(&self.errors, err).await;
            }
        }
        trace!(map_key = %self.map_key, %reduce_key, "emit");
        if self
            .accumulator
            .send(KeyValue::new(reduce_key, value))
            .await
            .is_err()
        {
            debug!(map_key = %self.map_key, "accumulator closed, dropping emitted pair");
        }
    }
}

/// The argument to [`Reducer::reduce`].
pub struct ReduceIo<V, O> {
    reduce_key: String,
    values: mpsc::UnboundedReceiver<V>,
    output: mpsc::Sender<KeyValue<O>>,
}

impl<V, O> ReduceIo<V, O> {
    pub(crate) fn new(
        reduce_key: String,
        values: mpsc::UnboundedReceiver<V>,
        output: mpsc::Sender<KeyValue<O>>,
    ) -> Self {
        Self {
            reduce_key,
            values,
            output,
        }
    }

    /// The reduce key whose values are being consumed.
    pub fn reduce_key(&self) -> &str {
        &self.reduce_key
    }

    /// Waits for the next value for this key.
    ///
    /// Returns [`None`] once the map stage has finished and every value
    /// emitted for this key has been handed out.
    pub async fn next_value(&mut self) -> Option<V> {
        self.values.recv().await
    }

    /// Sends a final pair to the run's output channel.
    pub async fn output(&self, final_key: impl Into<String>, value: O) {
        if self
            .output
            .send(KeyValue::new(final_key, value))
            .await
            .is_err()
        {
            debug!(reduce_key = %self.reduce_key, "output closed, dropping final pair");
        }
    }
}

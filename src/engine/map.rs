//! Map stage: one task per input key, replaying from the cache when possible.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::utils::report;
use crate::{Error, KeyValue, MapIo, Mapper, MappingCache, PerfStats};

pub(crate) struct MapStage<M: Mapper> {
    pub mapper: Arc<M>,
    pub cache: Option<Arc<MappingCache<M::Value>>>,
    pub perf: Option<Arc<PerfStats>>,
    pub errors: mpsc::Sender<Error>,
}

impl<M: Mapper> MapStage<M> {
    /// Exhausts `input`, returning once every spawned mapper has finished.
    ///
    /// The accumulator is dropped on return, which tells the reduce stage no
    /// more pairs will arrive.
    pub async fn run(
        self,
        mut input: mpsc::Receiver<String>,
        accumulator: mpsc::Sender<KeyValue<M::Value>>,
    ) {
        let mut tasks = JoinSet::new();
        while let Some(key) = input.recv().await {
            trace!(%key, "spawning mapper");
            tasks.spawn(map_one(
                key,
                self.mapper.clone(),
                self.cache.clone(),
                self.perf.clone(),
                accumulator.clone(),
                self.errors.clone(),
            ));
        }
        drop(accumulator);

        debug!(mappers = tasks.len(), "input exhausted, waiting on mappers");
        while tasks.join_next().await.is_some() {}

        if let Some(cache) = &self.cache {
            cache.mark_all_clean();
        }
        debug!("map stage drained");
    }
}

async fn map_one<M: Mapper>(
    key: String,
    mapper: Arc<M>,
    cache: Option<Arc<MappingCache<M::Value>>>,
    perf: Option<Arc<PerfStats>>,
    accumulator: mpsc::Sender<KeyValue<M::Value>>,
    errors: mpsc::Sender<Error>,
) {
    let _running = perf.as_deref().map(PerfStats::mapper_started);

    if let Some(replay) = cache.as_deref().and_then(|c| c.get(&key)) {
        trace!(%key, "cache hit");
        if let Some(perf) = &perf {
            perf.record_hit();
        }
        for item in replay {
            match item {
                Ok(kv) => {
                    if accumulator.send(kv).await.is_err() {
                        return;
                    }
                }
                Err(err) => report(&errors, err).await,
            }
        }
        return;
    }

    trace!(%key, "cache miss");
    if let Some(perf) = &perf {
        perf.record_miss();
    }

    // The mapper runs in its own task so a panic surfaces as a JoinError
    // naming this key instead of silently losing it.
    let mut io = MapIo::new(key.clone(), accumulator, cache, errors.clone());
    let invocation = tokio::spawn(async move { mapper.map(&mut io).await });
    let cause = match invocation.await {
        Ok(Ok(())) => return,
        Ok(Err(cause)) => cause,
        Err(join) if join.is_panic() => anyhow::anyhow!("mapper panicked"),
        Err(join) => anyhow::Error::new(join),
    };
    report(&errors, Error::map(key, cause)).await;
}

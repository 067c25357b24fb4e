//! Reduce stage: groups accumulated pairs by reduce key and feeds one lazily
//! spawned reducer per distinct key.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::utils::report;
use crate::{Error, KeyValue, PerfStats, ReduceIo, Reducer};

pub(crate) struct ReduceStage<V, R: Reducer<V>> {
    pub reducer: Arc<R>,
    pub perf: Option<Arc<PerfStats>>,
    pub errors: mpsc::Sender<Error>,
    pub _value: std::marker::PhantomData<fn(V)>,
}

impl<V, R> ReduceStage<V, R>
where
    V: Send + 'static,
    R: Reducer<V>,
{
    /// Consumes the accumulator until the map stage closes it, then waits for
    /// every reducer. `out` is dropped on return, closing the output.
    pub async fn run(
        self,
        mut accumulator: mpsc::Receiver<KeyValue<V>>,
        out: mpsc::Sender<KeyValue<R::Output>>,
    ) {
        let mut reductions: HashMap<String, mpsc::UnboundedSender<V>> = HashMap::new();
        let mut reducers = JoinSet::new();

        while let Some(KeyValue { key, value }) = accumulator.recv().await {
            let values = reductions.entry(key).or_insert_with_key(|key| {
                debug!(reduce_key = %key, "spawning reducer");
                let (tx, rx) = mpsc::unbounded_channel();
                reducers.spawn(reduce_one(
                    ReduceIo::new(key.clone(), rx, out.clone()),
                    self.reducer.clone(),
                    self.perf.clone(),
                    self.errors.clone(),
                ));
                tx
            });
            // The receiver only goes away once its reducer returned; values
            // arriving after that have nobody left to consume them.
            if values.send(value).is_err() {
                trace!("reducer already finished, dropping value");
            }
        }

        debug!(
            reducers = reductions.len(),
            "accumulator drained, closing reductions"
        );
        reductions.clear();
        drop(out);
        while reducers.join_next().await.is_some() {}
        debug!("reduce stage drained");
    }
}

async fn reduce_one<V, R>(
    mut io: ReduceIo<V, R::Output>,
    reducer: Arc<R>,
    perf: Option<Arc<PerfStats>>,
    errors: mpsc::Sender<Error>,
) where
    V: Send + 'static,
    R: Reducer<V>,
{
    let _running = perf.as_deref().map(PerfStats::reducer_started);
    let key = io.reduce_key().to_string();

    let invocation = tokio::spawn(async move { reducer.reduce(&mut io).await });
    let cause = match invocation.await {
        Ok(Ok(())) => return,
        Ok(Err(cause)) => cause,
        Err(join) if join.is_panic() => anyhow::anyhow!("reducer panicked"),
        Err(join) => anyhow::Error::new(join),
    };
    report(&errors, Error::reduce(key, cause)).await;
}

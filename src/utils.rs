//! Utility functions that may be helpful for driving and testing
//! MapReduce runs.
//!

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Error;

/// Feeds `keys` into a new channel from a background task.
///
/// The channel closes once every key has been sent, which is what ends the
/// map stage. Must be called from within a Tokio runtime.
pub fn key_source<I>(keys: I, capacity: usize) -> mpsc::Receiver<String>
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let keys = keys.into_iter();
    tokio::spawn(async move {
        for key in keys {
            if tx.send(key).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Drains `rx` until every sender is gone.
pub async fn collect<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    items
}

/// Delivers `err` on the run's error channel.
pub(crate) async fn report(errors: &mpsc::Sender<Error>, err: Error) {
    warn!(%err, "map reduce error");
    if let Err(mpsc::error::SendError(err)) = errors.send(err).await {
        debug!(%err, "error channel closed, dropping error");
    }
}

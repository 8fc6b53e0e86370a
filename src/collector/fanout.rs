//! Scatter/gather over tokio tasks
//!
//! Every level of the collection tree (metrics, systems, servers) spawns one
//! task per item and merges the lists the tasks return once all of them are
//! done. A task that panics is logged and contributes nothing. Deadlines are
//! not handled here: the leaves stop on their own, so no task is ever
//! cancelled while it holds a session.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::error;

/// Run `f` for every item on its own task and concatenate the results.
pub async fn parallel_map<I, F, Fut, T>(items: I, mut f: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Vec<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut tasks = JoinSet::new();
    for item in items {
        tasks.spawn(f(item));
    }

    let mut merged = Vec::new();
    while let Some(next) = tasks.join_next().await {
        match next {
            Ok(part) => merged.extend(part),
            Err(e) => error!("collection task failed: {e}"),
        }
    }

    merged
}

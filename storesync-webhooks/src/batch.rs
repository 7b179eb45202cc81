//! Batched concurrent execution

use futures::future::join_all;
use std::future::Future;

/// Await `tasks` in consecutive batches of `batch_size`, tasks within a
/// batch concurrently.
///
/// `None` (or zero) runs everything as one batch. Results keep the task
/// order.
pub async fn process_in_batches<I, F>(tasks: I, batch_size: Option<usize>) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    let mut tasks: Vec<F> = tasks.into_iter().collect();
    let size = match batch_size {
        Some(size) if size > 0 => size,
        _ => tasks.len().max(1),
    };

    let mut results = Vec::with_capacity(tasks.len());
    while !tasks.is_empty() {
        let rest = tasks.split_off(size.min(tasks.len()));
        results.extend(join_all(tasks).await);
        tasks = rest;
    }
    results
}

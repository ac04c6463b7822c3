//! Bounded fan-out used by `map`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, Result};

/// Run `f` over `items` with at most `concurrency` pipelines in flight.
///
/// Results come back in input order and every started pipeline is awaited,
/// even after another has failed. Items not yet started when `cancel` fires
/// resolve to [`DispatchError::Cancelled`].
pub(crate) async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    cancel: &CancellationToken,
    f: F,
) -> Vec<Result<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();
    let mut results: Vec<Option<Result<R>>> = (0..total).map(|_| None).collect();

    for (index, item) in items.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => permit,
        };
        let Ok(permit) = permit else { break };

        let fut = f(item);
        set.spawn(async move {
            let _permit = permit;
            (index, fut.await)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => {}
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or(Err(DispatchError::Cancelled)))
        .collect()
}

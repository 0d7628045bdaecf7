//! Bounded fan-out over a list of inputs.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Outcome of a fan-out. Successes and failures arrive in completion order.
#[derive(Debug)]
pub struct PoolOutcome<T, R, E> {
    pub results: Vec<R>,
    pub errors: Vec<(T, E)>,
}

/// Runs `f` over `items` with at most `limit` futures in flight. A failing
/// item never stops the others; it is returned alongside its error.
pub async fn process_with_concurrency<T, R, E, F, Fut>(
    items: Vec<T>,
    limit: usize,
    f: F,
) -> PoolOutcome<T, R, E>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let outcomes: Vec<(T, Result<R, E>)> = stream::iter(items)
        .map(|item| {
            let fut = f(item.clone());
            async move { (item, fut.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    let mut results = Vec::new();
    let mut errors = Vec::new();
    for (item, outcome) in outcomes {
        match outcome {
            Ok(r) => results.push(r),
            Err(e) => errors.push((item, e)),
        }
    }
    PoolOutcome { results, errors }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcome = process_with_concurrency((0..10).collect(), 2, |i: u32| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(i * 2)
            }
        })
        .await;

        assert_eq!(outcome.results.len(), 10);
        assert!(outcome.errors.is_empty());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_collected_without_aborting() {
        let outcome = process_with_concurrency(vec![1, 2, 3, 4], 2, |i: i64| async move {
            if i % 2 == 0 {
                Err(format!("user {i} failed"))
            } else {
                Ok(i)
            }
        })
        .await;

        let mut ok = outcome.results.clone();
        ok.sort();
        assert_eq!(ok, vec![1, 3]);

        let mut failed: Vec<i64> = outcome.errors.iter().map(|(i, _)| *i).collect();
        failed.sort();
        assert_eq!(failed, vec![2, 4]);
        assert!(outcome.errors.iter().all(|(i, e)| e.contains(&i.to_string())));
    }

    #[tokio::test]
    async fn test_zero_limit_still_makes_progress() {
        let outcome =
            process_with_concurrency(vec![7], 0, |i: i32| async move { Ok::<_, ()>(i) }).await;
        assert_eq!(outcome.results, vec![7]);
    }
}

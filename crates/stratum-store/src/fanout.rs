//! Bounded parallel fan-out shared by the store tiers.
//!
//! Every tier runs its children on one pool, so a multi-repo query fans
//! out across repos, commits and units without exceeding the configured
//! worker width. Cancellation is cooperative: workers observe the token
//! between I/O operations, and the first real error cancels the rest.

use parking_lot::Mutex;
use rayon::ThreadPool;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};

/// Builds a fan-out pool, degrading the thread count rather than failing
/// outright in constrained environments (low thread limits in CI
/// sandboxes and containers).
pub(crate) fn build_pool(threads: usize) -> ThreadPool {
    let requested = threads.max(1);
    let mut desired = requested;
    loop {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(desired)
            .thread_name(|idx| format!("stratum-fetch-{idx}"))
            .build()
        {
            Ok(pool) => return pool,
            Err(_err) if desired > 1 => {
                desired /= 2;
                continue;
            }
            Err(err) => panic!(
                "failed to build fan-out pool (requested {requested} thread(s)): {err}"
            ),
        }
    }
}

/// Runs every job on `pool` and merges their results.
///
/// The first non-cancellation error wins and cancels the remaining
/// workers; partial results are discarded. `Cancelled` is reported only
/// when no real error occurred. No result ordering is guaranteed across
/// jobs.
pub(crate) fn run<T, F>(pool: &ThreadPool, token: &CancellationToken, jobs: Vec<F>) -> Result<Vec<T>>
where
    T: Send,
    F: FnOnce(&CancellationToken) -> Result<Vec<T>> + Send,
{
    if token.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let merged: Mutex<Vec<T>> = Mutex::new(Vec::new());
    let first_err: Mutex<Option<StoreError>> = Mutex::new(None);

    pool.scope(|scope| {
        for job in jobs {
            let merged = &merged;
            let first_err = &first_err;
            let token = token.clone();
            scope.spawn(move |_| {
                let result = if token.is_cancelled() {
                    Err(StoreError::Cancelled)
                } else {
                    job(&token)
                };
                match result {
                    Ok(mut items) => merged.lock().append(&mut items),
                    Err(err) => {
                        let real = !matches!(err, StoreError::Cancelled);
                        let mut slot = first_err.lock();
                        match &*slot {
                            // A real error displaces a cancellation but
                            // never another real error.
                            Some(StoreError::Cancelled) if real => *slot = Some(err),
                            Some(_) => {}
                            None => *slot = Some(err),
                        }
                        drop(slot);
                        if real {
                            token.cancel();
                        }
                    }
                }
            });
        }
    });

    match first_err.into_inner() {
        Some(err) => Err(err),
        None => Ok(merged.into_inner()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_results_from_all_jobs() {
        let pool = build_pool(4);
        let token = CancellationToken::new();
        let jobs: Vec<_> = (0..16)
            .map(|i| move |_: &CancellationToken| Ok(vec![i]))
            .collect();

        let mut out: Vec<i32> = run(&pool, &token, jobs).unwrap();
        out.sort();
        assert_eq!(out, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn first_real_error_wins_over_cancellation() {
        let pool = build_pool(2);
        let token = CancellationToken::new();

        enum Job {
            Ok,
            Fail,
        }
        let jobs: Vec<_> = [Job::Ok, Job::Fail, Job::Ok, Job::Ok]
            .into_iter()
            .map(|kind| {
                move |token: &CancellationToken| match kind {
                    Job::Ok => {
                        if token.is_cancelled() {
                            Err(StoreError::Cancelled)
                        } else {
                            Ok(vec![1u32])
                        }
                    }
                    Job::Fail => Err(StoreError::corrupt("ref.dat", "boom")),
                }
            })
            .collect();

        let err = run(&pool, &token, jobs).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "{err:?}");
        assert!(token.is_cancelled());
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let pool = build_pool(2);
        let token = CancellationToken::new();
        token.cancel();

        let jobs: Vec<_> = (0..4)
            .map(|_| move |_: &CancellationToken| Ok(vec![0u8]))
            .collect();
        let err = run(&pool, &token, jobs).unwrap_err();
        assert!(matches!(err, StoreError::Cancelled), "{err:?}");
    }
}

//! Paginated query accumulation
//!
//! One round issues bounded queries against a single partition, following
//! continuation cursors until the round's target is met, the store runs out
//! of data, or (in single-call mode) after the first response. Rounds run
//! strictly one after another and are folded into [`RoundTotals`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use querybench_shared::utils::time::elapsed_ms;
use querybench_shared::utils::{estimate_response_bytes, format_megabytes};
use querybench_shared::{
    AccumulatorState, BenchSummary, Cursor, QueryPage, QueryTarget, RoundTotals, StopReason,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BenchConfig;
use crate::error::{BenchError, StoreError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::QueryStore;

/// Per-run knobs shared by every round
#[derive(Debug, Clone, Default)]
pub struct RoundOptions {
    pub retry: RetryPolicy,

    /// Upper bound on one store call; a hung call becomes [`StoreError::Timeout`]
    pub call_timeout: Option<Duration>,

    /// Checked before each call and raced against the in-flight one
    pub cancel: CancellationToken,
}

impl RoundOptions {
    pub fn from_config(config: &BenchConfig, cancel: CancellationToken) -> Self {
        Self {
            retry: config.retry,
            call_timeout: config.call_timeout(),
            cancel,
        }
    }
}

/// Issue one query (with retries) and measure it.
///
/// Returns the page together with the number of store calls it took. Only the
/// attempt that succeeded is timed.
async fn fetch_page<S: QueryStore + ?Sized>(
    store: &S,
    partition_key: &str,
    limit: u32,
    cursor: Option<&Cursor>,
    options: &RoundOptions,
) -> Result<(QueryPage, u32), BenchError> {
    if options.cancel.is_cancelled() {
        return Err(BenchError::Cancelled);
    }

    let call_timeout = options.call_timeout;
    let attempts = AtomicU32::new(0);
    let attempts_ref = &attempts;
    let call = retry_with_backoff("query", &options.retry, move || async move {
        attempts_ref.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let response = match call_timeout {
            Some(t) => tokio::time::timeout(t, store.query(partition_key, limit, cursor))
                .await
                .map_err(|_| StoreError::Timeout(t))??,
            None => store.query(partition_key, limit, cursor).await?,
        };
        Ok::<_, StoreError>((response, elapsed_ms(start)))
    });

    let (response, elapsed) = tokio::select! {
        biased;
        _ = options.cancel.cancelled() => return Err(BenchError::Cancelled),
        result = call => result?,
    };

    if response.count > limit {
        return Err(StoreError::Protocol(format!(
            "asked for at most {} items, got {}",
            limit, response.count
        ))
        .into());
    }

    let bytes = estimate_response_bytes(&response.items);
    Ok((
        QueryPage::measured(response, elapsed, bytes),
        attempts.load(Ordering::Relaxed),
    ))
}

/// Run a single round against `partition_key`.
///
/// Fails with [`BenchError::TableEmptyOrExhausted`] as soon as a call returns
/// no items; nothing of the round is kept in that case.
pub async fn run_round<S: QueryStore + ?Sized>(
    store: &S,
    partition_key: &str,
    target: QueryTarget,
    options: &RoundOptions,
) -> Result<AccumulatorState, BenchError> {
    let mut state = AccumulatorState::new(target);

    loop {
        let limit = state.next_limit();
        match &state.cursor {
            Some(cursor) => debug!("Exclusive start key: {}", cursor),
            None => debug!("Exclusive start key: none"),
        }

        let (page, attempts) =
            fetch_page(store, partition_key, limit, state.cursor.as_ref(), options).await?;
        state.record_page(attempts, page.elapsed_ms, page.bytes, page.consumed_capacity);

        info!(
            "Queried {} items with {} RCU in {:.1} ms, size is ~{} MB",
            page.count,
            page.consumed_capacity,
            page.elapsed_ms,
            format_megabytes(page.bytes)
        );

        if page.is_empty() {
            return Err(BenchError::TableEmptyOrExhausted {
                queries_issued: state.queries_issued,
                items_retrieved: state.items_retrieved,
            });
        }

        state.record_items(page.count);
        state.cursor = page.continuation;

        let stop = if state.target_met() {
            Some(StopReason::TargetReached)
        } else if !target.follows_cursor() {
            Some(StopReason::SingleCall)
        } else if state.cursor.is_none() {
            Some(StopReason::NoMoreData)
        } else {
            None
        };

        if let Some(reason) = stop {
            state.finish(reason);
            return Ok(state);
        }
    }
}

/// Run `round_count` rounds and summarize them
pub async fn run_rounds<S: QueryStore + ?Sized>(
    store: &S,
    partition_key: &str,
    round_count: u32,
    target: QueryTarget,
    options: &RoundOptions,
) -> Result<BenchSummary, BenchError> {
    run_rounds_with(store, partition_key, round_count, target, options, |_, _| {}).await
}

/// Like [`run_rounds`], calling `on_round` with each finished round (1-based)
pub async fn run_rounds_with<S, F>(
    store: &S,
    partition_key: &str,
    round_count: u32,
    target: QueryTarget,
    options: &RoundOptions,
    mut on_round: F,
) -> Result<BenchSummary, BenchError>
where
    S: QueryStore + ?Sized,
    F: FnMut(u32, &AccumulatorState),
{
    info!("Running {} rounds, {}", round_count, target);

    let mut totals = RoundTotals::default();
    for round in 1..=round_count {
        let state = run_round(store, partition_key, target, options).await?;

        info!(
            round,
            stop = ?state.stop,
            "Total items: {}, queries: {}, RCUs: {}, time: {:.1} ms, size: ~{} MB",
            state.items_retrieved,
            state.queries_issued,
            state.consumed_capacity,
            state.elapsed_ms,
            format_megabytes(state.bytes)
        );

        on_round(round, &state);
        totals.absorb(&state);
    }

    let avg_ms_per_item = totals
        .avg_ms_per_item()
        .ok_or(BenchError::NoData { rounds: round_count })?;

    Ok(BenchSummary {
        target,
        totals,
        avg_ms_per_item,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use querybench_shared::{Item, KeyValue, QueryResponse};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn item(seq: u32) -> Item {
        let mut item = Item::new();
        item.insert("hash_id".to_string(), "1000".to_string());
        item.insert("sort_id".to_string(), format!("{:010}", seq));
        item
    }

    fn cursor_at(seq: u32) -> Cursor {
        Cursor::new()
            .with("hash_id", KeyValue::S("1000".into()))
            .with("sort_id", KeyValue::S(format!("{:010}", seq)))
    }

    fn page(count: u32, cursor: Option<u32>) -> QueryResponse {
        QueryResponse {
            items: (1..=count).map(item).collect(),
            count,
            continuation: cursor.map(cursor_at),
            consumed_capacity: 0.5,
        }
    }

    /// Replays a fixed list of responses and records every call
    #[derive(Default)]
    struct ScriptedStore {
        script: Mutex<VecDeque<Result<QueryResponse, StoreError>>>,
        calls: Mutex<Vec<(u32, Option<Cursor>)>>,
    }

    impl ScriptedStore {
        fn new(script: Vec<Result<QueryResponse, StoreError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<(u32, Option<Cursor>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryStore for ScriptedStore {
        async fn query(
            &self,
            _partition_key: &str,
            limit: u32,
            start_after: Option<&Cursor>,
        ) -> Result<QueryResponse, StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push((limit, start_after.cloned()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(StoreError::Fatal("script exhausted".into())))
        }
    }

    /// Serves an endless partition in pages of at most `page_size`
    struct PagingStore {
        page_size: u32,
        calls: Mutex<u64>,
    }

    #[async_trait]
    impl QueryStore for PagingStore {
        async fn query(
            &self,
            _partition_key: &str,
            limit: u32,
            _start_after: Option<&Cursor>,
        ) -> Result<QueryResponse, StoreError> {
            *self.calls.lock().unwrap() += 1;
            let count = limit.min(self.page_size);
            Ok(page(count, Some(count)))
        }
    }

    /// Never answers
    struct HangingStore {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl QueryStore for HangingStore {
        async fn query(
            &self,
            _partition_key: &str,
            _limit: u32,
            _start_after: Option<&Cursor>,
        ) -> Result<QueryResponse, StoreError> {
            *self.calls.lock().unwrap() += 1;
            std::future::pending().await
        }
    }

    fn fast_options() -> RoundOptions {
        RoundOptions {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 2,
            },
            ..RoundOptions::default()
        }
    }

    fn bounded(n: u32) -> QueryTarget {
        QueryTarget::from(n)
    }

    #[tokio::test]
    async fn test_bounded_round_reduces_limit_and_follows_cursor() {
        let store = ScriptedStore::new(vec![Ok(page(40, Some(40))), Ok(page(60, Some(100)))]);
        let state = run_round(&store, "1000", bounded(100), &fast_options())
            .await
            .unwrap();

        assert_eq!(state.items_retrieved, 100);
        assert_eq!(state.queries_issued, 2);
        assert_eq!(state.stop, Some(StopReason::TargetReached));
        assert_eq!(state.consumed_capacity, 1.0);

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (100, None));
        assert_eq!(calls[1], (60, Some(cursor_at(40))));
    }

    #[tokio::test]
    async fn test_items_never_exceed_bounded_target() {
        for page_size in [1, 3, 7, 50, 100, 1000] {
            for target in [1, 5, 99, 100, 250] {
                let store = PagingStore {
                    page_size,
                    calls: Mutex::new(0),
                };
                let state = run_round(&store, "1000", bounded(target), &fast_options())
                    .await
                    .unwrap();

                assert_eq!(state.items_retrieved, u64::from(target));
                assert_eq!(state.queries_issued, *store.calls.lock().unwrap());
                assert_eq!(
                    state.queries_issued,
                    u64::from(target.div_ceil(page_size)),
                    "page_size={} target={}",
                    page_size,
                    target
                );
            }
        }
    }

    #[tokio::test]
    async fn test_oversized_page_is_fatal() {
        let store = ScriptedStore::new(vec![Ok(page(11, None))]);
        let result = run_round(&store, "1000", bounded(10), &fast_options()).await;
        assert!(matches!(
            result,
            Err(BenchError::Store(StoreError::Protocol(_)))
        ));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_issues_exactly_one_call() {
        let store = ScriptedStore::new(vec![
            Ok(page(4000, Some(4000))),
            Ok(page(4000, None)),
        ]);
        let state = run_round(
            &store,
            "1000",
            QueryTarget::SingleCallUnbounded,
            &fast_options(),
        )
        .await
        .unwrap();

        assert_eq!(state.queries_issued, 1);
        assert_eq!(state.items_retrieved, 4000);
        assert_eq!(state.stop, Some(StopReason::SingleCall));
        assert_eq!(store.calls()[0].0, querybench_shared::UNBOUNDED_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn test_empty_first_page_aborts() {
        let store = ScriptedStore::new(vec![Ok(page(0, None)), Ok(page(10, None))]);
        let result = run_round(&store, "1000", bounded(10), &fast_options()).await;

        match result {
            Err(BenchError::TableEmptyOrExhausted {
                queries_issued,
                items_retrieved,
            }) => {
                assert_eq!(queries_issued, 1);
                assert_eq!(items_retrieved, 0);
            }
            other => panic!("expected TableEmptyOrExhausted, got {:?}", other),
        }
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_later_page_aborts() {
        let store = ScriptedStore::new(vec![Ok(page(5, Some(5))), Ok(page(0, Some(5)))]);
        let result = run_round(&store, "1000", bounded(10), &fast_options()).await;
        assert!(matches!(
            result,
            Err(BenchError::TableEmptyOrExhausted {
                queries_issued: 2,
                items_retrieved: 5
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_cursor_ends_round_early() {
        let store = ScriptedStore::new(vec![Ok(page(30, Some(30))), Ok(page(20, None))]);
        let state = run_round(&store, "1000", bounded(100), &fast_options())
            .await
            .unwrap();

        assert_eq!(state.queries_issued, 2);
        assert_eq!(state.items_retrieved, 50);
        assert_eq!(state.remaining, 50);
        assert_eq!(state.stop, Some(StopReason::NoMoreData));
        assert!(state.cursor.is_none());
    }

    #[tokio::test]
    async fn test_same_script_gives_same_state() {
        let script = || {
            vec![
                Ok(page(10, Some(10))),
                Ok(page(10, Some(20))),
                Ok(page(5, None)),
            ]
        };

        let mut first = run_round(
            &ScriptedStore::new(script()),
            "1000",
            bounded(50),
            &fast_options(),
        )
        .await
        .unwrap();
        let mut second = run_round(
            &ScriptedStore::new(script()),
            "1000",
            bounded(50),
            &fast_options(),
        )
        .await
        .unwrap();

        first.elapsed_ms = 0.0;
        second.elapsed_ms = 0.0;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_run_rounds_sums_rounds() {
        let store = ScriptedStore::new(vec![
            Ok(page(100, Some(100))),
            Ok(page(100, Some(100))),
            Ok(page(100, Some(100))),
        ]);

        let mut seen = Vec::new();
        let summary = run_rounds_with(
            &store,
            "1000",
            3,
            bounded(100),
            &fast_options(),
            |round, state| seen.push((round, state.items_retrieved)),
        )
        .await
        .unwrap();

        assert_eq!(summary.totals.rounds, 3);
        assert_eq!(summary.totals.items_retrieved, 300);
        assert_eq!(summary.totals.queries_issued, 3);
        assert_eq!(seen, vec![(1, 100), (2, 100), (3, 100)]);
        assert!(summary.avg_ms_per_item >= 0.0);

        // Every round starts from the beginning of the partition
        assert!(store.calls().iter().all(|(_, cursor)| cursor.is_none()));
    }

    #[tokio::test]
    async fn test_zero_rounds_is_no_data() {
        let store = ScriptedStore::default();
        let result = run_rounds(&store, "1000", 0, bounded(10), &fast_options()).await;
        assert!(matches!(result, Err(BenchError::NoData { rounds: 0 })));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_error_in_later_round_discards_everything() {
        let store = ScriptedStore::new(vec![Ok(page(10, None)), Ok(page(0, None))]);
        let result = run_rounds(&store, "1000", 2, bounded(10), &fast_options()).await;
        assert!(matches!(
            result,
            Err(BenchError::TableEmptyOrExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_throttled_call_is_retried() {
        let store = ScriptedStore::new(vec![
            Err(StoreError::Throttled("ProvisionedThroughputExceeded".into())),
            Ok(page(10, None)),
        ]);
        let state = run_round(&store, "1000", bounded(10), &fast_options())
            .await
            .unwrap();

        assert_eq!(store.calls().len(), 2);
        assert_eq!(state.queries_issued, 2);
        assert_eq!(state.items_retrieved, 10);
    }

    #[tokio::test]
    async fn test_retries_count_towards_queries_issued() {
        let store = ScriptedStore::new(vec![
            Ok(page(4, Some(4))),
            Err(StoreError::Throttled("ThrottlingException".into())),
            Err(StoreError::Transient("ServiceUnavailable".into())),
            Ok(page(6, None)),
        ]);
        let state = run_round(&store, "1000", bounded(10), &fast_options())
            .await
            .unwrap();

        let calls = store.calls();
        assert_eq!(state.queries_issued, calls.len() as u64);
        assert_eq!(state.queries_issued, 4);
        assert_eq!(state.items_retrieved, 10);
        // A retried call repeats the same limit and cursor
        assert_eq!(calls[1], (6, Some(cursor_at(4))));
        assert_eq!(calls[3], (6, Some(cursor_at(4))));
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let store = ScriptedStore::new(vec![
            Err(StoreError::Fatal("ValidationException".into())),
            Ok(page(10, None)),
        ]);
        let result = run_round(&store, "1000", bounded(10), &fast_options()).await;

        assert!(matches!(result, Err(BenchError::Store(StoreError::Fatal(_)))));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let store = ScriptedStore::new(vec![Ok(page(10, None))]);
        let options = fast_options();
        options.cancel.cancel();

        let result = run_round(&store, "1000", bounded(10), &options).await;
        assert!(matches!(result, Err(BenchError::Cancelled)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_during_call() {
        let store = HangingStore {
            calls: Mutex::new(0),
        };
        let options = fast_options();
        let cancel = options.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result = run_round(&store, "1000", bounded(10), &options).await;
        assert!(matches!(result, Err(BenchError::Cancelled)));
        assert_eq!(*store.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_call_timeout_is_retried_then_surfaces() {
        let store = HangingStore {
            calls: Mutex::new(0),
        };
        let options = RoundOptions {
            call_timeout: Some(Duration::from_millis(5)),
            ..fast_options()
        };

        let result = run_round(&store, "1000", bounded(10), &options).await;
        assert!(matches!(
            result,
            Err(BenchError::Store(StoreError::Timeout(_)))
        ));
        assert_eq!(*store.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bytes_are_estimated_per_page() {
        let mut response = page(1, None);
        response.items[0].insert("a".into(), "bc".into());
        let expected = estimate_response_bytes(&response.items);

        let store = ScriptedStore::new(vec![Ok(response)]);
        let state = run_round(&store, "1000", bounded(1), &fast_options())
            .await
            .unwrap();
        assert_eq!(state.bytes, expected);
    }
}

//! Seed an in-memory table and benchmark it end to end

use querybench_harness::output::json::write_report;
use querybench_harness::output::BenchReport;
use querybench_harness::seed::{seed_table, Schema};
use querybench_harness::store::memory::MemoryStore;
use querybench_harness::table::{ensure_table, ActiveWait, CapacityRequest, TableSetup};
use querybench_harness::{run_round, run_rounds, BenchConfig, BenchError, RoundOptions};
use querybench_shared::{QueryTarget, StopReason};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

const PARTITION: &str = "1000";

async fn seeded_store(count: u64, schema: &str) -> MemoryStore {
    let store = MemoryStore::new("query_testing_table");
    let wait = ActiveWait {
        poll_interval: Duration::from_millis(1),
        max_wait: Duration::from_secs(1),
    };

    let setup = ensure_table(
        &store,
        &CapacityRequest::default(),
        false,
        &wait,
        || true,
        |_| {},
    )
    .await
    .unwrap();
    assert!(matches!(setup, TableSetup::Created(_)));

    let schema = Schema::parse(schema).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    seed_table(&store, &schema, PARTITION, count, &mut rng, |_| {})
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_bounded_rounds_over_seeded_table() {
    let store = seeded_store(1000, "field1,20\nfield2,40\n").await;

    let summary = run_rounds(
        &store,
        PARTITION,
        3,
        QueryTarget::from(250),
        &RoundOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.totals.rounds, 3);
    assert_eq!(summary.totals.items_retrieved, 750);
    assert_eq!(summary.totals.queries_issued, 3);
    assert!(summary.totals.bytes > 0);
    assert!(summary.totals.consumed_capacity > 0.0);
    assert!(summary.avg_ms_per_item >= 0.0);
}

#[tokio::test]
async fn test_target_beyond_table_size_stops_at_end() {
    let store = seeded_store(40, "field1,10\n").await;

    let state = run_round(
        &store,
        PARTITION,
        QueryTarget::from(100),
        &RoundOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(state.items_retrieved, 40);
    assert_eq!(state.queries_issued, 1);
    assert_eq!(state.stop, Some(StopReason::NoMoreData));
}

#[tokio::test]
async fn test_unbounded_round_hits_response_size_ceiling() {
    // ~100 KB items: one response holds ten of them
    let store = seeded_store(30, "payload,102400\n").await;

    let state = run_round(
        &store,
        PARTITION,
        QueryTarget::SingleCallUnbounded,
        &RoundOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(state.queries_issued, 1);
    assert_eq!(state.items_retrieved, 10);
    assert_eq!(state.stop, Some(StopReason::SingleCall));
    assert!(state.cursor.is_some());
}

#[tokio::test]
async fn test_bounded_round_pages_past_size_ceiling() {
    let store = seeded_store(30, "payload,102400\n").await;

    let state = run_round(
        &store,
        PARTITION,
        QueryTarget::from(25),
        &RoundOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(state.items_retrieved, 25);
    assert_eq!(state.queries_issued, 3);
    assert_eq!(state.stop, Some(StopReason::TargetReached));
}

#[tokio::test]
async fn test_unseeded_table_is_reported() {
    let store = seeded_store(0, "field1,10\n").await;

    let result = run_rounds(
        &store,
        PARTITION,
        2,
        QueryTarget::from(10),
        &RoundOptions::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(BenchError::TableEmptyOrExhausted {
            queries_issued: 1,
            items_retrieved: 0
        })
    ));
}

#[tokio::test]
async fn test_report_for_seeded_run() {
    let store = seeded_store(100, "field1,5\n").await;
    let summary = run_rounds(
        &store,
        PARTITION,
        2,
        QueryTarget::from(50),
        &RoundOptions::default(),
    )
    .await
    .unwrap();

    let report = BenchReport::new(&BenchConfig::default(), summary);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    write_report(&report, &path).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["rounds"], 2);
    assert_eq!(parsed["summary"]["totals"]["items_retrieved"], 100);
}

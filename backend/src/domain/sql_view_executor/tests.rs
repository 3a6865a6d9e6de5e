//! Unit tests for SQL view execution orchestration.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pagination::PageProgress;
use rstest::{fixture, rstest};
use serde_json::json;
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;

use super::*;
use crate::domain::CellValue;
use crate::domain::ports::{
    FixtureSqlViewSource, MockResultCacheStore, MockSqlViewSource, ResultCacheError,
};
use crate::outbound::cache::InMemoryResultCache;
use crate::test_support::{
    MutableClock, NoJitter, RecordingSleeper, ScriptedSqlViewSource, grid_page, object_page,
};

#[fixture]
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid time")
}

fn config() -> SqlViewExecutorConfig {
    SqlViewExecutorConfig {
        max_rows: 100_000,
        page_limit: 20,
        transport_attempts: 2,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
    }
}

struct Harness {
    executor: SqlViewExecutor,
    source: Arc<ScriptedSqlViewSource>,
    cache: Arc<InMemoryResultCache>,
    sleeper: Arc<RecordingSleeper>,
}

fn harness_with(
    now: DateTime<Utc>,
    source: ScriptedSqlViewSource,
    config: SqlViewExecutorConfig,
) -> Harness {
    let clock = Arc::new(MutableClock::new(now));
    let source = Arc::new(source);
    let cache = Arc::new(InMemoryResultCache::new(clock.clone()));
    let sleeper = Arc::new(RecordingSleeper::default());
    let executor = SqlViewExecutor::with_runtime(
        SqlViewExecutorPorts::new(source.clone(), cache.clone()),
        clock,
        SqlViewExecutorRuntime {
            sleeper: sleeper.clone(),
            jitter: Arc::new(NoJitter),
        },
        config,
    );
    Harness {
        executor,
        source,
        cache,
        sleeper,
    }
}

fn harness(now: DateTime<Utc>, source: ScriptedSqlViewSource) -> Harness {
    harness_with(now, source, config())
}

fn recording_hooks() -> (ExecutionHooks, Arc<Mutex<Vec<PageProgress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let hooks = ExecutionHooks::new().with_progress(move |progress| {
        sink.lock().expect("progress mutex").push(progress);
    });
    (hooks, events)
}

#[rstest]
#[tokio::test]
async fn three_pages_are_merged_in_order(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([
            grid_page(1, 3, 0, 50),
            grid_page(2, 3, 50, 50),
            grid_page(3, 3, 100, 17),
        ]),
    );
    let (hooks, events) = recording_hooks();

    let execution = h
        .executor
        .execute_with(ExecutionRequest::new("qMYMT0iUGkG"), hooks)
        .await
        .expect("execution succeeds");

    assert_eq!(execution.table.row_count(), 117);
    assert_eq!(execution.table.headers(), ["uid", "name"]);
    assert_eq!(execution.table.rows()[0]["uid"], CellValue::from("row0000000"));
    assert_eq!(execution.table.rows()[116]["uid"], CellValue::from("row0000116"));
    assert_eq!(execution.pages_fetched, 3);
    assert_eq!(execution.origin, ExecutionOrigin::Network);
    assert_eq!(execution.warning, None);

    let pages: Vec<u32> = h.source.requests().iter().map(|r| r.page.get()).collect();
    assert_eq!(pages, [1, 2, 3]);

    let events = events.lock().expect("progress mutex").clone();
    let rows: Vec<usize> = events.iter().map(|event| event.rows_so_far).collect();
    assert_eq!(rows, [50, 100, 117]);
    assert_eq!(
        events.iter().map(|event| event.pages_fetched).collect::<Vec<_>>(),
        [1, 2, 3]
    );
}

#[rstest]
#[tokio::test]
async fn identical_request_is_served_from_cache(now: DateTime<Utc>) {
    let h = harness(now, ScriptedSqlViewSource::pages([grid_page(1, 1, 0, 5)]));

    let first = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("first execution succeeds");
    let second = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("second execution succeeds");

    assert_eq!(h.source.calls(), 1);
    assert_eq!(second.origin, ExecutionOrigin::Cache);
    assert_eq!(second.pages_fetched, 0);
    assert_eq!(second.table, first.table);
}

#[rstest]
#[tokio::test]
async fn cache_bypass_neither_reads_nor_writes(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([grid_page(1, 1, 0, 5), grid_page(1, 1, 0, 5)]),
    );
    let request = ExecutionRequest::new("qMYMT0iUGkG").without_cache();

    h.executor.execute(request.clone()).await.expect("first succeeds");
    let second = h.executor.execute(request).await.expect("second succeeds");

    assert_eq!(h.source.calls(), 2);
    assert_eq!(second.origin, ExecutionOrigin::Network);
    assert!(h.cache.list().await.expect("list succeeds").is_empty());
}

#[rstest]
#[tokio::test]
async fn page_limit_returns_partial_table_with_warning(now: DateTime<Utc>) {
    let pages = (1..=25).map(|page| grid_page(page, 25, (page as usize - 1) * 10, 10));
    let h = harness(now, ScriptedSqlViewSource::pages(pages));

    let execution = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("limit is not an error");

    assert_eq!(h.source.calls(), 20);
    assert_eq!(execution.pages_fetched, 20);
    assert_eq!(execution.table.row_count(), 200);
    assert_eq!(
        execution.warning,
        Some(ExecutionWarning::PageLimitExceeded {
            limit: 20,
            rows: 200
        })
    );
    assert_eq!(h.cache.list().await.expect("list succeeds").len(), 1);
}

#[rstest]
#[tokio::test]
async fn cached_partial_result_keeps_its_page_limit_warning(now: DateTime<Utc>) {
    let pages = (1..=25).map(|page| grid_page(page, 25, (page as usize - 1) * 10, 10));
    let h = harness(now, ScriptedSqlViewSource::pages(pages));
    let expected = Some(ExecutionWarning::PageLimitExceeded {
        limit: 20,
        rows: 200,
    });

    let fetched = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("first run succeeds");
    let cached = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("second run succeeds");

    assert_eq!(h.source.calls(), 20);
    assert_eq!(fetched.warning, expected);
    assert_eq!(cached.origin, ExecutionOrigin::Cache);
    assert_eq!(cached.warning, expected);
    assert_eq!(cached.table.row_count(), 200);
}

#[rstest]
#[tokio::test]
async fn empty_page_ends_an_unpaged_result(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([object_page(0, 2), object_page(2, 1), object_page(3, 0)]),
    );

    let execution = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("execution succeeds");

    assert_eq!(h.source.calls(), 3);
    assert_eq!(execution.table.row_count(), 3);
    assert!(execution.header_drift.is_empty());
}

#[rstest]
#[tokio::test]
async fn transport_failure_is_retried_once_with_backoff(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::scripted(vec![
            Err(SqlViewSourceError::transport("connection reset")),
            Ok(RawPage::new(grid_page(1, 1, 0, 3))),
        ]),
    );

    let execution = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("retry succeeds");

    assert_eq!(execution.table.row_count(), 3);
    assert_eq!(h.source.calls(), 2);
    assert_eq!(h.sleeper.delays(), [Duration::from_millis(100)]);
}

#[rstest]
#[tokio::test]
async fn second_transport_failure_is_terminal(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::scripted(vec![
            Ok(RawPage::new(grid_page(1, 2, 0, 3))),
            Err(SqlViewSourceError::timeout("30s elapsed")),
            Err(SqlViewSourceError::status(502_u16, "status 502")),
        ]),
    );

    let error = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect_err("retries exhausted");

    assert_eq!(
        error,
        SqlViewExecutionError::Upstream {
            page: 2,
            attempts: 2,
            source: SqlViewSourceError::status(502_u16, "status 502"),
        }
    );
    assert!(h.cache.list().await.expect("list succeeds").is_empty());
}

#[rstest]
#[case(400)]
#[case(404)]
#[case(429)]
#[tokio::test]
async fn client_errors_are_never_retried(now: DateTime<Utc>, #[case] status: u16) {
    let h = harness(
        now,
        ScriptedSqlViewSource::scripted(vec![Err(SqlViewSourceError::status(
            status,
            format!("status {status}"),
        ))]),
    );

    let error = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect_err("client error is terminal");

    assert!(matches!(
        error,
        SqlViewExecutionError::Upstream { page: 1, attempts: 1, .. }
    ));
    assert_eq!(h.source.calls(), 1);
    assert!(h.sleeper.delays().is_empty());
}

#[rstest]
#[tokio::test]
async fn unrecognised_page_aborts_with_page_and_keys(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([
            grid_page(1, 3, 0, 5),
            json!({ "status": "ERROR", "httpStatusCode": 500 }),
        ]),
    );

    let error = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect_err("shape error is terminal");

    let SqlViewExecutionError::UnrecognizedResponseShape { page, shape } = error else {
        panic!("expected shape error, got {error:?}");
    };
    assert_eq!(page, 2);
    assert_eq!(shape.keys(), ["httpStatusCode", "status"]);
    assert_eq!(h.source.calls(), 2);
    assert!(h.cache.list().await.expect("list succeeds").is_empty());
}

#[rstest]
#[tokio::test]
async fn header_drift_is_recorded_and_conformed(now: DateTime<Utc>) {
    let drifted = json!({
        "pager": { "page": 2, "pageCount": 2 },
        "listGrid": {
            "headers": [{ "name": "uid" }, { "name": "code" }],
            "rows": [["late", "C-1"]],
        },
    });
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([grid_page(1, 2, 0, 2), drifted]),
    );

    let execution = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("drift is not fatal");

    assert_eq!(
        execution.header_drift,
        [HeaderDrift {
            page: 2,
            extra: vec!["code".to_owned()],
            missing: vec!["name".to_owned()],
        }]
    );
    let last = &execution.table.rows()[2];
    assert_eq!(last["uid"], CellValue::from("late"));
    assert_eq!(last["name"], CellValue::Null);
    assert!(!last.contains_key("code"));

    let cached = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("cached run succeeds");
    assert_eq!(cached.origin, ExecutionOrigin::Cache);
    assert_eq!(cached.header_drift, execution.header_drift);
}

#[rstest]
#[tokio::test]
async fn row_cap_truncates_and_stops(now: DateTime<Utc>) {
    let mut cfg = config();
    cfg.max_rows = 60;
    let h = harness_with(
        now,
        ScriptedSqlViewSource::pages([
            grid_page(1, 3, 0, 50),
            grid_page(2, 3, 50, 50),
            grid_page(3, 3, 100, 50),
        ]),
        cfg,
    );

    let execution = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("cap is not an error");

    assert_eq!(h.source.calls(), 2);
    assert_eq!(execution.table.row_count(), 60);
    assert_eq!(
        execution.warning,
        Some(ExecutionWarning::RowCapReached { max_rows: 60 })
    );
}

#[rstest]
#[tokio::test]
async fn cancellation_stops_fetching_and_skips_the_cache(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([grid_page(1, 3, 0, 5), grid_page(2, 3, 5, 5)]),
    );
    let flag = CancellationFlag::new();
    let trigger = flag.clone();
    let hooks = ExecutionHooks::new()
        .with_cancellation(flag)
        .with_progress(move |_| trigger.cancel());

    let error = h
        .executor
        .execute_with(ExecutionRequest::new("qMYMT0iUGkG"), hooks)
        .await
        .expect_err("cancelled");

    assert_eq!(error, SqlViewExecutionError::Cancelled { pages_fetched: 1 });
    assert_eq!(h.source.calls(), 1);
    assert!(h.cache.list().await.expect("list succeeds").is_empty());
}

#[rstest]
#[tokio::test]
async fn cancelled_flag_prevents_the_first_request(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([grid_page(1, 1, 0, 1)]),
    );
    let flag = CancellationFlag::new();
    let hooks = ExecutionHooks::new().with_cancellation(flag.clone());
    flag.cancel();

    let error = h
        .executor
        .execute_with(ExecutionRequest::new("qMYMT0iUGkG"), hooks)
        .await
        .expect_err("cancelled");

    assert_eq!(error, SqlViewExecutionError::Cancelled { pages_fetched: 0 });
    assert_eq!(h.source.calls(), 0);
}

#[rstest]
#[tokio::test]
async fn missing_parameter_fails_before_any_fetch(now: DateTime<Utc>) {
    let h = harness(now, ScriptedSqlViewSource::pages([grid_page(1, 1, 0, 1)]));
    let request = ExecutionRequest::new("qMYMT0iUGkG")
        .with_template("SELECT * WHERE ou = ${orgUnit}")
        .with_parameter("orgUnit", "")
        .with_parameter("region", "east");

    let error = h.executor.execute(request).await.expect_err("missing");

    assert_eq!(
        error,
        SqlViewExecutionError::MissingParameter(MissingParameter::new("orgUnit"))
    );
    assert_eq!(h.source.calls(), 0);
}

#[rstest]
#[case("")]
#[case("   ")]
#[tokio::test]
async fn blank_sql_view_id_is_rejected(now: DateTime<Utc>, #[case] id: &str) {
    let h = harness(now, ScriptedSqlViewSource::pages([]));

    let error = h
        .executor
        .execute(ExecutionRequest::new(id))
        .await
        .expect_err("blank id");

    assert!(matches!(error, SqlViewExecutionError::InvalidRequest { .. }));
}

#[rstest]
#[tokio::test]
async fn only_declared_parameters_and_non_blank_filters_are_sent(now: DateTime<Utc>) {
    let h = harness(now, ScriptedSqlViewSource::pages([grid_page(1, 1, 0, 1)]));
    let request = ExecutionRequest::new("qMYMT0iUGkG")
        .with_template("SELECT * WHERE ou = '${orgUnit}' AND pe = '${period}'")
        .with_parameter("orgUnit", " ImspTQPwCqd ")
        .with_parameter("region", "east")
        .with_default("period", "2025")
        .with_filter("level", "2")
        .with_filter("name", "  ");

    h.executor.execute(request).await.expect("execution succeeds");

    let sent = h.source.requests().remove(0);
    assert_eq!(
        sent.parameters.iter().collect::<Vec<_>>(),
        [("orgUnit", "ImspTQPwCqd"), ("period", "2025")]
    );
    assert_eq!(
        sent.filters,
        BTreeMap::from([("level".to_owned(), "2".to_owned())])
    );
}

#[rstest]
#[tokio::test]
async fn different_filters_do_not_share_a_cache_entry(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([grid_page(1, 1, 0, 1), grid_page(1, 1, 0, 1)]),
    );

    h.executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG").with_filter("level", "2"))
        .await
        .expect("first succeeds");
    let second = h
        .executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG").with_filter("level", "3"))
        .await
        .expect("second succeeds");

    assert_eq!(second.origin, ExecutionOrigin::Network);
    assert_eq!(h.source.calls(), 2);
}

#[rstest]
#[tokio::test]
async fn concurrent_identical_requests_share_one_fetch(now: DateTime<Utc>) {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let h = harness(
        now,
        ScriptedSqlViewSource::blocking(
            vec![Ok(RawPage::new(grid_page(1, 1, 0, 4)))],
            entered_tx,
            release.clone(),
        ),
    );

    let leader = h.executor.clone();
    let first = tokio::spawn(async move { leader.execute(ExecutionRequest::new("qMYMT0iUGkG")).await });
    timeout(Duration::from_secs(1), entered_rx.recv())
        .await
        .expect("first entered")
        .expect("entry exists");

    let follower = h.executor.clone();
    let second =
        tokio::spawn(async move { follower.execute(ExecutionRequest::new("qMYMT0iUGkG")).await });
    assert!(
        timeout(Duration::from_millis(80), entered_rx.recv())
            .await
            .is_err()
    );

    release.notify_one();
    let first = first.await.expect("first join").expect("first succeeds");
    let second = second.await.expect("second join").expect("second succeeds");

    assert_eq!(h.source.calls(), 1);
    assert_eq!(first.origin, ExecutionOrigin::Network);
    assert_eq!(second.origin, ExecutionOrigin::Shared);
    assert!(Arc::ptr_eq(&first.table, &second.table));
    assert_eq!(h.executor.state.in_flight.len(), 0);
}

#[rstest]
#[tokio::test]
async fn followers_receive_the_leaders_failure(now: DateTime<Utc>) {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let h = harness(
        now,
        ScriptedSqlViewSource::blocking(
            vec![Err(SqlViewSourceError::status(404_u16, "status 404"))],
            entered_tx,
            release.clone(),
        ),
    );

    let leader = h.executor.clone();
    let first = tokio::spawn(async move { leader.execute(ExecutionRequest::new("qMYMT0iUGkG")).await });
    timeout(Duration::from_secs(1), entered_rx.recv())
        .await
        .expect("first entered")
        .expect("entry exists");
    let follower = h.executor.clone();
    let second =
        tokio::spawn(async move { follower.execute(ExecutionRequest::new("qMYMT0iUGkG")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    release.notify_one();
    let first = first.await.expect("first join").expect_err("first fails");
    let second = second.await.expect("second join").expect_err("second fails");

    assert_eq!(first, second);
    assert_eq!(h.source.calls(), 1);
}

#[rstest]
#[tokio::test]
async fn follower_survives_the_leaders_cancellation(now: DateTime<Utc>) {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let h = harness(
        now,
        ScriptedSqlViewSource::blocking(
            vec![Ok(RawPage::new(grid_page(1, 1, 0, 4)))],
            entered_tx,
            release.clone(),
        ),
    );

    let flag = CancellationFlag::new();
    let leader = h.executor.clone();
    let leader_hooks = ExecutionHooks::new().with_cancellation(flag.clone());
    let first = tokio::spawn(async move {
        leader
            .execute_with(ExecutionRequest::new("qMYMT0iUGkG"), leader_hooks)
            .await
    });
    timeout(Duration::from_secs(1), entered_rx.recv())
        .await
        .expect("first entered")
        .expect("entry exists");

    let (follower_hooks, follower_events) = recording_hooks();
    let follower = h.executor.clone();
    let second = tokio::spawn(async move {
        follower
            .execute_with(ExecutionRequest::new("qMYMT0iUGkG"), follower_hooks)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    flag.cancel();
    let first = first.await.expect("first join").expect_err("leader cancelled");
    assert_eq!(first, SqlViewExecutionError::Cancelled { pages_fetched: 0 });

    release.notify_one();
    let second = second.await.expect("second join").expect("follower succeeds");

    assert_eq!(second.origin, ExecutionOrigin::Shared);
    assert_eq!(second.table.row_count(), 4);
    assert_eq!(h.source.calls(), 1);
    assert_eq!(follower_events.lock().expect("progress mutex").len(), 1);
    assert_eq!(h.cache.list().await.expect("list succeeds").len(), 1);
    assert_eq!(h.executor.state.in_flight.len(), 0);
}

#[rstest]
#[tokio::test]
async fn dropped_leader_does_not_strand_later_callers(now: DateTime<Utc>) {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let h = harness(
        now,
        ScriptedSqlViewSource::blocking(
            vec![Ok(RawPage::new(grid_page(1, 1, 0, 3)))],
            entered_tx,
            release.clone(),
        ),
    );

    let abandoned = timeout(
        Duration::from_millis(50),
        h.executor.execute(ExecutionRequest::new("qMYMT0iUGkG")),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(entered_rx.recv().await, Some(1));
    assert_eq!(h.executor.state.in_flight.len(), 0);

    let (hooks, events) = recording_hooks();
    let retry = h.executor.clone();
    let next = tokio::spawn(async move {
        retry
            .execute_with(ExecutionRequest::new("qMYMT0iUGkG"), hooks)
            .await
    });
    timeout(Duration::from_secs(1), entered_rx.recv())
        .await
        .expect("second entered")
        .expect("entry exists");
    release.notify_one();
    let execution = next.await.expect("join").expect("fresh execution succeeds");

    assert_eq!(execution.origin, ExecutionOrigin::Network);
    assert_eq!(execution.table.row_count(), 3);
    assert_eq!(events.lock().expect("progress mutex").len(), 1);
    assert_eq!(h.source.calls(), 2);
}

#[rstest]
#[tokio::test]
async fn progress_events_stream_over_a_channel(now: DateTime<Utc>) {
    let h = harness(
        now,
        ScriptedSqlViewSource::pages([grid_page(1, 2, 0, 10), grid_page(2, 2, 10, 4)]),
    );

    let (handle, mut events) = h
        .executor
        .execute_with_events(ExecutionRequest::new("qMYMT0iUGkG"), CancellationFlag::new());

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }
    let execution = handle.await.expect("join").expect("execution succeeds");

    assert_eq!(execution.table.row_count(), 14);
    assert_eq!(
        received,
        [
            PageProgress {
                pages_fetched: 1,
                rows_so_far: 10,
                estimated_total: None
            },
            PageProgress {
                pages_fetched: 2,
                rows_so_far: 14,
                estimated_total: None
            },
        ]
    );
}

#[rstest]
#[tokio::test]
async fn cache_failures_do_not_fail_the_execution(now: DateTime<Utc>) {
    let mut cache = MockResultCacheStore::new();
    cache
        .expect_get()
        .times(1)
        .returning(|_| Err(ResultCacheError::backend("lookup unavailable")));
    cache
        .expect_put()
        .times(1)
        .returning(|_| Err(ResultCacheError::backend("write unavailable")));
    let source = Arc::new(ScriptedSqlViewSource::pages([grid_page(1, 1, 0, 2)]));
    let executor = SqlViewExecutor::with_runtime(
        SqlViewExecutorPorts::new(source.clone(), Arc::new(cache)),
        Arc::new(MutableClock::new(now)),
        SqlViewExecutorRuntime {
            sleeper: Arc::new(RecordingSleeper::default()),
            jitter: Arc::new(NoJitter),
        },
        config(),
    );

    let execution = executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("cache failures are logged only");

    assert_eq!(execution.table.row_count(), 2);
    assert_eq!(source.calls(), 1);
}

#[rstest]
#[case(1, 100)]
#[case(2, 200)]
#[case(3, 400)]
#[case(5, 1_000)]
fn retry_delay_doubles_up_to_the_cap(now: DateTime<Utc>, #[case] attempt: u32, #[case] millis: u64) {
    let h = harness(now, ScriptedSqlViewSource::pages([]));
    assert_eq!(
        h.executor.state.retry_base_delay(attempt),
        Duration::from_millis(millis)
    );
}

#[rstest]
#[tokio::test]
async fn empty_view_yields_an_empty_table(now: DateTime<Utc>) {
    let clock = Arc::new(MutableClock::new(now));
    let executor = SqlViewExecutor::with_runtime(
        SqlViewExecutorPorts::new(
            Arc::new(FixtureSqlViewSource),
            Arc::new(InMemoryResultCache::new(clock.clone())),
        ),
        clock,
        SqlViewExecutorRuntime {
            sleeper: Arc::new(RecordingSleeper::default()),
            jitter: Arc::new(NoJitter),
        },
        config(),
    );

    let execution = executor
        .execute(ExecutionRequest::new("qMYMT0iUGkG"))
        .await
        .expect("empty view succeeds");

    assert!(execution.table.is_empty());
    assert!(execution.table.headers().is_empty());
    assert_eq!(execution.pages_fetched, 1);
    assert_eq!(execution.warning, None);
}

#[rstest]
#[tokio::test]
async fn undecodable_body_is_not_retried(now: DateTime<Utc>) {
    let mut source = MockSqlViewSource::new();
    source
        .expect_fetch_page()
        .withf(|request| request.page.get() == 1 && request.sql_view_id == "qMYMT0iUGkG")
        .times(1)
        .returning(|_| Err(SqlViewSourceError::decode("expected value at line 1")));
    let clock = Arc::new(MutableClock::new(now));
    let sleeper = Arc::new(RecordingSleeper::default());
    let executor = SqlViewExecutor::with_runtime(
        SqlViewExecutorPorts::new(
            Arc::new(source),
            Arc::new(InMemoryResultCache::new(clock.clone())),
        ),
        clock,
        SqlViewExecutorRuntime {
            sleeper: sleeper.clone(),
            jitter: Arc::new(NoJitter),
        },
        config(),
    );

    let error = executor
        .execute(ExecutionRequest::new(" qMYMT0iUGkG "))
        .await
        .expect_err("decode failure is terminal");

    assert!(matches!(
        error,
        SqlViewExecutionError::Upstream {
            page: 1,
            attempts: 1,
            source: SqlViewSourceError::Decode { .. },
        }
    ));
    assert!(sleeper.delays().is_empty());
}

//! Shared test doubles for SQL view executor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use tracing::debug;

use crate::domain::ports::{RawPage, SqlViewPageRequest, SqlViewSource, SqlViewSourceError};
use crate::domain::{BackoffJitter, RetrySleeper};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clock whose time only moves when a test advances it.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    /// Clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Move time forward by `delta`.
    ///
    /// # Panics
    ///
    /// Panics when `delta` does not fit a [`TimeDelta`].
    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}",)
            }
        };
        *lock(&self.0) += delta;
    }

    /// Move time forward by whole seconds.
    pub fn advance_seconds(&self, seconds: i64) {
        *lock(&self.0) += TimeDelta::seconds(seconds);
    }

    /// Move time forward by whole minutes.
    pub fn advance_minutes(&self, minutes: i64) {
        *lock(&self.0) += TimeDelta::minutes(minutes);
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

/// Sleeper that returns at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl RetrySleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Sleeper that records each requested delay and returns at once.
#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<Duration>>);

impl RecordingSleeper {
    /// Delays requested so far.
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.0).clone()
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.0).push(duration);
    }
}

/// Jitter that leaves the base delay unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32, _now: DateTime<Utc>) -> Duration {
        base
    }
}

type ScriptedPage = Result<RawPage, SqlViewSourceError>;

/// Page source that replays a fixed script of responses.
///
/// Every request is recorded. A blocking source reports each entry on
/// `entered` and then waits for `release` before answering.
pub struct ScriptedSqlViewSource {
    scripted: Mutex<VecDeque<ScriptedPage>>,
    requests: Mutex<Vec<SqlViewPageRequest>>,
    calls: AtomicUsize,
    entered: Option<mpsc::UnboundedSender<u32>>,
    release: Option<Arc<Notify>>,
}

impl ScriptedSqlViewSource {
    /// Script that answers with each result in turn.
    pub fn scripted(scripted: Vec<ScriptedPage>) -> Self {
        Self {
            scripted: Mutex::new(scripted.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            entered: None,
            release: None,
        }
    }

    /// Script that answers with each body in turn.
    pub fn pages(bodies: impl IntoIterator<Item = Value>) -> Self {
        Self::scripted(bodies.into_iter().map(|body| Ok(RawPage::new(body))).collect())
    }

    /// Like [`Self::scripted`], but each request is announced on `entered`
    /// and held until `release` is notified.
    pub fn blocking(
        scripted: Vec<ScriptedPage>,
        entered: mpsc::UnboundedSender<u32>,
        release: Arc<Notify>,
    ) -> Self {
        Self {
            entered: Some(entered),
            release: Some(release),
            ..Self::scripted(scripted)
        }
    }

    /// Number of page requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<SqlViewPageRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl SqlViewSource for ScriptedSqlViewSource {
    async fn fetch_page(&self, request: &SqlViewPageRequest) -> Result<RawPage, SqlViewSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        if let Some(entered) = &self.entered {
            if entered.send(request.page.get()).is_err() {
                debug!(page = request.page.get(), "nobody is watching blocked requests");
            }
        }
        if let Some(release) = &self.release {
            release.notified().await;
        }
        lock(&self.scripted).pop_front().unwrap_or_else(|| {
            Err(SqlViewSourceError::invalid_request(
                "source script exhausted unexpectedly",
            ))
        })
    }
}

/// A `listGrid` page of `rows` rows with headers `uid` and `name` and a pager.
///
/// Row values are numbered from `first_row` so pages can be told apart.
pub fn grid_page(page: u32, page_count: u32, first_row: usize, rows: usize) -> Value {
    let rows: Vec<Value> = (first_row..first_row + rows)
        .map(|index| json!([format!("row{index:07}"), format!("Row {index}")]))
        .collect();
    json!({
        "pager": { "page": page, "pageCount": page_count },
        "listGrid": {
            "headers": [{ "name": "uid" }, { "name": "name" }],
            "rows": rows,
        },
    })
}

/// A bare array page without pager metadata.
pub fn object_page(first_row: usize, rows: usize) -> Value {
    Value::Array(
        (first_row..first_row + rows)
            .map(|index| json!({ "uid": format!("row{index:07}"), "name": format!("Row {index}") }))
            .collect(),
    )
}

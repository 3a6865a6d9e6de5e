//! Multi-page SQL view execution.
//!
//! The executor owns the whole life of one execution: parameter
//! reconciliation, the cache lookup, single-flight coalescing per
//! fingerprint, the page loop with its stopping rules, transport retries
//! (jittered exponential backoff) and the final cache write. Page bodies are
//! normalised through [`normalize`](crate::domain::normalize) and merged in
//! upstream order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mockable::Clock;
use pagination::{PageNumber, PageProgress, Pager};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::domain::canonical_table::CanonicalTable;
use crate::domain::fingerprint::ExecutionFingerprint;
use crate::domain::ports::{
    NewCacheEntry, RawPage, ResultCacheStore, SqlViewPageRequest, SqlViewSource,
    SqlViewSourceError,
};
use crate::domain::response_shape::{UnrecognizedResponseShape, normalize};
use crate::domain::sql_view_parameters::{
    MissingParameter, Placeholders, SqlViewParameters, build_parameters, extract_placeholders,
};

mod accumulator;
mod attempt_error;
mod runtime;
mod single_flight;

use accumulator::TableAccumulator;
use attempt_error::AttemptError;
pub use runtime::{AttemptJitter, SqlViewExecutorPorts, SqlViewExecutorRuntime, TokioSleeper};
use single_flight::{FetchResult, FlightHandle, InFlight, Subscriber};

/// Hard upper bound on pages fetched by one execution.
pub const PAGE_LIMIT: u32 = 20;

/// Default cache lifetime for execution results.
pub const DEFAULT_CACHE_EXPIRY_MINUTES: u32 = 60;

/// Executor configuration controlling stopping rules and retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlViewExecutorConfig {
    /// Row cap; the accumulated table never grows beyond it.
    pub max_rows: usize,
    /// Page-count safety limit.
    pub page_limit: u32,
    /// Page request attempts per page (including the first call).
    pub transport_attempts: u32,
    /// Initial retry backoff.
    pub initial_backoff: Duration,
    /// Maximum retry backoff cap.
    pub max_backoff: Duration,
}

impl Default for SqlViewExecutorConfig {
    fn default() -> Self {
        Self {
            max_rows: 100_000,
            page_limit: PAGE_LIMIT,
            transport_attempts: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// One request to run a SQL view.
///
/// # Examples
/// ```
/// use sqlview_backend::domain::ExecutionRequest;
///
/// let request = ExecutionRequest::new("qMYMT0iUGkG")
///     .with_template("SELECT * FROM orgunit WHERE uid = '${orgUnit}'")
///     .with_parameter("orgUnit", "ImspTQPwCqd")
///     .with_filter("level", "2");
/// assert!(request.use_cache);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Server-side SQL view identifier.
    pub sql_view_id: String,
    /// Query text declaring `${name}` placeholders. When absent, the keys of
    /// `parameters` are taken as the declared set.
    pub query_template: Option<String>,
    /// User-supplied placeholder values.
    pub parameters: BTreeMap<String, String>,
    /// Fallback values for placeholders the user left blank.
    pub parameter_defaults: BTreeMap<String, String>,
    /// Column criteria forwarded upstream.
    pub filters: BTreeMap<String, String>,
    /// Whether the cache may answer and will store the result.
    pub use_cache: bool,
    /// Minutes the stored result stays fresh.
    pub cache_expiry_minutes: u32,
}

impl ExecutionRequest {
    /// Request with no parameters, no filters and the default cache policy.
    pub fn new(sql_view_id: impl Into<String>) -> Self {
        Self {
            sql_view_id: sql_view_id.into(),
            query_template: None,
            parameters: BTreeMap::new(),
            parameter_defaults: BTreeMap::new(),
            filters: BTreeMap::new(),
            use_cache: true,
            cache_expiry_minutes: DEFAULT_CACHE_EXPIRY_MINUTES,
        }
    }

    /// Declare the query text whose placeholders are substituted.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = Some(template.into());
        self
    }

    /// Supply one placeholder value.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Supply one placeholder default.
    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameter_defaults.insert(name.into(), value.into());
        self
    }

    /// Add one column filter.
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Bypass the cache for both lookup and storage.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Override the cache lifetime.
    #[must_use]
    pub fn with_cache_expiry_minutes(mut self, minutes: u32) -> Self {
        self.cache_expiry_minutes = minutes;
        self
    }

    fn declared_placeholders(&self) -> Placeholders {
        match &self.query_template {
            Some(template) => extract_placeholders(template),
            None => self.parameters.keys().cloned().collect(),
        }
    }
}

/// Where an execution's table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOrigin {
    /// A fresh cache entry answered without network calls.
    Cache,
    /// This call fetched the pages itself.
    Network,
    /// This call awaited an identical execution already in flight.
    Shared,
}

/// Non-fatal condition attached to a successful execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionWarning {
    /// More pages remained when the page-count safety limit was hit.
    PageLimitExceeded {
        /// Limit that stopped the execution.
        limit: u32,
        /// Rows accumulated up to the limit.
        rows: usize,
    },
    /// The row cap truncated the result.
    RowCapReached {
        /// Configured row cap.
        max_rows: usize,
    },
}

/// Header difference between a later page and the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDrift {
    /// Page whose headers differed.
    pub page: u32,
    /// Columns on that page missing from the first page; their values were
    /// dropped.
    pub extra: Vec<String>,
    /// First-page columns absent from that page; filled with null.
    pub missing: Vec<String>,
}

impl HeaderDrift {
    fn between(page: u32, expected: &[String], observed: &[String]) -> Option<Self> {
        // An empty record page carries no header information.
        if observed.is_empty() {
            return None;
        }
        let extra: Vec<String> = observed
            .iter()
            .filter(|name| !expected.contains(name))
            .cloned()
            .collect();
        let missing: Vec<String> = expected
            .iter()
            .filter(|name| !observed.contains(name))
            .cloned()
            .collect();
        (!extra.is_empty() || !missing.is_empty()).then_some(Self {
            page,
            extra,
            missing,
        })
    }
}

/// Successful execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlViewExecution {
    /// Merged table, shared with the cache.
    pub table: Arc<CanonicalTable>,
    /// Pages fetched to build the table; zero for cache hits.
    pub pages_fetched: u32,
    /// Where the table came from.
    pub origin: ExecutionOrigin,
    /// Set when the table is partial.
    pub warning: Option<ExecutionWarning>,
    /// Pages whose headers differed from the first page.
    pub header_drift: Vec<HeaderDrift>,
}

/// Terminal execution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlViewExecutionError {
    /// The request could not be planned.
    #[error("invalid execution request: {message}")]
    InvalidRequest {
        /// What was wrong.
        message: String,
    },
    /// A declared placeholder had no value; nothing was fetched.
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),
    /// A page body matched none of the known layouts.
    #[error("page {page}: {shape}")]
    UnrecognizedResponseShape {
        /// Page that could not be normalised.
        page: u32,
        /// What was observed instead.
        shape: UnrecognizedResponseShape,
    },
    /// A page request failed and retries, if allowed, were exhausted.
    #[error("page {page} failed after {attempts} attempt(s): {source}")]
    Upstream {
        /// Page that failed.
        page: u32,
        /// Attempts made for that page.
        attempts: u32,
        /// Last transport failure.
        source: SqlViewSourceError,
    },
    /// The caller cancelled; partial results were discarded.
    #[error("execution cancelled after {pages_fetched} page(s)")]
    Cancelled {
        /// Pages completed before cancellation was observed.
        pages_fetched: u32,
    },
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Per-caller cancellation signal.
///
/// Cancelling makes the observing call return
/// [`SqlViewExecutionError::Cancelled`] promptly. Page requests stop once no
/// uncancelled caller shares the execution; other callers awaiting the same
/// execution are unaffected.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<CancelState>);

impl CancellationFlag {
    /// Fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this flag.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    /// Whether cancellation was signalled.
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        loop {
            let mut notified = std::pin::pin!(self.0.notify.notified());
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

type ProgressCallback = Arc<dyn Fn(PageProgress) + Send + Sync>;

/// Per-call observers: progress reporting and cancellation.
///
/// Hooks only observe; they never change which pages are fetched.
#[derive(Clone, Default)]
pub struct ExecutionHooks {
    on_progress: Option<ProgressCallback>,
    cancellation: CancellationFlag,
}

impl ExecutionHooks {
    /// Hooks that observe nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke `callback` after every fetched page.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(PageProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Observe `flag` for cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    fn into_subscriber(self) -> Subscriber {
        Subscriber {
            progress: self.on_progress,
            cancellation: self.cancellation,
        }
    }
}

/// Async clock-independent sleeping abstraction for retries.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    ///
    /// ```rust
    /// use sqlview_backend::domain::BackoffJitter;
    /// use chrono::{TimeZone, Utc};
    /// use std::time::Duration;
    /// struct DeterministicJitter;
    /// impl BackoffJitter for DeterministicJitter {
    ///     fn jittered_delay(&self, base: Duration, attempt: u32, _now: chrono::DateTime<chrono::Utc>) -> Duration {
    ///         base + Duration::from_millis(u64::from(attempt) * 5)
    ///     }
    /// }
    /// let now = Utc.with_ymd_and_hms(2026, 2, 26, 12, 0, 0).single().expect("valid time");
    /// let delay = DeterministicJitter.jittered_delay(Duration::from_millis(100), 2, now);
    /// assert_eq!(delay, Duration::from_millis(110));
    /// ```
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Table and bookkeeping produced by one network execution.
#[derive(Debug, Clone)]
struct FetchedTable {
    table: Arc<CanonicalTable>,
    pages_fetched: u32,
    warning: Option<ExecutionWarning>,
    header_drift: Vec<HeaderDrift>,
}

impl FetchedTable {
    fn into_execution(self, origin: ExecutionOrigin) -> SqlViewExecution {
        SqlViewExecution {
            table: self.table,
            pages_fetched: self.pages_fetched,
            origin,
            warning: self.warning,
            header_drift: self.header_drift,
        }
    }
}

/// Validated, fingerprinted form of an [`ExecutionRequest`].
struct ExecutionPlan {
    sql_view_id: String,
    parameters: SqlViewParameters,
    filters: BTreeMap<String, String>,
    fingerprint: ExecutionFingerprint,
    use_cache: bool,
    cache_expiry_minutes: u32,
}

impl ExecutionPlan {
    fn from_request(request: ExecutionRequest) -> Result<Self, SqlViewExecutionError> {
        let sql_view_id = request.sql_view_id.trim().to_owned();
        if sql_view_id.is_empty() {
            return Err(SqlViewExecutionError::InvalidRequest {
                message: "sql view id must not be empty".to_owned(),
            });
        }

        let parameters = build_parameters(
            &request.declared_placeholders(),
            &request.parameters,
            &request.parameter_defaults,
        )?;
        let filters: BTreeMap<String, String> = request
            .filters
            .iter()
            .map(|(name, value)| (name.trim(), value.trim()))
            .filter(|(name, value)| !name.is_empty() && !value.is_empty())
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        let fingerprint = ExecutionFingerprint::compute(&sql_view_id, &parameters, &filters);

        Ok(Self {
            sql_view_id,
            parameters,
            filters,
            fingerprint,
            use_cache: request.use_cache,
            cache_expiry_minutes: request.cache_expiry_minutes,
        })
    }

    fn page_request(&self, page: PageNumber) -> SqlViewPageRequest {
        SqlViewPageRequest {
            sql_view_id: self.sql_view_id.clone(),
            parameters: self.parameters.clone(),
            filters: self.filters.clone(),
            page,
        }
    }
}

/// Domain-owned SQL view executor.
///
/// Cloning is cheap and clones share the in-flight registry, so identical
/// concurrent executions coalesce across clones.
#[derive(Clone)]
pub struct SqlViewExecutor {
    state: Arc<ExecutorState>,
}

struct ExecutorState {
    source: Arc<dyn SqlViewSource>,
    cache: Arc<dyn ResultCacheStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: SqlViewExecutorConfig,
    in_flight: InFlight,
}

impl SqlViewExecutor {
    /// Build an executor using default runtime dependencies.
    /// ```rust,ignore
    /// let executor = SqlViewExecutor::new(ports, clock, SqlViewExecutorConfig::default());
    /// ```
    pub fn new(
        ports: SqlViewExecutorPorts,
        clock: Arc<dyn Clock>,
        config: SqlViewExecutorConfig,
    ) -> Self {
        Self::with_runtime(ports, clock, SqlViewExecutorRuntime::default(), config)
    }

    /// Build an executor with injected runtime abstractions.
    pub fn with_runtime(
        ports: SqlViewExecutorPorts,
        clock: Arc<dyn Clock>,
        runtime: SqlViewExecutorRuntime,
        config: SqlViewExecutorConfig,
    ) -> Self {
        Self {
            state: Arc::new(ExecutorState {
                source: ports.source,
                cache: ports.cache,
                clock,
                sleeper: runtime.sleeper,
                jitter: runtime.jitter,
                config,
                in_flight: InFlight::default(),
            }),
        }
    }

    /// Run `request` without observers.
    ///
    /// # Errors
    ///
    /// See [`SqlViewExecutor::execute_with`].
    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<SqlViewExecution, SqlViewExecutionError> {
        self.execute_with(request, ExecutionHooks::default()).await
    }

    /// Run `request`, reporting progress and observing cancellation.
    ///
    /// A fresh cache entry answers without network calls. Otherwise the call
    /// either leads a new network execution or, when an identical execution
    /// is already in flight, awaits that one. Every caller sharing an
    /// execution sees its remaining progress. Cancelling or dropping one
    /// caller leaves the others untouched.
    ///
    /// ```rust,ignore
    /// let execution = executor.execute_with(request, ExecutionHooks::new()).await?;
    /// assert!(execution.pages_fetched <= 20);
    /// # Ok::<(), sqlview_backend::domain::SqlViewExecutionError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Validation failures ([`SqlViewExecutionError::InvalidRequest`],
    /// [`SqlViewExecutionError::MissingParameter`]) are raised before any
    /// network activity. Page failures abort the execution and are shared
    /// with every coalesced caller.
    pub async fn execute_with(
        &self,
        request: ExecutionRequest,
        hooks: ExecutionHooks,
    ) -> Result<SqlViewExecution, SqlViewExecutionError> {
        let plan = ExecutionPlan::from_request(request)?;
        let span = info_span!(
            "sql_view.execute",
            sql_view_id = %plan.sql_view_id,
            fingerprint = %plan.fingerprint,
        );
        self.run(plan, hooks).instrument(span).await
    }

    /// Run `request` on the Tokio runtime and stream progress over a channel.
    ///
    /// The receiver closes once the execution finishes.
    pub fn execute_with_events(
        &self,
        request: ExecutionRequest,
        cancellation: CancellationFlag,
    ) -> (
        JoinHandle<Result<SqlViewExecution, SqlViewExecutionError>>,
        mpsc::UnboundedReceiver<PageProgress>,
    ) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let hooks = ExecutionHooks::new()
            .with_cancellation(cancellation)
            .with_progress(move |progress| {
                if sender.send(progress).is_err() {
                    debug!("progress receiver dropped");
                }
            });
        let executor = self.clone();
        let handle = tokio::spawn(async move { executor.execute_with(request, hooks).await });
        (handle, receiver)
    }

    async fn run(
        &self,
        plan: ExecutionPlan,
        hooks: ExecutionHooks,
    ) -> Result<SqlViewExecution, SqlViewExecutionError> {
        if plan.use_cache {
            if let Some(execution) = self.state.cached(&plan.fingerprint).await {
                return Ok(execution);
            }
        }

        let cancellation = hooks.cancellation.clone();
        let plan = Arc::new(plan);
        let subscription = self.state.in_flight.join_or_lead(
            &plan.fingerprint,
            hooks.into_subscriber(),
            |flight| Arc::clone(&self.state).lead(Arc::clone(&plan), flight),
        );
        let origin = subscription.origin();
        if origin == ExecutionOrigin::Shared {
            info!("joining in-flight execution");
        }

        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                let pages_fetched = subscription.pages_fetched();
                info!(pages_fetched, "execution cancelled");
                Err(SqlViewExecutionError::Cancelled { pages_fetched })
            }
            result = subscription.outcome() => {
                result.map(|fetched| fetched.into_execution(origin))
            }
        }
    }
}

impl ExecutorState {
    async fn cached(&self, fingerprint: &ExecutionFingerprint) -> Option<SqlViewExecution> {
        match self.cache.get(fingerprint).await {
            Ok(Some(entry)) => {
                info!(entry_id = %entry.id, rows = entry.table.row_count(), "serving result from cache");
                Some(SqlViewExecution {
                    table: entry.table,
                    pages_fetched: 0,
                    origin: ExecutionOrigin::Cache,
                    warning: entry.warning,
                    header_drift: entry.header_drift,
                })
            }
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "cache lookup failed; treating as a miss");
                None
            }
        }
    }

    fn lead(
        self: Arc<Self>,
        plan: Arc<ExecutionPlan>,
        flight: FlightHandle,
    ) -> BoxFuture<'static, FetchResult> {
        async move {
            let result = self.fetch_all(&plan, &flight).await;
            if plan.use_cache {
                if let Ok(fetched) = &result {
                    self.store(&plan, fetched).await;
                }
            }
            flight.complete();
            result
        }
        .boxed()
    }

    async fn fetch_all(&self, plan: &ExecutionPlan, flight: &FlightHandle) -> FetchResult {
        let page_limit = self.config.page_limit.max(1);
        let mut accumulator = TableAccumulator::new(self.config.max_rows);
        let mut page = PageNumber::first();
        let mut pages_fetched = 0_u32;

        loop {
            if flight.is_abandoned() {
                info!(pages_fetched, "execution abandoned");
                return Err(SqlViewExecutionError::Cancelled { pages_fetched });
            }

            let raw = self.fetch_page(plan, page, pages_fetched, flight).await?;
            if flight.is_abandoned() {
                info!(pages_fetched, "execution abandoned; discarding page");
                return Err(SqlViewExecutionError::Cancelled { pages_fetched });
            }

            let pager = Pager::from_envelope(&raw.body);
            let normalized = normalize(&raw.body).map_err(|shape| {
                SqlViewExecutionError::UnrecognizedResponseShape {
                    page: page.get(),
                    shape,
                }
            })?;
            let page_rows = normalized.row_count();
            if let Some(drift) = accumulator.absorb(page.get(), normalized) {
                warn!(
                    page = drift.page,
                    extra = ?drift.extra,
                    missing = ?drift.missing,
                    "page headers differ from the first page",
                );
            }
            pages_fetched += 1;

            let estimated_total = pager.and_then(|pager| pager.total);
            debug!(
                page = page.get(),
                rows = page_rows,
                rows_so_far = accumulator.row_count(),
                estimated_total,
                "fetched sql view page",
            );
            flight.report(PageProgress {
                pages_fetched,
                rows_so_far: accumulator.row_count(),
                estimated_total,
            });

            let more_pages = pager
                .and_then(|pager| pager.has_more_after(page))
                .unwrap_or(page_rows > 0);
            if !more_pages {
                return Ok(self.finish(accumulator, pages_fetched, None));
            }
            if accumulator.is_full() {
                warn!(max_rows = self.config.max_rows, "row cap reached");
                let warning = ExecutionWarning::RowCapReached {
                    max_rows: self.config.max_rows,
                };
                return Ok(self.finish(accumulator, pages_fetched, Some(warning)));
            }
            let next = page.next().filter(|_| pages_fetched < page_limit);
            let Some(next) = next else {
                warn!(
                    limit = page_limit,
                    rows = accumulator.row_count(),
                    "page limit reached with pages remaining",
                );
                let warning = ExecutionWarning::PageLimitExceeded {
                    limit: page_limit,
                    rows: accumulator.row_count(),
                };
                return Ok(self.finish(accumulator, pages_fetched, Some(warning)));
            };
            page = next;
        }
    }

    async fn fetch_page(
        &self,
        plan: &ExecutionPlan,
        page: PageNumber,
        pages_fetched: u32,
        flight: &FlightHandle,
    ) -> Result<RawPage, SqlViewExecutionError> {
        let request = plan.page_request(page);
        let max_attempts = self.config.transport_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self
                .source
                .fetch_page(&request)
                .await
                .map_err(AttemptError::classify)
            {
                Ok(raw) => return Ok(raw),
                Err(AttemptError::Retryable(error)) if attempt < max_attempts => {
                    let base_delay = self.retry_base_delay(attempt);
                    let delay = self
                        .jitter
                        .jittered_delay(base_delay, attempt, self.clock.utc());
                    warn!(page = page.get(), attempt, ?delay, %error, "retrying sql view page");
                    self.sleeper.sleep(delay).await;
                    if flight.is_abandoned() {
                        return Err(SqlViewExecutionError::Cancelled { pages_fetched });
                    }
                    attempt += 1;
                }
                Err(AttemptError::Retryable(error) | AttemptError::Rejected(error)) => {
                    return Err(SqlViewExecutionError::Upstream {
                        page: page.get(),
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    fn finish(
        &self,
        accumulator: TableAccumulator,
        pages_fetched: u32,
        warning: Option<ExecutionWarning>,
    ) -> FetchedTable {
        let warning = warning.or_else(|| {
            accumulator
                .truncated()
                .then_some(ExecutionWarning::RowCapReached {
                    max_rows: self.config.max_rows,
                })
        });
        let (table, header_drift) = accumulator.finish();
        FetchedTable {
            table: Arc::new(table),
            pages_fetched,
            warning,
            header_drift,
        }
    }

    async fn store(&self, plan: &ExecutionPlan, fetched: &FetchedTable) {
        let entry = NewCacheEntry {
            sql_view_id: plan.sql_view_id.clone(),
            fingerprint: plan.fingerprint.clone(),
            table: Arc::clone(&fetched.table),
            warning: fetched.warning,
            header_drift: fetched.header_drift.clone(),
            expiry_minutes: plan.cache_expiry_minutes,
        };
        match self.cache.put(entry).await {
            Ok(stored) => info!(entry_id = %stored.id, "stored result in cache"),
            // The caller still gets the table; only reuse is lost.
            Err(error) => warn!(%error, "failed to store result in cache"),
        }
    }

    fn retry_base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.config.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.config.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

#[cfg(test)]
mod tests;

//! Port and runtime dependency bundles for the SQL view executor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{ResultCacheStore, SqlViewSource};

use super::{BackoffJitter, RetrySleeper};

/// Port bundle required by the executor.
pub struct SqlViewExecutorPorts {
    /// Outbound page source adapter.
    pub source: Arc<dyn SqlViewSource>,
    /// Result cache adapter.
    pub cache: Arc<dyn ResultCacheStore>,
}

impl SqlViewExecutorPorts {
    /// Build a strongly-typed executor port bundle.
    pub fn new(source: Arc<dyn SqlViewSource>, cache: Arc<dyn ResultCacheStore>) -> Self {
        Self { source, cache }
    }
}

/// Runtime helpers used by retry policy.
pub struct SqlViewExecutorRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn RetrySleeper>,
    /// Jitter strategy for retry delays.
    pub jitter: Arc<dyn BackoffJitter>,
}

impl Default for SqlViewExecutorRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(AttemptJitter),
        }
    }
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Default deterministic jitter strategy.
///
/// Adds up to a quarter of the base delay, seeded from the sub-second part
/// of `now` so concurrent executions do not retry in lockstep.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptJitter;

impl BackoffJitter for AttemptJitter {
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = (base_ms / 4).max(1);
        let seed = u64::from(now.timestamp_subsec_nanos()) ^ u64::from(attempt);
        let extra = seed % (max_extra.saturating_add(1));
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(123_456_789)]
    #[case(999_999_999)]
    fn attempt_jitter_stays_within_a_quarter_of_base(#[case] nanos: u32) {
        let now = Utc
            .timestamp_opt(1_767_225_600, nanos)
            .single()
            .expect("valid time");
        let base = Duration::from_millis(400);

        let delay = AttemptJitter.jittered_delay(base, 1, now);

        assert!(delay >= base);
        assert!(delay <= base + Duration::from_millis(100));
    }
}

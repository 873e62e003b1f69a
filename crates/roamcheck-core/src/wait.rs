//! Poll-until-ready helpers and cooperative cancellation.
//!
//! Every wait in a roam run (IP acquisition, multicast resumption) is a
//! bounded poll: explicit interval, explicit timeout, and a cancel flag that
//! is checked between polls.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::{Duration, Instant, sleep};

/// Shared cancellation signal for a run.
///
/// Cloning shares the same flag; cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` when the
    /// sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        // Cancellation is observed at slice boundaries.
        let slice = Duration::from_millis(250);
        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleep(slice.min(deadline - now)).await;
            if self.is_cancelled() {
                return false;
            }
        }
    }
}

/// Poll interval and timeout for a wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Result of a predicate check in a wait loop.
#[derive(Debug, Clone)]
pub enum WaitFor<T> {
    /// Predicate satisfied.
    Ready(T),
    /// Predicate not yet satisfied.
    NotReady { last_observed: Option<String> },
}

impl<T> WaitFor<T> {
    #[must_use]
    pub fn not_ready(last_observed: impl Into<Option<String>>) -> Self {
        Self::NotReady {
            last_observed: last_observed.into(),
        }
    }
}

/// Why a wait loop gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    Timeout {
        /// Condition that was expected to become true.
        expected: String,
        /// Most recent observed state.
        last_observed: Option<String>,
        /// Number of polls attempted (including the first).
        polls: usize,
        elapsed: Duration,
    },
    Cancelled {
        expected: String,
    },
}

impl WaitError {
    #[must_use]
    pub fn last_observed(&self) -> Option<&str> {
        match self {
            Self::Timeout { last_observed, .. } => last_observed.as_deref(),
            Self::Cancelled { .. } => None,
        }
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout {
                expected,
                last_observed,
                polls,
                elapsed,
            } => {
                let last = last_observed.as_deref().unwrap_or("<none>");
                write!(
                    f,
                    "timeout waiting for {} after {}ms (polls={}, last_observed={})",
                    expected,
                    elapsed.as_millis(),
                    polls,
                    last
                )
            }
            Self::Cancelled { expected } => write!(f, "cancelled while waiting for {expected}"),
        }
    }
}

impl std::error::Error for WaitError {}

/// Poll `check` until it reports ready, the timeout passes, or `cancel` fires.
///
/// The first poll happens immediately; a zero timeout therefore polls once.
pub async fn wait_for<T, F, Fut>(
    expected: &str,
    policy: PollPolicy,
    cancel: &CancelFlag,
    mut check: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WaitFor<T>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut polls = 0usize;
    let mut last_observed = None;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled {
                expected: expected.to_string(),
            });
        }
        polls = polls.saturating_add(1);
        match check().await {
            WaitFor::Ready(value) => return Ok(value),
            WaitFor::NotReady { last_observed: obs } => {
                if obs.is_some() {
                    last_observed = obs;
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                expected: expected.to_string(),
                last_observed,
                polls,
                elapsed: now.saturating_duration_since(start),
            });
        }

        let remaining = deadline.saturating_duration_since(now);
        let sleep_for = policy.interval.min(remaining);
        if !sleep_for.is_zero() {
            sleep(sleep_for).await;
        }
    }
}

//! Bounded status polling.
//!
//! [`wait_for`] repeatedly fetches one resource until its status lands in the
//! desired set or the error set, the timeout elapses, or the cancellation
//! token fires. Each iteration:
//!
//! 1. stop with `Canceled` if cancellation was requested;
//! 2. stop with `TimedOut` if the elapsed time exceeds the timeout or the
//!    previous wait ran up to it;
//! 3. fetch the resource (a not-found answer ends a deletion wait successfully);
//! 4. stop with `Failed` if the status is an error status;
//! 5. stop with `Succeeded` if the status is a desired status;
//! 6. report progress, wait one interval (cut short at the deadline or on
//!    cancellation) and repeat.
//!
//! Error statuses are checked before desired statuses, so a status listed in
//! both sets fails the wait.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollConfig;
use crate::continuation::Outcome;
use crate::error::Error;
use crate::status::ResourceStatus;

/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Default cap for backoff intervals, in milliseconds.
pub const DEFAULT_BACKOFF_MAX_DELAY_MS: u64 = 30_000;

/// Something whose status can be polled.
pub trait Pollable {
    /// Current status of the resource.
    fn status(&self) -> ResourceStatus;
}

impl Pollable for Value {
    fn status(&self) -> ResourceStatus {
        ResourceStatus::parse(self.get("status").and_then(Value::as_str).unwrap_or_default())
    }
}

/// Why the poll runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPurpose {
    /// Wait for a status transition.
    #[default]
    Status,
    /// Wait for the resource to disappear; a not-found fetch is success.
    Deletion,
}

/// State of a poll, as reported to the progress sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Not yet terminal.
    Waiting,
    /// Reached a desired status (or disappeared, for deletion waits).
    Succeeded,
    /// Reached an error status.
    Failed,
    /// Exceeded the timeout.
    TimedOut,
    /// Stopped by cancellation.
    Canceled,
}

/// Progress notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PollProgress {
    /// Identifier of the polled resource.
    pub subject: String,
    /// Current state.
    pub state: PollState,
    /// Last observed status.
    pub status: Option<ResourceStatus>,
    /// Number of fetches performed so far.
    pub attempt: u32,
    /// Time since the poll began.
    pub elapsed: Duration,
}

/// Receiver of [`PollProgress`] notifications.
pub type ProgressSink = Arc<dyn Fn(&PollProgress) + Send + Sync>;

/// Exponential growth of the polling interval.
///
/// Not used unless set with [`PollSpec::with_backoff`]; polling is
/// fixed-interval by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Interval after the first fetch
    pub initial_delay: Duration,

    /// Cap on the interval
    pub max_delay: Duration,

    /// Growth factor per fetch
    pub multiplier: u32,
}

impl BackoffPolicy {
    /// Create a policy starting at `initial_delay`.
    #[must_use]
    pub const fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_millis(DEFAULT_BACKOFF_MAX_DELAY_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay after fetch number `attempt` (1-based).
    ///
    /// `min(initial_delay * multiplier^(attempt - 1), max_delay)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.saturating_pow(attempt - 1);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Parameters of one poll.
#[derive(Clone)]
pub struct PollSpec {
    subject: String,
    desired: HashSet<ResourceStatus>,
    errors: HashSet<ResourceStatus>,
    interval: Duration,
    timeout: Option<Duration>,
    progress: Option<ProgressSink>,
    cancellation: CancellationToken,
    purpose: WaitPurpose,
    backoff: Option<BackoffPolicy>,
}

impl PollSpec {
    /// Poll `subject` with the default interval and no timeout.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self::from_config(subject, &PollConfig::default())
    }

    /// Poll `subject` using interval and timeout from `config`.
    #[must_use]
    pub fn from_config(subject: impl Into<String>, config: &PollConfig) -> Self {
        Self {
            subject: subject.into(),
            desired: HashSet::new(),
            errors: HashSet::new(),
            interval: config.interval(),
            timeout: config.timeout(),
            progress: None,
            cancellation: CancellationToken::new(),
            purpose: WaitPurpose::Status,
            backoff: None,
        }
    }

    /// Statuses that end the wait successfully.
    #[must_use]
    pub fn desired<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = ResourceStatus>,
    {
        self.desired.extend(statuses);
        self
    }

    /// Statuses that end the wait with a failure.
    #[must_use]
    pub fn errors<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = ResourceStatus>,
    {
        self.errors.extend(statuses);
        self
    }

    /// Fixed interval between fetches.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overall bound, measured from the start of the poll.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remove the overall bound.
    #[must_use]
    pub const fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Receive a notification after every fetch and at the end.
    #[must_use]
    pub fn progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(&PollProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(sink));
        self
    }

    /// Stop when `token` is canceled.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Treat a not-found fetch as success.
    #[must_use]
    pub const fn for_deletion(mut self) -> Self {
        self.purpose = WaitPurpose::Deletion;
        self
    }

    /// Grow the interval between fetches.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Identifier of the polled resource.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Purpose of the poll.
    #[must_use]
    pub const fn purpose(&self) -> WaitPurpose {
        self.purpose
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff
            .map_or(self.interval, |backoff| backoff.delay_for_attempt(attempt))
    }

    fn report(&self, state: PollState, status: Option<&ResourceStatus>, attempt: u32, elapsed: Duration) {
        if let Some(sink) = &self.progress {
            sink(&PollProgress {
                subject: self.subject.clone(),
                state,
                status: status.cloned(),
                attempt,
                elapsed,
            });
        }
    }
}

impl fmt::Debug for PollSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollSpec")
            .field("subject", &self.subject)
            .field("desired", &self.desired)
            .field("errors", &self.errors)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("purpose", &self.purpose)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Terminal result of a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<R> {
    /// Desired status reached; `None` when a deletion wait saw not-found.
    Succeeded(Option<R>),
    /// Error status reached.
    Failed {
        /// Identifier of the polled resource
        subject: String,
        /// Matched error status
        status: ResourceStatus,
        /// Resource as last fetched
        resource: R,
    },
    /// Timeout exceeded before a terminal status.
    TimedOut {
        /// Identifier of the polled resource
        subject: String,
        /// Last status observed, if any fetch completed
        last_status: Option<ResourceStatus>,
    },
    /// Cancellation requested.
    Canceled,
    /// A fetch failed; the error is passed through unchanged.
    Faulted(Error),
}

impl<R> PollOutcome<R> {
    /// State corresponding to this outcome.
    ///
    /// A fetch fault has no poll state of its own and maps to `None`.
    #[must_use]
    pub const fn state(&self) -> Option<PollState> {
        match self {
            Self::Succeeded(_) => Some(PollState::Succeeded),
            Self::Failed { .. } => Some(PollState::Failed),
            Self::TimedOut { .. } => Some(PollState::TimedOut),
            Self::Canceled => Some(PollState::Canceled),
            Self::Faulted(_) => None,
        }
    }

    /// True for [`PollOutcome::Succeeded`].
    #[must_use]
    pub const fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

impl<R: Serialize> PollOutcome<R> {
    /// Fold into an [`Outcome`], turning failure states into typed errors.
    ///
    /// `Failed` becomes [`Error::TerminalState`], `TimedOut` becomes
    /// [`Error::Timeout`], and `Canceled` stays canceled.
    pub fn into_outcome(self) -> Outcome<Option<R>> {
        match self {
            Self::Succeeded(resource) => Outcome::Completed(resource),
            Self::Failed {
                subject,
                status,
                resource,
            } => Outcome::Faulted(Error::TerminalState {
                subject,
                status,
                snapshot: serde_json::to_value(&resource).unwrap_or(Value::Null),
            }),
            Self::TimedOut {
                subject,
                last_status,
            } => Outcome::Faulted(Error::Timeout {
                subject,
                last_status,
            }),
            Self::Canceled => Outcome::Canceled,
            Self::Faulted(err) => Outcome::Faulted(err),
        }
    }
}

/// Poll until the resource reaches a terminal state.
///
/// `fetch` is called once per iteration, strictly sequentially. A fetch that
/// completes as canceled ends the poll as canceled.
pub async fn wait_for<R, F, Fut>(spec: PollSpec, mut fetch: F) -> PollOutcome<R>
where
    R: Pollable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<R>>,
{
    let started = Instant::now();
    let mut attempt = 0_u32;
    let mut last_status: Option<ResourceStatus> = None;
    let mut deadline_reached = false;

    let finish = |outcome: PollOutcome<R>, status: Option<&ResourceStatus>, attempt: u32| {
        if let Some(state) = outcome.state() {
            spec.report(state, status, attempt, started.elapsed());
        }
        outcome
    };

    loop {
        if spec.cancellation.is_cancelled() {
            debug!(subject = %spec.subject, attempt, "Poll canceled");
            return finish(PollOutcome::Canceled, last_status.as_ref(), attempt);
        }

        if let Some(timeout) = spec.timeout {
            if deadline_reached || started.elapsed() > timeout {
                warn!(subject = %spec.subject, attempt, ?timeout, "Poll timed out");
                let status = last_status.clone();
                return finish(
                    PollOutcome::TimedOut {
                        subject: spec.subject.clone(),
                        last_status,
                    },
                    status.as_ref(),
                    attempt,
                );
            }
        }

        attempt += 1;
        let resource = match fetch().await {
            Outcome::Completed(resource) => resource,
            Outcome::Faulted(err) if err.is_not_found() && spec.purpose == WaitPurpose::Deletion => {
                debug!(subject = %spec.subject, attempt, "Resource gone");
                return finish(PollOutcome::Succeeded(None), last_status.as_ref(), attempt);
            }
            Outcome::Faulted(err) => {
                return finish(PollOutcome::Faulted(err), last_status.as_ref(), attempt)
            }
            Outcome::Canceled => {
                return finish(PollOutcome::Canceled, last_status.as_ref(), attempt)
            }
        };

        let status = resource.status();
        debug!(subject = %spec.subject, attempt, %status, "Polled resource");

        if spec.errors.contains(&status) {
            let outcome = PollOutcome::Failed {
                subject: spec.subject.clone(),
                status: status.clone(),
                resource,
            };
            return finish(outcome, Some(&status), attempt);
        }

        if spec.desired.contains(&status) {
            return finish(PollOutcome::Succeeded(Some(resource)), Some(&status), attempt);
        }

        spec.report(PollState::Waiting, Some(&status), attempt, started.elapsed());
        last_status = Some(status);

        // Never sleep past the deadline.
        let mut delay = spec.delay_after(attempt);
        if let Some(timeout) = spec.timeout {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining <= delay {
                delay = remaining;
                deadline_reached = true;
            }
        }

        tokio::select! {
            biased;
            () = spec.cancellation.cancelled() => {
                debug!(subject = %spec.subject, attempt, "Poll canceled while waiting");
                return finish(PollOutcome::Canceled, last_status.as_ref(), attempt);
            }
            () = sleep(delay) => {}
        }
    }
}

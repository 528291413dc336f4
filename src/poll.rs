use crate::{cancel::CancelToken, error::MigrationError};
use anyhow::Result;
use log::trace;
use std::time::{Duration, Instant};

/// The result of a single readiness check
#[derive(Debug)]
pub enum Readiness {
    /// The condition holds, polling stops successfully
    Ready,
    /// Not there yet, keep polling until the timeout
    NotReady,
    /// Polling stops immediately with the provided error
    Fatal(anyhow::Error),
}

/// Interval and wall clock budget of a poll loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// The time between two checks
    pub interval: Duration,
    /// The overall budget
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}

impl PollPolicy {
    /// Check immediately and then on every interval until the check reports
    /// ready, fails fatally, the timeout elapses or the run gets cancelled.
    pub fn poll<F>(&self, cancel: &CancelToken, what: &str, mut check: F) -> Result<()>
    where
        F: FnMut() -> Readiness,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            cancel.check()?;
            match check() {
                Readiness::Ready => return Ok(()),
                Readiness::Fatal(e) => return Err(e),
                Readiness::NotReady => trace!("{} not ready yet", what),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(MigrationError::Timeout {
                    what: what.into(),
                    timeout: self.timeout,
                }
                .into());
            }
            cancel.sleep(self.interval.min(deadline - now))?;
        }
    }
}

/// All waiting related durations of a migration run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    /// Grace period for the kubelet to pick up regenerated static manifests
    pub settle: Duration,
    /// Policy for static pod and kubelet service polling
    pub poll: PollPolicy,
    /// Budget for evicting all pods of a node
    pub drain: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(30),
            poll: PollPolicy::default(),
            drain: Duration::from_secs(300),
        }
    }
}

//! Bounded-retry supervision of restartable workers
//!
//! The supervisor is driven by the controller tick: each call to
//! [`Supervisor::check`] makes at most one restart attempt. A worker that is
//! still down after the settle time counts as a failed attempt; once the count
//! of consecutive failures exceeds the limit the check returns
//! [`PayphoneError::LinkUnrecoverable`] and the caller tears everything down.

use crate::config::ControllerConfig;
use crate::error::{PayphoneError, PayphoneResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A worker the supervisor can probe and restart
#[async_trait]
pub trait Restartable: Send {
    fn name(&self) -> &str;

    fn is_alive(&self) -> bool;

    /// Start a fresh instance of the worker
    async fn restart(&mut self);
}

/// Timing and limits for restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Wait between noticing a dead worker and restarting it
    pub backoff: Duration,
    /// Wait after a restart before checking the worker again
    pub settle: Duration,
    /// Consecutive failed restarts tolerated
    pub max_consecutive_failures: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            settle: Duration::from_secs(1),
            max_consecutive_failures: 3,
        }
    }
}

impl From<&ControllerConfig> for RestartPolicy {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            backoff: config.restart_backoff(),
            settle: config.restart_settle(),
            max_consecutive_failures: config.max_restart_failures,
        }
    }
}

/// Result of one supervision check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionOutcome {
    /// Worker was running
    Healthy,
    /// Worker was down and the restart took
    Recovered,
    /// Worker was down and is still down after the restart attempt
    StillDown { consecutive_failures: u32 },
    /// Shutdown was requested during the check
    Cancelled,
}

/// Restart bookkeeping for one worker
#[derive(Debug, Clone)]
pub struct Supervisor {
    policy: RestartPolicy,
    consecutive_failures: u32,
}

impl Supervisor {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Probe `worker` and restart it once if it is down
    pub async fn check<W>(
        &mut self,
        worker: &mut W,
        shutdown: &CancellationToken,
    ) -> PayphoneResult<SupervisionOutcome>
    where
        W: Restartable + ?Sized,
    {
        if worker.is_alive() {
            return Ok(SupervisionOutcome::Healthy);
        }

        error!(
            "{} stopped, waiting {:?} before restarting",
            worker.name(),
            self.policy.backoff
        );
        if !pause(self.policy.backoff, shutdown).await {
            return Ok(SupervisionOutcome::Cancelled);
        }

        worker.restart().await;

        if !pause(self.policy.settle, shutdown).await {
            return Ok(SupervisionOutcome::Cancelled);
        }

        if worker.is_alive() {
            info!("{} recovered", worker.name());
            self.consecutive_failures = 0;
            return Ok(SupervisionOutcome::Recovered);
        }

        self.consecutive_failures += 1;
        warn!(
            "{} restart failed ({} consecutive)",
            worker.name(),
            self.consecutive_failures
        );

        if self.consecutive_failures > self.policy.max_consecutive_failures {
            error!(
                "{} failed to recover after {} retries",
                worker.name(),
                self.policy.max_consecutive_failures
            );
            return Err(PayphoneError::LinkUnrecoverable {
                attempts: self.consecutive_failures,
            });
        }

        Ok(SupervisionOutcome::StillDown {
            consecutive_failures: self.consecutive_failures,
        })
    }
}

/// Sleep for `duration` unless shutdown is requested first
async fn pause(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

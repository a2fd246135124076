//! Dial sequence accumulation with a sliding inter-digit timeout
//!
//! The collector is polled rather than armed: the supervisor calls
//! [`DialCollector::poll_timeout`] on every tick, so the effective timeout is
//! the configured value rounded up to the tick granularity.

use crate::line::HookState;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// A complete dial sequence ready to be placed as a call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialedNumber(String);

impl DialedNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DialedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DialedNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CollectorState {
    Idle,
    Accumulating { digits: String, last_digit: Instant },
}

/// Accumulates dial digits into a [`DialedNumber`]
#[derive(Debug, Clone)]
pub struct DialCollector {
    state: CollectorState,
    dial_timeout: Duration,
}

impl DialCollector {
    pub fn new(dial_timeout: Duration) -> Self {
        Self {
            state: CollectorState::Idle,
            dial_timeout,
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// Whether a dial sequence is in progress
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, CollectorState::Accumulating { .. })
    }

    /// Digits collected so far, empty when idle
    pub fn pending(&self) -> &str {
        match &self.state {
            CollectorState::Idle => "",
            CollectorState::Accumulating { digits, .. } => digits,
        }
    }

    /// Record a digit received at `now`
    ///
    /// Every digit refreshes the inter-digit timer.
    pub fn on_digit(&mut self, digit: char, now: Instant) {
        match &mut self.state {
            CollectorState::Idle => {
                debug!("Dial sequence started with '{}'", digit);
                self.state = CollectorState::Accumulating {
                    digits: digit.to_string(),
                    last_digit: now,
                };
            }
            CollectorState::Accumulating { digits, last_digit } => {
                digits.push(digit);
                *last_digit = now;
            }
        }
    }

    /// React to a hook report
    ///
    /// Putting the handset down cancels the sequence, and lifting it starts a
    /// fresh one, so any buffered digits are discarded either way. A report
    /// that repeats the current position counts too.
    pub fn on_hook_changed(&mut self, hook: HookState) {
        if let CollectorState::Accumulating { digits, .. } = &self.state {
            debug!("Discarding dial sequence '{}' on {}", digits, hook);
            self.state = CollectorState::Idle;
        }
    }

    /// Return the collected number once the inter-digit timeout has elapsed
    pub fn poll_timeout(&mut self, now: Instant) -> Option<DialedNumber> {
        let expired = match &self.state {
            CollectorState::Accumulating { digits, last_digit } => {
                !digits.is_empty() && now.saturating_duration_since(*last_digit) > self.dial_timeout
            }
            CollectorState::Idle => false,
        };

        if !expired {
            return None;
        }

        match std::mem::replace(&mut self.state, CollectorState::Idle) {
            CollectorState::Accumulating { digits, .. } => Some(DialedNumber(digits)),
            CollectorState::Idle => None,
        }
    }

    /// Drop any pending digits
    pub fn reset(&mut self) {
        self.state = CollectorState::Idle;
    }
}

//! Gateway configuration structures
//!
//! All structures deserialize from the binary's configuration file and carry
//! defaults matching the payphone hardware firmware, so a partial file is
//! enough to run.
//!
//! ```rust
//! use payphone_core::config::{ControllerConfig, LineSymbols};
//! use std::time::Duration;
//!
//! let config = ControllerConfig::default()
//!     .with_dial_timeout(Duration::from_millis(1500))
//!     .with_max_restart_failures(5);
//!
//! assert_eq!(config.dial_timeout(), Duration::from_millis(1500));
//! assert_eq!(config.tick_interval(), Duration::from_millis(500));
//! assert!(config.validate().is_ok());
//! assert!(LineSymbols::default().is_dial_digit('#'));
//! ```

use crate::error::{PayphoneError, PayphoneResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serial device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyAMA0`
    pub port: String,
    /// Line speed in bits per second
    pub baudrate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyAMA0".to_string(),
            baudrate: 9600,
        }
    }
}

/// Account used to register with the call-signaling server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipAccount {
    /// Registrar host; also the host part of every outbound destination
    pub server: String,
    pub username: String,
    pub secret: String,
}

impl SipAccount {
    /// Build the destination address for a dialed number
    pub fn destination_for(&self, digits: &str) -> String {
        format!("{}@{}", digits, self.server)
    }
}

/// Single byte symbols of the serial wire protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSymbols {
    /// Characters reported as dialed digits
    pub dial_digits: String,
    /// Handset placed on the hook
    pub on_hook: char,
    /// Handset lifted
    pub off_hook: char,
    pub follow_key: char,
    pub ring_start: char,
    pub ring_stop: char,
}

impl Default for LineSymbols {
    fn default() -> Self {
        Self {
            dial_digits: "1234567890*#".to_string(),
            on_hook: 'H',
            off_hook: 'h',
            follow_key: 'F',
            ring_start: 'R',
            ring_stop: 'r',
        }
    }
}

impl LineSymbols {
    /// Whether `c` is one of the dial digit symbols
    pub fn is_dial_digit(&self, c: char) -> bool {
        self.dial_digits.contains(c)
    }

    fn validate(&self) -> PayphoneResult<()> {
        if self.dial_digits.is_empty() {
            return Err(PayphoneError::config("dial digit set is empty"));
        }

        let inbound = [self.on_hook, self.off_hook, self.follow_key];
        for (i, symbol) in inbound.iter().enumerate() {
            if !symbol.is_ascii() {
                return Err(PayphoneError::config(format!(
                    "line symbol {:?} is not a single byte",
                    symbol
                )));
            }
            if self.is_dial_digit(*symbol) {
                return Err(PayphoneError::config(format!(
                    "line symbol {:?} collides with a dial digit",
                    symbol
                )));
            }
            if inbound[i + 1..].contains(symbol) {
                return Err(PayphoneError::config(format!(
                    "line symbol {:?} is used twice",
                    symbol
                )));
            }
        }

        if !self.dial_digits.is_ascii() {
            return Err(PayphoneError::config("dial digits must be single bytes"));
        }

        if !self.ring_start.is_ascii() || !self.ring_stop.is_ascii() {
            return Err(PayphoneError::config("ring symbols must be single bytes"));
        }
        if self.ring_start == self.ring_stop {
            return Err(PayphoneError::config("ring start and stop symbols are identical"));
        }

        Ok(())
    }
}

/// Timing, retry and queue settings of the controller and the serial link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Supervisor tick
    pub tick_interval_ms: u64,
    /// Inter-digit timeout that ends a dial sequence
    pub dial_timeout_ms: u64,
    /// Wait before restarting a dead serial worker
    pub restart_backoff_ms: u64,
    /// Wait after a restart before checking that the worker survived
    pub restart_settle_ms: u64,
    /// Consecutive failed restarts tolerated before giving up
    pub max_restart_failures: u32,
    /// Upper bound on waiting for the serial worker to exit at shutdown
    pub link_join_timeout_ms: u64,
    /// Read timeout applied to the serial device
    pub serial_read_timeout_ms: u64,
    /// Upper bound on any single request to the signaling stack
    pub signaling_timeout_ms: u64,
    /// Worker poll interval while input is pending or a dial is in progress
    pub fast_poll_ms: u64,
    /// Worker poll interval otherwise
    pub slow_poll_ms: u64,
    pub event_queue_capacity: usize,
    pub command_queue_capacity: usize,
    pub notification_queue_capacity: usize,
    pub symbols: LineSymbols,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            dial_timeout_ms: 1000,
            restart_backoff_ms: 1000,
            restart_settle_ms: 1000,
            max_restart_failures: 3,
            link_join_timeout_ms: 2000,
            serial_read_timeout_ms: 1000,
            signaling_timeout_ms: 5000,
            fast_poll_ms: 10,
            slow_poll_ms: 100,
            event_queue_capacity: 64,
            command_queue_capacity: 16,
            notification_queue_capacity: 32,
            symbols: LineSymbols::default(),
        }
    }
}

impl ControllerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn link_join_timeout(&self) -> Duration {
        Duration::from_millis(self.link_join_timeout_ms)
    }

    pub fn serial_read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_read_timeout_ms)
    }

    pub fn signaling_timeout(&self) -> Duration {
        Duration::from_millis(self.signaling_timeout_ms)
    }

    pub fn fast_poll(&self) -> Duration {
        Duration::from_millis(self.fast_poll_ms)
    }

    pub fn slow_poll(&self) -> Duration {
        Duration::from_millis(self.slow_poll_ms)
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set both the restart backoff and the settle time
    pub fn with_restart_timing(mut self, backoff: Duration, settle: Duration) -> Self {
        self.restart_backoff_ms = backoff.as_millis() as u64;
        self.restart_settle_ms = settle.as_millis() as u64;
        self
    }

    pub fn with_max_restart_failures(mut self, limit: u32) -> Self {
        self.max_restart_failures = limit;
        self
    }

    pub fn with_poll_intervals(mut self, fast: Duration, slow: Duration) -> Self {
        self.fast_poll_ms = fast.as_millis() as u64;
        self.slow_poll_ms = slow.as_millis() as u64;
        self
    }

    pub fn with_symbols(mut self, symbols: LineSymbols) -> Self {
        self.symbols = symbols;
        self
    }

    /// Check the settings for values the controller cannot run with
    pub fn validate(&self) -> PayphoneResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(PayphoneError::config("tick interval must be non-zero"));
        }
        if self.dial_timeout_ms == 0 {
            return Err(PayphoneError::config("dial timeout must be non-zero"));
        }
        if self.signaling_timeout_ms == 0 {
            return Err(PayphoneError::config("signaling timeout must be non-zero"));
        }
        if self.fast_poll_ms == 0 || self.slow_poll_ms == 0 {
            return Err(PayphoneError::config("poll intervals must be non-zero"));
        }
        if self.event_queue_capacity == 0
            || self.command_queue_capacity == 0
            || self.notification_queue_capacity == 0
        {
            return Err(PayphoneError::config("queue capacities must be non-zero"));
        }
        self.symbols.validate()
    }
}

//! Payphone line signaling: hardware events, outbound commands and hook state
//!
//! The serial protocol carries one byte per event or command with no framing.
//! Inbound bytes are turned into [`HardwareEvent`]s by the
//! [`LineEventDecoder`]; outbound [`LineCommand`]s are encoded by the same
//! decoder so both directions share one symbol table.

mod decoder;

pub use decoder::LineEventDecoder;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Typed event decoded from one received byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareEvent {
    /// A dial digit (`0-9`, `*`, `#`)
    Digit(char),
    /// Hook switch released: the handset was lifted
    HookUp,
    /// Hook switch pressed: the handset was put down
    HookDown,
    /// The follow-on button was pressed
    FollowKeyPressed,
}

/// A decoded event and the moment its byte was read from the device
///
/// Timing decisions (the inter-digit timeout) use `received_at`, so an event
/// that waits in the queue while the controller is busy keeps its real age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedEvent {
    pub event: HardwareEvent,
    pub received_at: Instant,
}

/// Command sent to the payphone hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineCommand {
    RingStart,
    RingStop,
}

impl fmt::Display for LineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineCommand::RingStart => write!(f, "ring-start"),
            LineCommand::RingStop => write!(f, "ring-stop"),
        }
    }
}

/// Position of the handset
///
/// The position is `Unknown` until the hardware reports the first hook
/// change; nothing assumes either position before that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookState {
    #[default]
    Unknown,
    OnHook,
    OffHook,
}

impl HookState {
    pub fn is_off_hook(&self) -> bool {
        matches!(self, HookState::OffHook)
    }

    /// Hook position reported by a hook event, `None` for other events
    pub fn from_event(event: &HardwareEvent) -> Option<Self> {
        match event {
            HardwareEvent::HookUp => Some(HookState::OffHook),
            HardwareEvent::HookDown => Some(HookState::OnHook),
            _ => None,
        }
    }
}

impl fmt::Display for HookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookState::Unknown => write!(f, "unknown"),
            HookState::OnHook => write!(f, "on-hook"),
            HookState::OffHook => write!(f, "off-hook"),
        }
    }
}

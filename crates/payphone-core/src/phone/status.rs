use crate::call::{CallSession, CallState};
use crate::line::HookState;
use crate::link::LinkState;
use serde::Serialize;

/// Counters kept by the controller since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub calls_placed: u64,
    pub calls_answered: u64,
    /// Inbound calls that ended before the handset was lifted
    pub missed_calls: u64,
    pub busy_rejections: u64,
    pub dtmf_relayed: u64,
    pub dropped_events: u64,
    pub dropped_commands: u64,
    pub link_restarts: u64,
}

/// Point-in-time view of the gateway, published after every dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub hook: HookState,
    pub ringing: bool,
    pub call_state: CallState,
    pub call: Option<CallSession>,
    /// Digits of a dial sequence in progress
    pub dialing: String,
    pub follow_on_requested: bool,
    pub link: LinkState,
    pub stats: ControllerStats,
}

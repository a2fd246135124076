//! Call session model and the call-signaling collaborator seam
//!
//! The gateway manages exactly one handset, so at most one [`CallSession`]
//! exists at any time. Sessions are created and destroyed only by the
//! controller; the signaling stack refers to them through the opaque
//! [`CallHandle`] it issued.

mod signaling;

pub use signaling::{
    CallSignaling, NotificationForwarder, SignalingEventHandler, SignalingNotification,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SIP response code sent while the local ringer is sounding
pub const RESPONSE_RINGING: u16 = 180;
/// SIP response code accepting an incoming call
pub const RESPONSE_OK: u16 = 200;
/// SIP response code rejecting a call while the line is in use
pub const RESPONSE_BUSY: u16 = 486;

/// Identity of a call inside the signaling stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallHandle(pub String);

impl CallHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local state of the single call slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// No call
    #[default]
    Idle,
    /// Remote party is calling, local ringer is sounding
    Incoming,
    /// Locally dialed call waiting for the remote side
    Outgoing,
    /// Call answered or remote media flowing
    Active,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Incoming => "incoming",
            CallState::Outgoing => "outgoing",
            CallState::Active => "active",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Call state as reported by the signaling stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteCallState {
    /// Request sent, no response yet
    Calling,
    /// Provisional response received (remote is ringing)
    Early,
    /// Final response received, waiting for confirmation
    Connecting,
    /// Call established
    Confirmed,
    /// Call ended by either side
    Disconnected,
}

/// The call currently occupying the line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    /// Signaling handle; `None` while an outbound request is in flight
    pub handle: Option<CallHandle>,
    pub state: CallState,
    pub direction: CallDirection,
    /// Remote URI for inbound calls, destination for outbound ones
    pub remote: String,
    /// Whether the audio path is connected
    pub media_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn incoming(handle: CallHandle, remote: impl Into<String>) -> Self {
        Self {
            handle: Some(handle),
            state: CallState::Incoming,
            direction: CallDirection::Inbound,
            remote: remote.into(),
            media_active: false,
            created_at: Utc::now(),
        }
    }

    pub fn outgoing(destination: impl Into<String>) -> Self {
        Self {
            handle: None,
            state: CallState::Outgoing,
            direction: CallDirection::Outbound,
            remote: destination.into(),
            media_active: false,
            created_at: Utc::now(),
        }
    }

    /// Whether `handle` refers to this session
    pub fn is(&self, handle: &CallHandle) -> bool {
        self.handle.as_ref() == Some(handle)
    }
}

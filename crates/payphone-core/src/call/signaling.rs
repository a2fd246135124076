//! Narrow interface to the external call-signaling stack
//!
//! Requests go out through [`CallSignaling`]; lifecycle notifications come
//! back through [`SignalingEventHandler`]. The gateway registers a
//! [`NotificationForwarder`] as the handler, which turns every callback into a
//! [`SignalingNotification`] on the controller's queue. The signaling stack
//! never mutates gateway state from its own context.

use super::{CallHandle, RemoteCallState};
use crate::config::SipAccount;
use crate::error::SignalingError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Requests the controller makes of the signaling stack
#[async_trait]
pub trait CallSignaling: Send + Sync {
    /// Register the account, returning once registration succeeded or failed
    async fn register_account(&self, account: &SipAccount) -> Result<(), SignalingError>;

    /// Start an outbound call to `destination` (`digits@server`)
    async fn place_call(&self, destination: &str) -> Result<CallHandle, SignalingError>;

    /// Send a response to an incoming call (`180`, `200`, `486`, ...)
    async fn answer(&self, call: &CallHandle, code: u16) -> Result<(), SignalingError>;

    async fn hangup(&self, call: &CallHandle) -> Result<(), SignalingError>;

    async fn send_dtmf(&self, call: &CallHandle, digit: char) -> Result<(), SignalingError>;

    /// Connect the call's media to the local audio device
    async fn connect_audio(&self, call: &CallHandle) -> Result<(), SignalingError>;

    /// Unregister and release transports
    async fn shutdown(&self) -> Result<(), SignalingError>;
}

/// Lifecycle callbacks delivered by the signaling stack
#[async_trait]
pub trait SignalingEventHandler: Send + Sync {
    async fn on_incoming_call(&self, call: CallHandle, remote_uri: String);

    async fn on_call_state_changed(&self, call: CallHandle, state: RemoteCallState);

    async fn on_media_state_changed(&self, call: CallHandle, active: bool);
}

/// Notification queued for the controller's dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingNotification {
    IncomingCall {
        call: CallHandle,
        remote_uri: String,
    },
    CallStateChanged {
        call: CallHandle,
        state: RemoteCallState,
    },
    MediaStateChanged {
        call: CallHandle,
        active: bool,
    },
}

/// [`SignalingEventHandler`] that forwards into the controller's queue
#[derive(Debug, Clone)]
pub struct NotificationForwarder {
    tx: mpsc::Sender<SignalingNotification>,
}

impl NotificationForwarder {
    pub fn new(tx: mpsc::Sender<SignalingNotification>) -> Self {
        Self { tx }
    }

    fn forward(&self, notification: SignalingNotification) {
        if let Err(e) = self.tx.try_send(notification) {
            match e {
                mpsc::error::TrySendError::Full(n) => {
                    warn!("Notification queue full, dropping {:?}", n);
                }
                mpsc::error::TrySendError::Closed(n) => {
                    warn!("Controller stopped, dropping {:?}", n);
                }
            }
        }
    }
}

#[async_trait]
impl SignalingEventHandler for NotificationForwarder {
    async fn on_incoming_call(&self, call: CallHandle, remote_uri: String) {
        self.forward(SignalingNotification::IncomingCall { call, remote_uri });
    }

    async fn on_call_state_changed(&self, call: CallHandle, state: RemoteCallState) {
        self.forward(SignalingNotification::CallStateChanged { call, state });
    }

    async fn on_media_state_changed(&self, call: CallHandle, active: bool) {
        self.forward(SignalingNotification::MediaStateChanged { call, active });
    }
}

//! Stand-in call-signaling stack
//!
//! [`LoopbackSignaling`] accepts every request, registers immediately and
//! plays the remote side of outbound calls: after a short delay each placed
//! call is reported confirmed with active media. It lets the gateway run
//! against real payphone hardware without a VoIP server.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use payphone_core::{
    CallHandle, CallSignaling, RemoteCallState, SignalingError, SignalingEventHandler,
    SignalingNotification, SipAccount,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub struct LoopbackSignaling {
    handler: RwLock<Option<Arc<dyn SignalingEventHandler>>>,
    calls: Mutex<HashSet<CallHandle>>,
    registered: AtomicBool,
    answer_delay: Duration,
}

impl LoopbackSignaling {
    pub fn new(answer_delay: Duration) -> Self {
        Self {
            handler: RwLock::new(None),
            calls: Mutex::new(HashSet::new()),
            registered: AtomicBool::new(false),
            answer_delay,
        }
    }

    /// Receiver of call lifecycle notifications
    pub fn set_event_handler(&self, handler: Arc<dyn SignalingEventHandler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn active_calls(&self) -> usize {
        self.calls.lock().len()
    }

    fn ensure_registered(&self, operation: &str) -> Result<(), SignalingError> {
        if self.registered.load(Ordering::SeqCst) {
            Ok(())
        } else {
            debug!("Rejecting {} while unregistered", operation);
            Err(SignalingError::Unavailable)
        }
    }

    fn ensure_known(&self, operation: &str, call: &CallHandle) -> Result<(), SignalingError> {
        if self.calls.lock().contains(call) {
            Ok(())
        } else {
            Err(SignalingError::call_failed(operation, format!("unknown call {}", call)))
        }
    }

    /// Deliver notifications from a separate task after `delay`
    fn notify_later(&self, delay: Duration, notifications: Vec<SignalingNotification>) {
        let Some(handler) = self.handler.read().clone() else {
            debug!("No event handler registered, dropping {:?}", notifications);
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for notification in notifications {
                deliver(handler.as_ref(), notification).await;
            }
        });
    }
}

async fn deliver(handler: &dyn SignalingEventHandler, notification: SignalingNotification) {
    match notification {
        SignalingNotification::IncomingCall { call, remote_uri } => {
            handler.on_incoming_call(call, remote_uri).await
        }
        SignalingNotification::CallStateChanged { call, state } => {
            handler.on_call_state_changed(call, state).await
        }
        SignalingNotification::MediaStateChanged { call, active } => {
            handler.on_media_state_changed(call, active).await
        }
    }
}

#[async_trait]
impl CallSignaling for LoopbackSignaling {
    async fn register_account(&self, account: &SipAccount) -> Result<(), SignalingError> {
        if account.username.is_empty() {
            return Err(SignalingError::registration(
                account.server.clone(),
                "no username configured",
            ));
        }
        info!("Registered {}@{} (loopback)", account.username, account.server);
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn place_call(&self, destination: &str) -> Result<CallHandle, SignalingError> {
        self.ensure_registered("place-call")?;

        let call = CallHandle::new(Uuid::new_v4().to_string());
        info!("Calling {} as {}", destination, call);
        self.calls.lock().insert(call.clone());

        self.notify_later(
            self.answer_delay,
            vec![
                SignalingNotification::CallStateChanged {
                    call: call.clone(),
                    state: RemoteCallState::Early,
                },
                SignalingNotification::CallStateChanged {
                    call: call.clone(),
                    state: RemoteCallState::Confirmed,
                },
                SignalingNotification::MediaStateChanged {
                    call: call.clone(),
                    active: true,
                },
            ],
        );

        Ok(call)
    }

    async fn answer(&self, call: &CallHandle, code: u16) -> Result<(), SignalingError> {
        self.ensure_registered("answer")?;
        info!("Answering {} with {}", call, code);

        if code >= 300 {
            self.calls.lock().remove(call);
        } else if code >= 200 {
            self.calls.lock().insert(call.clone());
            self.notify_later(
                Duration::ZERO,
                vec![SignalingNotification::MediaStateChanged {
                    call: call.clone(),
                    active: true,
                }],
            );
        }
        Ok(())
    }

    async fn hangup(&self, call: &CallHandle) -> Result<(), SignalingError> {
        info!("Hanging up {}", call);
        if self.calls.lock().remove(call) {
            self.notify_later(
                Duration::ZERO,
                vec![SignalingNotification::CallStateChanged {
                    call: call.clone(),
                    state: RemoteCallState::Disconnected,
                }],
            );
        }
        Ok(())
    }

    async fn send_dtmf(&self, call: &CallHandle, digit: char) -> Result<(), SignalingError> {
        self.ensure_known("send-dtmf", call)?;
        info!("DTMF '{}' on {}", digit, call);
        Ok(())
    }

    async fn connect_audio(&self, call: &CallHandle) -> Result<(), SignalingError> {
        self.ensure_known("connect-audio", call)?;
        info!("Audio connected on {}", call);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SignalingError> {
        let dropped = self.active_calls();
        self.calls.lock().clear();
        self.registered.store(false, Ordering::SeqCst);
        info!("Loopback signaling stopped, {} calls released", dropped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payphone_core::NotificationForwarder;
    use tokio::sync::mpsc;

    fn account() -> SipAccount {
        SipAccount {
            server: "pbx.example.org".to_string(),
            username: "payphone".to_string(),
            secret: "secret".to_string(),
        }
    }

    fn loopback() -> (LoopbackSignaling, mpsc::Receiver<SignalingNotification>) {
        let (tx, rx) = mpsc::channel(8);
        let signaling = LoopbackSignaling::new(Duration::from_millis(10));
        signaling.set_event_handler(Arc::new(NotificationForwarder::new(tx)));
        (signaling, rx)
    }

    #[tokio::test]
    async fn test_unregistered_requests_rejected() {
        let (signaling, _rx) = loopback();
        assert_eq!(
            signaling.place_call("555@pbx.example.org").await,
            Err(SignalingError::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_placed_call_is_answered() {
        let (signaling, mut rx) = loopback();
        signaling.register_account(&account()).await.unwrap();

        let call = signaling.place_call("555@pbx.example.org").await.unwrap();
        assert_eq!(signaling.active_calls(), 1);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                SignalingNotification::CallStateChanged {
                    call: call.clone(),
                    state: RemoteCallState::Early
                },
                SignalingNotification::CallStateChanged {
                    call: call.clone(),
                    state: RemoteCallState::Confirmed
                },
                SignalingNotification::MediaStateChanged {
                    call: call.clone(),
                    active: true
                },
            ]
        );

        signaling.send_dtmf(&call, '5').await.unwrap();
        signaling.hangup(&call).await.unwrap();
        assert_eq!(signaling.active_calls(), 0);
        assert!(signaling.send_dtmf(&call, '5').await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_releases_calls() {
        let (signaling, _rx) = loopback();
        signaling.register_account(&account()).await.unwrap();
        signaling.place_call("1@pbx.example.org").await.unwrap();

        signaling.shutdown().await.unwrap();
        assert_eq!(signaling.active_calls(), 0);
        assert_eq!(
            signaling.place_call("2@pbx.example.org").await,
            Err(SignalingError::Unavailable)
        );
    }
}

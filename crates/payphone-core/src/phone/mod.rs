//! Hook, ring and call coordination
//!
//! [`ControllerState`] is the single owner of the hook position, the ringer
//! flag, the dial collector and the call slot. Every input (hardware event,
//! signaling notification, tick) goes through one of its `&mut self` methods
//! and comes back as a list of [`Action`]s, so the tie-break between an
//! incoming call and a call about to be placed is decided by whichever input
//! the controller dispatches first.
//!
//! # Call transitions
//!
//! ```text
//!            incoming (idle, not dialing)         off-hook
//!   Idle ──────────────────────────────▶ Incoming ─────────▶ Active
//!    │ ▲                                    │ disconnect        │
//!    │ └────────────────────────────────────┘                   │
//!    │ dial timeout (off-hook)      confirmed / media active    │
//!    └──────────────────────▶ Outgoing ──────────────────▶ Active
//!                                │ on-hook / disconnect         │ on-hook / disconnect
//!                                ▼                              ▼
//!                               Idle                           Idle
//! ```

mod action;
mod status;

pub use action::Action;
pub use status::{ControllerStats, StatusSnapshot};

use crate::call::{
    CallHandle, CallSession, CallState, RemoteCallState, SignalingNotification, RESPONSE_BUSY,
    RESPONSE_OK, RESPONSE_RINGING,
};
use crate::config::SipAccount;
use crate::dial::{DialCollector, DialedNumber};
use crate::error::SignalingError;
use crate::line::{HardwareEvent, HookState, LineCommand};
use crate::link::LinkState;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// State owned by the controller's dispatch loop
#[derive(Debug)]
pub struct ControllerState {
    hook: HookState,
    ringing: bool,
    call: Option<CallSession>,
    collector: DialCollector,
    account: SipAccount,
    follow_on_requested: bool,
    stats: ControllerStats,
}

impl ControllerState {
    pub fn new(dial_timeout: Duration, account: SipAccount) -> Self {
        Self {
            hook: HookState::Unknown,
            ringing: false,
            call: None,
            collector: DialCollector::new(dial_timeout),
            account,
            follow_on_requested: false,
            stats: ControllerStats::default(),
        }
    }

    pub fn hook(&self) -> HookState {
        self.hook
    }

    pub fn is_ringing(&self) -> bool {
        self.ringing
    }

    pub fn call(&self) -> Option<&CallSession> {
        self.call.as_ref()
    }

    pub fn call_state(&self) -> CallState {
        self.call.as_ref().map(|c| c.state).unwrap_or_default()
    }

    /// Whether a dial sequence is being collected
    pub fn is_dialing(&self) -> bool {
        self.collector.is_accumulating()
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn snapshot(&self, link: LinkState) -> StatusSnapshot {
        StatusSnapshot {
            hook: self.hook,
            ringing: self.ringing,
            call_state: self.call_state(),
            call: self.call.clone(),
            dialing: self.collector.pending().to_string(),
            follow_on_requested: self.follow_on_requested,
            link,
            stats: self.stats.clone(),
        }
    }

    /// Dispatch one decoded hardware event
    pub fn handle_hardware_event(&mut self, event: HardwareEvent, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        match event {
            HardwareEvent::Digit(digit) => self.on_digit(digit, now, &mut actions),
            HardwareEvent::HookUp | HardwareEvent::HookDown => {
                if let Some(hook) = HookState::from_event(&event) {
                    self.on_hook(hook, &mut actions);
                }
            }
            HardwareEvent::FollowKeyPressed => {
                info!("Follow-on key pressed during {} call", self.call_state());
                self.follow_on_requested = true;
            }
        }

        actions
    }

    fn on_digit(&mut self, digit: char, now: Instant, actions: &mut Vec<Action>) {
        match &self.call {
            Some(CallSession {
                state: CallState::Active,
                handle: Some(call),
                ..
            }) => {
                debug!("Relaying DTMF '{}' to {}", digit, call);
                self.stats.dtmf_relayed += 1;
                actions.push(Action::SendDtmf {
                    call: call.clone(),
                    digit,
                });
            }
            Some(session) => {
                debug!("Ignoring digit '{}' while call is {}", digit, session.state);
            }
            None => self.collector.on_digit(digit, now),
        }
    }

    fn on_hook(&mut self, hook: HookState, actions: &mut Vec<Action>) {
        // Every hook report ends a dial sequence, repeated ones included
        self.collector.on_hook_changed(hook);

        if hook == self.hook {
            debug!("Hook already {}", hook);
            return;
        }

        info!("Handset {} (was {})", hook, self.hook);
        self.hook = hook;

        match hook {
            HookState::OffHook => self.answer_incoming(actions),
            HookState::OnHook => self.hangup_local(actions),
            HookState::Unknown => {}
        }
    }

    fn answer_incoming(&mut self, actions: &mut Vec<Action>) {
        let call = match &mut self.call {
            Some(session) if session.state == CallState::Incoming => session,
            _ => return,
        };

        if let Some(handle) = call.handle.clone() {
            info!("Answering incoming call {} from {}", handle, call.remote);
            call.state = CallState::Active;
            self.stats.calls_answered += 1;
            self.stop_ringing(actions);
            actions.push(Action::Answer {
                call: handle,
                code: RESPONSE_OK,
            });
        }
    }

    fn hangup_local(&mut self, actions: &mut Vec<Action>) {
        let ends_call = matches!(
            self.call_state(),
            CallState::Active | CallState::Outgoing
        );
        if !ends_call {
            return;
        }

        if let Some(session) = self.call.take() {
            info!("Handset down, ending {} call to {}", session.state, session.remote);
            if let Some(call) = session.handle {
                actions.push(Action::Hangup { call });
            }
        }
    }

    /// Dispatch one notification from the signaling stack
    pub fn handle_notification(&mut self, notification: SignalingNotification) -> Vec<Action> {
        let mut actions = Vec::new();

        match notification {
            SignalingNotification::IncomingCall { call, remote_uri } => {
                self.on_incoming_call(call, remote_uri, &mut actions)
            }
            SignalingNotification::CallStateChanged { call, state } => {
                self.on_call_state_changed(call, state, &mut actions)
            }
            SignalingNotification::MediaStateChanged { call, active } => {
                self.on_media_state_changed(call, active, &mut actions)
            }
        }

        actions
    }

    fn on_incoming_call(&mut self, call: CallHandle, remote_uri: String, actions: &mut Vec<Action>) {
        let busy_reason = if let Some(session) = &self.call {
            Some(format!("{} call in progress", session.state))
        } else if self.collector.is_accumulating() {
            Some("dial sequence in progress".to_string())
        } else {
            None
        };

        if let Some(reason) = busy_reason {
            info!("Rejecting call {} from {} as busy: {}", call, remote_uri, reason);
            self.stats.busy_rejections += 1;
            actions.push(Action::Answer {
                call,
                code: RESPONSE_BUSY,
            });
            return;
        }

        info!("Incoming call {} from {}", call, remote_uri);
        self.call = Some(CallSession::incoming(call.clone(), remote_uri));
        self.start_ringing(actions);
        actions.push(Action::Answer {
            call,
            code: RESPONSE_RINGING,
        });
    }

    fn on_call_state_changed(
        &mut self,
        call: CallHandle,
        state: RemoteCallState,
        actions: &mut Vec<Action>,
    ) {
        let session = match &mut self.call {
            Some(session) if session.is(&call) => session,
            _ => {
                debug!("Ignoring {:?} for unknown call {}", state, call);
                return;
            }
        };

        match state {
            RemoteCallState::Disconnected => {
                if session.state == CallState::Incoming {
                    info!("Missed call from {}", session.remote);
                    self.stats.missed_calls += 1;
                } else {
                    info!("Call {} disconnected", call);
                }
                self.call = None;
                self.stop_ringing(actions);
            }
            RemoteCallState::Confirmed => {
                if session.state == CallState::Outgoing {
                    info!("Call {} to {} answered", call, session.remote);
                    session.state = CallState::Active;
                }
            }
            other => debug!("Call {} is {:?}", call, other),
        }
    }

    fn on_media_state_changed(&mut self, call: CallHandle, active: bool, actions: &mut Vec<Action>) {
        let session = match &mut self.call {
            Some(session) if session.is(&call) => session,
            _ => {
                debug!("Ignoring media change for unknown call {}", call);
                return;
            }
        };

        if !active {
            info!("Media inactive on {}", call);
            session.media_active = false;
            return;
        }

        match session.state {
            CallState::Outgoing | CallState::Active => {
                info!("Media active on {}, connecting audio", call);
                session.state = CallState::Active;
                session.media_active = true;
                actions.push(Action::ConnectAudio { call });
            }
            CallState::Incoming | CallState::Idle => {
                debug!("Media active on unanswered call {}", call);
            }
        }
    }

    /// Periodic work: dial timeout and ringer reconciliation
    pub fn poll(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(number) = self.collector.poll_timeout(now) {
            self.place_call(number, &mut actions);
        }

        if self.call_state() == CallState::Incoming {
            self.start_ringing(&mut actions);
        } else {
            self.stop_ringing(&mut actions);
        }

        actions
    }

    fn place_call(&mut self, number: DialedNumber, actions: &mut Vec<Action>) {
        if let Some(session) = &self.call {
            warn!("Discarding dialed number {}: {} call in progress", number, session.state);
            return;
        }
        if !self.hook.is_off_hook() {
            warn!("Discarding dialed number {}: handset is {}", number, self.hook);
            return;
        }

        let destination = self.account.destination_for(number.as_str());
        info!("Placing call to {}", destination);
        self.stats.calls_placed += 1;
        self.call = Some(CallSession::outgoing(destination.clone()));
        actions.push(Action::PlaceCall { destination });
    }

    /// Attach the handle returned for a placed call
    ///
    /// If the outgoing session is gone by the time the handle arrives, the
    /// call is hung up so it does not linger in the signaling stack.
    pub fn outgoing_call_placed(&mut self, call: CallHandle) -> Vec<Action> {
        match &mut self.call {
            Some(session) if session.state == CallState::Outgoing && session.handle.is_none() => {
                debug!("Outgoing call to {} has handle {}", session.remote, call);
                session.handle = Some(call);
                Vec::new()
            }
            _ => {
                warn!("No outgoing call waiting for handle {}, hanging up", call);
                vec![Action::Hangup { call }]
            }
        }
    }

    /// Revert state after the signaling stack rejected an action
    pub fn action_failed(&mut self, action: &Action, error: &SignalingError) -> Vec<Action> {
        warn!("{} failed: {}", action, error);
        let mut actions = Vec::new();

        match action {
            Action::PlaceCall { .. } => {
                if matches!(&self.call, Some(s) if s.state == CallState::Outgoing && s.handle.is_none()) {
                    self.call = None;
                }
            }
            Action::Answer { call, code } if *code != RESPONSE_BUSY => {
                if matches!(&self.call, Some(s) if s.is(call)) {
                    self.call = None;
                    self.stop_ringing(&mut actions);
                }
            }
            _ => {}
        }

        actions
    }

    /// Undo the ringer flag for a command the link queue rejected
    ///
    /// The next [`ControllerState::poll`] issues the command again.
    pub fn line_command_dropped(&mut self, command: LineCommand) {
        self.stats.dropped_commands += 1;
        match command {
            LineCommand::RingStart => self.ringing = false,
            LineCommand::RingStop => self.ringing = true,
        }
    }

    /// Record the link's running total of dropped hardware events
    pub fn set_dropped_events(&mut self, total: u64) {
        self.stats.dropped_events = total;
    }

    pub fn link_restarted(&mut self) {
        self.stats.link_restarts += 1;
    }

    /// Release the ringer and the call slot at shutdown
    pub fn teardown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.stop_ringing(&mut actions);
        self.collector.reset();
        if let Some(session) = self.call.take() {
            if let Some(call) = session.handle {
                info!("Ending {} call {} for shutdown", session.state, call);
                actions.push(Action::Hangup { call });
            }
        }
        actions
    }

    fn start_ringing(&mut self, actions: &mut Vec<Action>) {
        if !self.ringing {
            self.ringing = true;
            actions.push(Action::Line(LineCommand::RingStart));
        }
    }

    fn stop_ringing(&mut self, actions: &mut Vec<Action>) {
        if self.ringing {
            self.ringing = false;
            actions.push(Action::Line(LineCommand::RingStop));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> SipAccount {
        SipAccount {
            server: "pbx.example.org".to_string(),
            username: "payphone".to_string(),
            secret: "secret".to_string(),
        }
    }

    fn state() -> ControllerState {
        ControllerState::new(Duration::from_secs(1), account())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn incoming(call: &CallHandle) -> SignalingNotification {
        SignalingNotification::IncomingCall {
            call: call.clone(),
            remote_uri: "sip:caller@example.org".to_string(),
        }
    }

    fn remote(call: &CallHandle, state: RemoteCallState) -> SignalingNotification {
        SignalingNotification::CallStateChanged {
            call: call.clone(),
            state,
        }
    }

    #[test]
    fn test_hook_starts_unknown() {
        let s = state();
        assert_eq!(s.hook(), HookState::Unknown);
        assert_eq!(s.call_state(), CallState::Idle);
        assert!(!s.is_ringing());
    }

    #[test]
    fn test_dial_timeout_places_call() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        for (i, d) in "555".chars().enumerate() {
            assert!(s.handle_hardware_event(HardwareEvent::Digit(d), t0 + ms(200 * i as u64)).is_empty());
        }
        assert!(s.poll(t0 + ms(900)).is_empty());

        let actions = s.poll(t0 + ms(1500));
        assert_eq!(
            actions,
            vec![Action::PlaceCall {
                destination: "555@pbx.example.org".to_string()
            }]
        );
        assert_eq!(s.call_state(), CallState::Outgoing);
        assert!(s.poll(t0 + ms(3000)).is_empty());
    }

    #[test]
    fn test_hook_change_cancels_dial() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        s.handle_hardware_event(HardwareEvent::Digit('1'), t0);
        s.handle_hardware_event(HardwareEvent::Digit('2'), t0 + ms(100));
        s.handle_hardware_event(HardwareEvent::HookDown, t0 + ms(200));
        s.handle_hardware_event(HardwareEvent::HookUp, t0 + ms(300));
        s.handle_hardware_event(HardwareEvent::Digit('3'), t0 + ms(400));

        let actions = s.poll(t0 + ms(2000));
        assert_eq!(
            actions,
            vec![Action::PlaceCall {
                destination: "3@pbx.example.org".to_string()
            }]
        );
    }

    #[test]
    fn test_repeated_hook_up_discards_dial() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        s.handle_hardware_event(HardwareEvent::Digit('1'), t0 + ms(100));
        s.handle_hardware_event(HardwareEvent::Digit('2'), t0 + ms(200));
        assert!(s.handle_hardware_event(HardwareEvent::HookUp, t0 + ms(300)).is_empty());
        assert!(!s.is_dialing());
        s.handle_hardware_event(HardwareEvent::Digit('3'), t0 + ms(400));

        let actions = s.poll(t0 + ms(1500));
        assert_eq!(
            actions,
            vec![Action::PlaceCall {
                destination: "3@pbx.example.org".to_string()
            }]
        );
        assert_eq!(s.hook(), HookState::OffHook);
    }

    #[test]
    fn test_dial_discarded_when_not_off_hook() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::Digit('1'), t0);
        assert!(s.poll(t0 + ms(2000)).is_empty());
        assert_eq!(s.call_state(), CallState::Idle);
        assert_eq!(s.stats().calls_placed, 0);
    }

    #[test]
    fn test_incoming_call_rings_once_and_answers() {
        let t0 = Instant::now();
        let mut s = state();
        let call = CallHandle::new("in-1");
        s.handle_hardware_event(HardwareEvent::HookDown, t0);

        let actions = s.handle_notification(incoming(&call));
        assert_eq!(
            actions,
            vec![
                Action::Line(LineCommand::RingStart),
                Action::Answer {
                    call: call.clone(),
                    code: RESPONSE_RINGING
                },
            ]
        );
        assert!(s.is_ringing());
        assert!(s.poll(t0 + ms(500)).is_empty());

        let actions = s.handle_hardware_event(HardwareEvent::HookUp, t0 + ms(600));
        assert_eq!(
            actions,
            vec![
                Action::Line(LineCommand::RingStop),
                Action::Answer {
                    call: call.clone(),
                    code: RESPONSE_OK
                },
            ]
        );
        assert_eq!(s.call_state(), CallState::Active);
        assert!(!s.is_ringing());
        assert!(s.poll(t0 + ms(1000)).is_empty());
    }

    #[test]
    fn test_second_incoming_rejected_busy() {
        let mut s = state();
        let first = CallHandle::new("in-1");
        let second = CallHandle::new("in-2");
        s.handle_notification(incoming(&first));
        let before = s.call().cloned();

        let actions = s.handle_notification(incoming(&second));
        assert_eq!(
            actions,
            vec![Action::Answer {
                call: second,
                code: RESPONSE_BUSY
            }]
        );
        assert_eq!(s.call().cloned(), before);
        assert_eq!(s.stats().busy_rejections, 1);
    }

    #[test]
    fn test_incoming_while_dialing_rejected_busy() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        s.handle_hardware_event(HardwareEvent::Digit('4'), t0);

        let call = CallHandle::new("in-1");
        let actions = s.handle_notification(incoming(&call));
        assert_eq!(
            actions,
            vec![Action::Answer {
                call,
                code: RESPONSE_BUSY
            }]
        );
        assert!(!s.is_ringing());
        assert!(matches!(s.poll(t0 + ms(1500)).as_slice(), [Action::PlaceCall { .. }]));
    }

    #[test]
    fn test_incoming_while_off_hook_and_idle_rings() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);

        let call = CallHandle::new("in-1");
        let actions = s.handle_notification(incoming(&call));
        assert_eq!(
            actions,
            vec![
                Action::Line(LineCommand::RingStart),
                Action::Answer {
                    call: call.clone(),
                    code: RESPONSE_RINGING
                },
            ]
        );
        assert_eq!(s.call_state(), CallState::Incoming);
        assert_eq!(s.stats().busy_rejections, 0);

        // Handset already up: putting it down keeps the call ringing, lifting answers
        assert!(s.handle_hardware_event(HardwareEvent::HookDown, t0 + ms(100)).is_empty());
        assert_eq!(s.call_state(), CallState::Incoming);
        let actions = s.handle_hardware_event(HardwareEvent::HookUp, t0 + ms(200));
        assert_eq!(
            actions,
            vec![
                Action::Line(LineCommand::RingStop),
                Action::Answer {
                    call,
                    code: RESPONSE_OK
                },
            ]
        );
        assert_eq!(s.call_state(), CallState::Active);
    }

    #[test]
    fn test_digits_relayed_during_active_call() {
        let t0 = Instant::now();
        let mut s = state();
        let call = CallHandle::new("in-1");
        s.handle_hardware_event(HardwareEvent::HookDown, t0);
        s.handle_notification(incoming(&call));
        s.handle_hardware_event(HardwareEvent::HookUp, t0);

        let actions = s.handle_hardware_event(HardwareEvent::Digit('7'), t0 + ms(100));
        assert_eq!(
            actions,
            vec![Action::SendDtmf {
                call: call.clone(),
                digit: '7'
            }]
        );
        assert!(!s.is_dialing());
        assert!(s.poll(t0 + ms(5000)).is_empty());
    }

    #[test]
    fn test_outgoing_round_trip_clears_state() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        s.handle_hardware_event(HardwareEvent::Digit('1'), t0);
        s.poll(t0 + ms(1500));

        let call = CallHandle::new("out-1");
        assert!(s.outgoing_call_placed(call.clone()).is_empty());
        s.handle_notification(remote(&call, RemoteCallState::Confirmed));
        let actions = s.handle_notification(SignalingNotification::MediaStateChanged {
            call: call.clone(),
            active: true,
        });
        assert_eq!(actions, vec![Action::ConnectAudio { call: call.clone() }]);
        assert_eq!(s.call_state(), CallState::Active);

        assert!(s.handle_notification(remote(&call, RemoteCallState::Disconnected)).is_empty());
        assert_eq!(s.call_state(), CallState::Idle);
        assert!(!s.is_ringing());
        assert_eq!(s.hook(), HookState::OffHook);
    }

    #[test]
    fn test_disconnect_clears_call_for_any_hook_state() {
        for hook in [HookState::Unknown, HookState::OnHook, HookState::OffHook] {
            let t0 = Instant::now();
            let mut s = state();
            s.handle_hardware_event(HardwareEvent::HookUp, t0);
            s.handle_hardware_event(HardwareEvent::Digit('2'), t0);
            s.poll(t0 + ms(1500));
            let call = CallHandle::new("out-1");
            s.outgoing_call_placed(call.clone());
            s.handle_notification(remote(&call, RemoteCallState::Confirmed));
            assert_eq!(s.call_state(), CallState::Active);

            // Position as last reported by hardware, without the hook handling
            s.hook = hook;
            assert!(s.handle_notification(remote(&call, RemoteCallState::Disconnected)).is_empty());
            assert_eq!(s.call_state(), CallState::Idle, "hook {}", hook);
            assert!(s.call().is_none());
            assert!(!s.is_ringing());
            assert_eq!(s.hook(), hook);
        }
    }

    #[test]
    fn test_media_inactive_keeps_call() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        s.handle_hardware_event(HardwareEvent::Digit('8'), t0);
        s.poll(t0 + ms(1500));
        let call = CallHandle::new("out-1");
        s.outgoing_call_placed(call.clone());
        s.handle_notification(SignalingNotification::MediaStateChanged {
            call: call.clone(),
            active: true,
        });
        assert!(s.call().unwrap().media_active);

        let actions = s.handle_notification(SignalingNotification::MediaStateChanged {
            call: call.clone(),
            active: false,
        });
        assert!(actions.is_empty());
        let session = s.call().unwrap();
        assert!(!session.media_active);
        assert!(session.is(&call));
        assert_eq!(s.call_state(), CallState::Active);

        // digits still go to the call
        assert_eq!(
            s.handle_hardware_event(HardwareEvent::Digit('9'), t0 + ms(2000)),
            vec![Action::SendDtmf { call, digit: '9' }]
        );
    }

    #[test]
    fn test_on_hook_hangs_up_active_call() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        s.handle_hardware_event(HardwareEvent::Digit('1'), t0);
        s.poll(t0 + ms(1500));
        let call = CallHandle::new("out-1");
        s.outgoing_call_placed(call.clone());
        s.handle_notification(remote(&call, RemoteCallState::Confirmed));

        let actions = s.handle_hardware_event(HardwareEvent::HookDown, t0 + ms(2000));
        assert_eq!(actions, vec![Action::Hangup { call: call.clone() }]);
        assert_eq!(s.call_state(), CallState::Idle);

        // late disconnect for the same call is ignored
        assert!(s.handle_notification(remote(&call, RemoteCallState::Disconnected)).is_empty());
    }

    #[test]
    fn test_missed_call_counted() {
        let mut s = state();
        let call = CallHandle::new("in-1");
        s.handle_notification(incoming(&call));

        let actions = s.handle_notification(remote(&call, RemoteCallState::Disconnected));
        assert_eq!(actions, vec![Action::Line(LineCommand::RingStop)]);
        assert_eq!(s.stats().missed_calls, 1);
        assert_eq!(s.call_state(), CallState::Idle);
    }

    #[test]
    fn test_failed_place_call_reverts_to_idle() {
        let t0 = Instant::now();
        let mut s = state();
        s.handle_hardware_event(HardwareEvent::HookUp, t0);
        s.handle_hardware_event(HardwareEvent::Digit('1'), t0);
        let actions = s.poll(t0 + ms(1500));

        let error = SignalingError::call_failed("place-call", "no route");
        assert!(s.action_failed(&actions[0], &error).is_empty());
        assert_eq!(s.call_state(), CallState::Idle);
    }

    #[test]
    fn test_failed_ringing_answer_stops_ringer() {
        let mut s = state();
        let call = CallHandle::new("in-1");
        let actions = s.handle_notification(incoming(&call));

        let error = SignalingError::call_failed("answer", "transaction gone");
        let follow_up = s.action_failed(&actions[1], &error);
        assert_eq!(follow_up, vec![Action::Line(LineCommand::RingStop)]);
        assert_eq!(s.call_state(), CallState::Idle);
    }

    #[test]
    fn test_dropped_ring_command_is_retried() {
        let mut s = state();
        let call = CallHandle::new("in-1");
        s.handle_notification(incoming(&call));
        s.line_command_dropped(LineCommand::RingStart);
        assert!(!s.is_ringing());

        let actions = s.poll(Instant::now());
        assert_eq!(actions, vec![Action::Line(LineCommand::RingStart)]);
        assert_eq!(s.stats().dropped_commands, 1);
    }

    #[test]
    fn test_late_handle_is_hung_up() {
        let mut s = state();
        let call = CallHandle::new("out-9");
        assert_eq!(
            s.outgoing_call_placed(call.clone()),
            vec![Action::Hangup { call }]
        );
    }

    #[test]
    fn test_teardown_releases_ringer_and_call() {
        let mut s = state();
        let call = CallHandle::new("in-1");
        s.handle_notification(incoming(&call));

        let actions = s.teardown();
        assert_eq!(
            actions,
            vec![
                Action::Line(LineCommand::RingStop),
                Action::Hangup { call }
            ]
        );
        assert!(s.teardown().is_empty());
    }

    #[test]
    fn test_follow_key_recorded() {
        let mut s = state();
        assert!(s.handle_hardware_event(HardwareEvent::FollowKeyPressed, Instant::now()).is_empty());
        assert!(s.snapshot(LinkState::Open).follow_on_requested);
    }
}

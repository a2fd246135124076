//! The supervisor loop
//!
//! [`PhoneController`] is the single dispatch point of the gateway. One task
//! selects over the stop signal, the hardware event queue, the signaling
//! notification queue and the supervision tick, feeds each input into
//! [`ControllerState`] and executes the returned [`Action`]s. Nothing else
//! mutates hook, ringer or call state.
//!
//! Every way out of [`PhoneController::run`] (stop signal, fatal link failure,
//! failed registration) goes through the same teardown: stop the loop, flush
//! and join the serial worker, hang up the call, shut down signaling.

use crate::call::{CallSignaling, NotificationForwarder, SignalingNotification};
use crate::config::{ControllerConfig, SipAccount};
use crate::error::{PayphoneResult, SignalingError};
use crate::line::ReceivedEvent;
use crate::link::{LinkCommandSink, LinkState, PortOpener, SerialLink};
use crate::phone::{Action, ControllerState, StatusSnapshot};
use crate::supervisor::{RestartPolicy, SupervisionOutcome, Supervisor};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Coordinates the serial link, the phone state machine and call signaling
pub struct PhoneController {
    config: ControllerConfig,
    account: SipAccount,
    state: ControllerState,
    signaling: Arc<dyn CallSignaling>,
    link: SerialLink,
    events: mpsc::Receiver<ReceivedEvent>,
    commands: LinkCommandSink,
    notification_tx: mpsc::Sender<SignalingNotification>,
    notifications: mpsc::Receiver<SignalingNotification>,
    supervisor: Supervisor,
    shutdown: CancellationToken,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl PhoneController {
    /// Build a controller; nothing is opened or registered until [`PhoneController::run`]
    pub fn new(
        config: ControllerConfig,
        account: SipAccount,
        signaling: Arc<dyn CallSignaling>,
        opener: Arc<dyn PortOpener>,
        shutdown: CancellationToken,
    ) -> PayphoneResult<Self> {
        config.validate()?;

        // The link has its own stop token so teardown can flush it after the loop ends
        let (link, queues) = SerialLink::new(opener, &config, CancellationToken::new());
        let (notification_tx, notifications) = mpsc::channel(config.notification_queue_capacity);
        let state = ControllerState::new(config.dial_timeout(), account.clone());
        let (status_tx, _) = watch::channel(state.snapshot(LinkState::Closed));
        let supervisor = Supervisor::new(RestartPolicy::from(&config));

        Ok(Self {
            config,
            account,
            state,
            signaling,
            link,
            events: queues.events,
            commands: queues.commands,
            notification_tx,
            notifications,
            supervisor,
            shutdown,
            status_tx,
        })
    }

    /// Handler to register with the signaling stack
    ///
    /// Callbacks are queued and applied by the dispatch loop, never from the
    /// caller's context.
    pub fn notification_handler(&self) -> NotificationForwarder {
        NotificationForwarder::new(self.notification_tx.clone())
    }

    /// Status published after every dispatch
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.subscribe()
    }

    /// Token that stops the controller when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register, open the link and dispatch until stopped or a fatal error
    pub async fn run(mut self) -> PayphoneResult<()> {
        let result = match self.start().await {
            Ok(()) => self.dispatch_loop().await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!("Payphone controller stopping: {}", e);
        }
        self.teardown().await;

        result
    }

    async fn start(&mut self) -> PayphoneResult<()> {
        info!(
            "Registering {} with {}",
            self.account.username, self.account.server
        );
        let limit = self.config.signaling_timeout();
        match tokio::time::timeout(limit, self.signaling.register_account(&self.account)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SignalingError::registration(
                    self.account.server.clone(),
                    format!("no response within {:?}", limit),
                )
                .into());
            }
        }
        info!("Registered with {}", self.account.server);

        self.link.open()?;
        self.publish_status();
        Ok(())
    }

    async fn dispatch_loop(&mut self) -> PayphoneResult<()> {
        let period = self.config.tick_interval();
        let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Stop requested");
                    return Ok(());
                }

                Some(received) = self.events.recv() => {
                    debug!("Hardware event {:?}", received.event);
                    let actions = self
                        .state
                        .handle_hardware_event(received.event, received.received_at);
                    self.execute(actions).await;
                }

                Some(notification) = self.notifications.recv() => {
                    debug!("Signaling notification {:?}", notification);
                    let actions = self.state.handle_notification(notification);
                    self.execute(actions).await;
                }

                _ = tick.tick() => self.on_tick().await?,
            }

            self.link.set_dial_in_progress(self.state.is_dialing());
            self.publish_status();
        }
    }

    async fn on_tick(&mut self) -> PayphoneResult<()> {
        match self.supervisor.check(&mut self.link, &self.shutdown).await? {
            SupervisionOutcome::Recovered | SupervisionOutcome::StillDown { .. } => {
                self.state.link_restarted();
            }
            SupervisionOutcome::Healthy | SupervisionOutcome::Cancelled => {}
        }

        self.state.set_dropped_events(self.link.dropped_events());
        let actions = self.state.poll(Instant::now());
        self.execute(actions).await;
        Ok(())
    }

    /// Run actions in order, including any follow-ups they produce
    async fn execute(&mut self, actions: Vec<Action>) {
        let mut pending = VecDeque::from(actions);
        while let Some(action) = pending.pop_front() {
            pending.extend(self.perform(&action).await);
        }
    }

    async fn perform(&mut self, action: &Action) -> Vec<Action> {
        let signaling = Arc::clone(&self.signaling);
        let limit = self.config.signaling_timeout();
        let operation = action.operation();

        let result = match action {
            Action::Line(command) => {
                if let Err(e) = self.commands.try_send(*command) {
                    warn!("{}, dropping {}", e, command);
                    self.state.line_command_dropped(*command);
                }
                return Vec::new();
            }
            Action::PlaceCall { destination } => {
                return match bounded(operation, limit, signaling.place_call(destination)).await {
                    Ok(call) => self.state.outgoing_call_placed(call),
                    Err(e) => self.state.action_failed(action, &e),
                };
            }
            Action::Answer { call, code } => {
                bounded(operation, limit, signaling.answer(call, *code)).await
            }
            Action::Hangup { call } => bounded(operation, limit, signaling.hangup(call)).await,
            Action::SendDtmf { call, digit } => {
                bounded(operation, limit, signaling.send_dtmf(call, *digit)).await
            }
            Action::ConnectAudio { call } => {
                bounded(operation, limit, signaling.connect_audio(call)).await
            }
        };

        match result {
            Ok(()) => Vec::new(),
            Err(e) => self.state.action_failed(action, &e),
        }
    }

    fn publish_status(&self) {
        self.status_tx
            .send_replace(self.state.snapshot(self.link.state()));
    }

    /// Release everything in order: loop, serial worker, call, signaling
    async fn teardown(&mut self) {
        info!("Tearing down payphone controller");
        self.shutdown.cancel();

        let mut hangups = Vec::new();
        for action in self.state.teardown() {
            match action {
                // Written by the worker before it closes the device
                Action::Line(command) => {
                    if let Err(e) = self.commands.try_send(command) {
                        warn!("{}, dropping {} at shutdown", e, command);
                    }
                }
                Action::Hangup { call } => hangups.push(call),
                other => debug!("Skipping {} at shutdown", other),
            }
        }

        if let Some(exit) = self.link.close(self.config.link_join_timeout()).await {
            if exit.is_failure() {
                warn!("Serial worker ended with a failure: {:?}", exit);
            }
        }

        let limit = self.config.signaling_timeout();
        for call in hangups {
            if let Err(e) = bounded("hangup", limit, self.signaling.hangup(&call)).await {
                warn!("Could not hang up {} at shutdown: {}", call, e);
            }
        }
        if let Err(e) = bounded("shutdown", limit, self.signaling.shutdown()).await {
            warn!("Signaling shutdown failed: {}", e);
        }

        self.publish_status();
        info!("Payphone controller stopped");
    }
}

/// Await a signaling request for at most `limit`
async fn bounded<T, F>(operation: &str, limit: Duration, request: F) -> Result<T, SignalingError>
where
    F: Future<Output = Result<T, SignalingError>>,
{
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(SignalingError::call_failed(
            operation,
            format!("no response within {:?}", limit),
        )),
    }
}

//! Supervised serial link to the payphone hardware
//!
//! [`SerialLink`] is the handle the controller keeps. It owns the two bounded
//! queues that connect the blocking worker to the async dispatch loop:
//!
//! ```text
//!   device ──▶ LinkWorker ──ReceivedEvent──▶ controller
//!   device ◀── LinkWorker ◀──LineCommand──── LinkCommandSink
//! ```
//!
//! Both queues are only ever used with non-blocking operations. The worker
//! runs on tokio's blocking pool and owns the device exclusively; when it
//! dies, [`SerialLink::respawn`] starts a fresh instance that inherits the
//! queued commands.

mod port;
mod worker;

pub use port::{LinkPort, PortOpener, SerialPortOpener};
pub use worker::LinkExit;

use crate::config::ControllerConfig;
use crate::error::{LinkError, QueueFull};
use crate::line::{LineCommand, LineEventDecoder, ReceivedEvent};
use crate::supervisor::Restartable;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use worker::{LinkWorker, WorkerShared};

/// Connection state of the serial device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum LinkState {
    #[default]
    Closed,
    Open,
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Closed => write!(f, "closed"),
            LinkState::Open => write!(f, "open"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}

/// Non-blocking producer side of the outbound command queue
#[derive(Debug, Clone)]
pub struct LinkCommandSink {
    tx: mpsc::Sender<LineCommand>,
}

impl LinkCommandSink {
    /// Enqueue a command without waiting
    pub fn try_send(&self, command: LineCommand) -> Result<(), QueueFull> {
        self.tx
            .try_send(command)
            .map_err(|_| QueueFull { queue: "command" })
    }
}

/// Queues handed to the controller when the link is created
#[derive(Debug)]
pub struct LinkQueues {
    pub events: mpsc::Receiver<ReceivedEvent>,
    pub commands: LinkCommandSink,
}

struct WorkerInstance {
    cancel: CancellationToken,
    handle: JoinHandle<LinkExit>,
}

/// Handle to the serial link worker
pub struct SerialLink {
    shared: WorkerShared,
    stop: CancellationToken,
    instance: Option<WorkerInstance>,
    state_rx: watch::Receiver<LinkState>,
}

impl SerialLink {
    /// Create the link and its queues; no worker runs until [`SerialLink::open`]
    ///
    /// Cancelling `stop` stops the current worker instance and prevents any
    /// further restarts.
    pub fn new(
        opener: Arc<dyn PortOpener>,
        config: &ControllerConfig,
        stop: CancellationToken,
    ) -> (Self, LinkQueues) {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity);
        let (state_tx, state_rx) = watch::channel(LinkState::Closed);

        let shared = WorkerShared {
            opener,
            decoder: LineEventDecoder::new(config.symbols.clone()),
            events: event_tx,
            commands: Arc::new(Mutex::new(command_rx)),
            dial_in_progress: Arc::new(AtomicBool::new(false)),
            dropped_events: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state_tx),
            fast_poll: config.fast_poll(),
            slow_poll: config.slow_poll(),
        };

        let link = Self {
            shared,
            stop,
            instance: None,
            state_rx,
        };
        let queues = LinkQueues {
            events: event_rx,
            commands: LinkCommandSink { tx: command_tx },
        };

        (link, queues)
    }

    pub fn port_name(&self) -> &str {
        self.shared.opener.port_name()
    }

    /// Open the device and start the first worker
    ///
    /// The device is opened on the caller's task so that a missing device is
    /// reported directly instead of through a dead worker.
    pub fn open(&mut self) -> Result<(), LinkError> {
        let port = self.shared.opener.open()?;
        info!("Opened serial port {}", self.port_name());
        self.shared.state.send_replace(LinkState::Open);
        self.spawn(Some(port));
        Ok(())
    }

    fn spawn(&mut self, port: Option<Box<dyn LinkPort>>) {
        let cancel = self.stop.child_token();
        let worker = LinkWorker::new(self.shared.clone(), port, cancel.clone());
        let handle = tokio::task::spawn_blocking(move || worker.run());
        self.instance = Some(WorkerInstance { cancel, handle });
    }

    /// Whether a worker instance is currently running
    pub fn is_running(&self) -> bool {
        self.instance
            .as_ref()
            .map(|i| !i.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Hint the worker to poll quickly while a dial sequence is in progress
    pub fn set_dial_in_progress(&self, active: bool) {
        self.shared.dial_in_progress.store(active, Ordering::Relaxed);
    }

    /// Hardware events dropped because the event queue was full
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }

    /// Start a fresh worker, reaping the previous instance first
    pub async fn respawn(&mut self) {
        if let Some(exit) = self.reap().await {
            debug!("Previous serial worker ended with {:?}", exit);
        }
        if self.stop.is_cancelled() {
            return;
        }
        info!("Restarting serial worker on {}", self.port_name());
        self.shared.state.send_replace(LinkState::Closed);
        self.spawn(None);
    }

    async fn reap(&mut self) -> Option<LinkExit> {
        let instance = self.instance.take()?;
        if !instance.handle.is_finished() {
            instance.cancel.cancel();
        }
        match instance.handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!("Serial worker panicked: {}", e);
                self.shared.state.send_replace(LinkState::Failed);
                None
            }
        }
    }

    /// Stop the worker and wait at most `timeout` for it to exit
    ///
    /// Commands still queued are written before the device is closed.
    pub async fn close(&mut self, timeout: Duration) -> Option<LinkExit> {
        self.stop.cancel();
        let instance = self.instance.take()?;

        match tokio::time::timeout(timeout, instance.handle).await {
            Ok(Ok(exit)) => {
                info!("Serial worker stopped: {:?}", exit);
                Some(exit)
            }
            Ok(Err(e)) => {
                warn!("Serial worker panicked during shutdown: {}", e);
                None
            }
            Err(_) => {
                warn!("Serial worker did not stop within {:?}", timeout);
                None
            }
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[async_trait]
impl Restartable for SerialLink {
    fn name(&self) -> &str {
        "serial link"
    }

    /// Running and holding an open device
    fn is_alive(&self) -> bool {
        self.is_running() && self.state() == LinkState::Open
    }

    async fn restart(&mut self) {
        self.respawn().await
    }
}

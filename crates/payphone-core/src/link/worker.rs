use super::port::{LinkPort, PortOpener};
use super::LinkState;
use crate::error::LinkError;
use crate::line::{LineCommand, LineEventDecoder, ReceivedEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a worker instance ended
#[derive(Debug)]
pub enum LinkExit {
    /// Stop signal observed, or the controller went away
    Stopped,
    /// The device could not be opened
    OpenFailed(LinkError),
    /// Read or write failed on the open device
    IoFailed(LinkError),
}

impl LinkExit {
    pub fn is_failure(&self) -> bool {
        !matches!(self, LinkExit::Stopped)
    }
}

/// Everything a worker instance shares with the [`super::SerialLink`] handle
#[derive(Clone)]
pub(crate) struct WorkerShared {
    pub opener: Arc<dyn PortOpener>,
    pub decoder: LineEventDecoder,
    pub events: mpsc::Sender<ReceivedEvent>,
    pub commands: Arc<Mutex<mpsc::Receiver<LineCommand>>>,
    pub dial_in_progress: Arc<AtomicBool>,
    pub dropped_events: Arc<AtomicU64>,
    pub state: Arc<watch::Sender<LinkState>>,
    pub fast_poll: Duration,
    pub slow_poll: Duration,
}

/// One run of the serial link, from open to close
///
/// A worker never reopens its device. Any failure ends the instance and the
/// supervisor decides whether to start another one.
pub(crate) struct LinkWorker {
    shared: WorkerShared,
    port: Option<Box<dyn LinkPort>>,
    cancel: CancellationToken,
}

impl LinkWorker {
    pub fn new(shared: WorkerShared, port: Option<Box<dyn LinkPort>>, cancel: CancellationToken) -> Self {
        Self {
            shared,
            port,
            cancel,
        }
    }

    pub fn run(mut self) -> LinkExit {
        let mut port = match self.port.take() {
            Some(port) => port,
            None => match self.shared.opener.open() {
                Ok(port) => port,
                Err(e) => {
                    error!("Serial worker could not open {}: {}", self.shared.opener.port_name(), e);
                    self.shared.state.send_replace(LinkState::Failed);
                    return LinkExit::OpenFailed(e);
                }
            },
        };

        info!("Serial worker started on {}", port.name());
        self.shared.state.send_replace(LinkState::Open);

        let exit = match port.clear_input() {
            Ok(()) => self.poll_loop(port.as_mut()),
            Err(e) => LinkExit::IoFailed(e),
        };

        match &exit {
            LinkExit::Stopped => {
                info!("Closing serial port {}", port.name());
                self.shared.state.send_replace(LinkState::Closed);
            }
            LinkExit::OpenFailed(e) | LinkExit::IoFailed(e) => {
                error!("Serial I/O error on {}, closing port: {}", port.name(), e);
                self.shared.state.send_replace(LinkState::Failed);
            }
        }
        drop(port);

        exit
    }

    fn poll_loop(&mut self, port: &mut dyn LinkPort) -> LinkExit {
        while !self.cancel.is_cancelled() {
            let pending = match port.bytes_to_read() {
                Ok(n) => n,
                Err(e) => return LinkExit::IoFailed(e),
            };

            if pending > 0 {
                match port.read_byte() {
                    Ok(Some(byte)) => self.dispatch(byte, Instant::now()),
                    Ok(None) => {}
                    Err(e) => return LinkExit::IoFailed(e),
                }
            }

            let next = self.shared.commands.lock().try_recv();
            match next {
                Ok(command) => {
                    let byte = self.shared.decoder.encode(command);
                    if let Err(e) = port.write_byte(byte) {
                        return LinkExit::IoFailed(e);
                    }
                    debug!("TX: {} ({})", byte as char, command);
                }
                Err(mpsc::error::TryRecvError::Empty) => {}
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    info!("Command queue closed, stopping serial worker");
                    return LinkExit::Stopped;
                }
            }

            let interval = if pending > 1 || self.shared.dial_in_progress.load(Ordering::Relaxed) {
                self.shared.fast_poll
            } else {
                self.shared.slow_poll
            };
            std::thread::sleep(interval);
        }

        self.flush_commands(port)
    }

    /// Write whatever is still queued before the device is closed
    fn flush_commands(&mut self, port: &mut dyn LinkPort) -> LinkExit {
        loop {
            let next = self.shared.commands.lock().try_recv();
            let Ok(command) = next else {
                return LinkExit::Stopped;
            };
            let byte = self.shared.decoder.encode(command);
            if let Err(e) = port.write_byte(byte) {
                return LinkExit::IoFailed(e);
            }
            debug!("TX: {} ({}) during shutdown", byte as char, command);
        }
    }

    fn dispatch(&self, byte: u8, received_at: Instant) {
        debug!("RX: 0x{:02x}", byte);

        let Some(event) = self.shared.decoder.decode(byte) else {
            return;
        };

        let received = ReceivedEvent { event, received_at };
        if let Err(e) = self.shared.events.try_send(received) {
            self.shared.dropped_events.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(dropped) => {
                    warn!("Event queue full, dropping {:?}", dropped.event);
                }
                mpsc::error::TrySendError::Closed(dropped) => {
                    warn!("Controller gone, dropping {:?}", dropped.event);
                }
            }
        }
    }
}

//! OS signal handling for the foreground process

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What a received signal asks the gateway to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Stop gracefully and exit normally
    Stop,
    /// Stop gracefully and exit with a failure status
    Terminate,
    /// Reload the configuration
    Reload,
}

/// Map a signal to the action the gateway takes for it
pub fn action_for(kind: SignalKind) -> Option<SignalAction> {
    if kind == SignalKind::terminate() || kind == SignalKind::interrupt() {
        Some(SignalAction::Stop)
    } else if kind == SignalKind::hangup() {
        Some(SignalAction::Terminate)
    } else if kind == SignalKind::user_defined1() {
        Some(SignalAction::Reload)
    } else {
        None
    }
}

/// Running signal listener
pub struct SignalWatcher {
    hangup: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SignalWatcher {
    /// Listen for signals and cancel `shutdown` when one asks to stop
    pub fn install(shutdown: CancellationToken) -> Result<Self> {
        let mut term = listen(SignalKind::terminate())?;
        let mut int = listen(SignalKind::interrupt())?;
        let mut hup = listen(SignalKind::hangup())?;
        let mut usr1 = listen(SignalKind::user_defined1())?;

        let hangup = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&hangup);

        let task = tokio::spawn(async move {
            loop {
                let (name, kind) = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = term.recv() => ("SIGTERM", SignalKind::terminate()),
                    _ = int.recv() => ("SIGINT", SignalKind::interrupt()),
                    _ = hup.recv() => ("SIGHUP", SignalKind::hangup()),
                    _ = usr1.recv() => ("SIGUSR1", SignalKind::user_defined1()),
                };

                match action_for(kind) {
                    Some(SignalAction::Stop) => {
                        info!("Received {}, stopping", name);
                        shutdown.cancel();
                        return;
                    }
                    Some(SignalAction::Terminate) => {
                        warn!("Received {}, terminating", name);
                        flag.store(true, Ordering::SeqCst);
                        shutdown.cancel();
                        return;
                    }
                    Some(SignalAction::Reload) => {
                        info!("Received {}, configuration reload is not supported while running", name);
                    }
                    None => {}
                }
            }
        });

        Ok(Self { hangup, task })
    }

    /// Whether the process was stopped by SIGHUP
    pub fn terminated(&self) -> bool {
        self.hangup.load(Ordering::SeqCst)
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn listen(kind: SignalKind) -> Result<Signal> {
    signal(kind).with_context(|| format!("failed to install handler for signal {}", kind.as_raw_value()))
}

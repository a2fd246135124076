//! PID file handling for the background service
//!
//! A PID file naming a process that no longer exists is stale and is removed
//! whenever it is looked at.

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded in the file, if the file exists and holds one
    pub fn read_pid(&self) -> Result<Option<Pid>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        match text.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(Pid::from_raw(pid))),
            _ => {
                warn!("Ignoring malformed PID file {}", self.path.display());
                Ok(None)
            }
        }
    }

    /// PID of the running instance, removing the file if it is stale
    pub fn running_pid(&self) -> Result<Option<Pid>> {
        let Some(pid) = self.read_pid()? else {
            return Ok(None);
        };
        if is_running(pid) {
            return Ok(Some(pid));
        }

        debug!("Removing stale PID file for {}", pid);
        self.remove()?;
        Ok(None)
    }

    /// Record this process in the file
    pub fn acquire(&self) -> Result<PidGuard> {
        if let Some(pid) = self.running_pid()? {
            bail!("already running (PID {})", pid);
        }
        // Anything left at this point is malformed
        self.remove()?;

        info!("Acquiring PID file {}", self.path.display());
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        writeln!(file, "{}", std::process::id())?;

        Ok(PidGuard {
            path: self.path.clone(),
        })
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

/// Removes the PID file when dropped
#[derive(Debug)]
pub struct PidGuard {
    path: PathBuf,
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        info!("Removing PID file {}", self.path.display());
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// Whether `pid` names a live process
pub fn is_running(pid: Pid) -> bool {
    match signal::kill(pid, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        // Exists but belongs to someone else
        Err(_) => true,
    }
}

/// Ask the process to shut down gracefully
pub fn terminate(pid: Pid) -> Result<()> {
    signal::kill(pid, Signal::SIGTERM)
        .with_context(|| format!("failed to terminate {}, try sudo", pid))
}

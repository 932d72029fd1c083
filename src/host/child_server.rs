//! Game server supervised as a child of the daemon.
//!
//! The daemon starts the server at bootstrap and owns its process. A reset
//! stops it before any save file is deleted, and the daemon's own exit then
//! lets the supervisor restart both. Stopping escalates: the configured stop
//! command (for example an RCON `quit`), then SIGTERM, then a kill.

use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::ServerControl;
use crate::config::ServerConfig;
use crate::{AppError, Result};

const EXIT_POLL: Duration = Duration::from_millis(100);

/// The game server process started by the daemon.
#[derive(Debug)]
pub struct ChildServer {
    child: Mutex<Option<Child>>,
    stop_command: Vec<String>,
    stop_timeout: Duration,
}

impl ChildServer {
    /// Start the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` if no command is configured or the process
    /// cannot be spawned.
    pub fn spawn(config: &ServerConfig) -> Result<Self> {
        let Some((program, args)) = config.command.split_first() else {
            return Err(AppError::Server("no server command configured".into()));
        };

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        if let Some(ref dir) = config.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|err| AppError::Server(format!("failed to start {program}: {err}")))?;
        info!(pid = child.id(), %program, "game server started");

        Ok(Self {
            child: Mutex::new(Some(child)),
            stop_command: config.stop_command.clone(),
            stop_timeout: config.stop_timeout(),
        })
    }

    /// Exit status if the server has exited, without blocking.
    ///
    /// Returns `Ok(None)` while the process runs or while a stop is in
    /// progress on another thread.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` if the process status cannot be queried.
    pub fn exit_status(&self) -> Result<Option<ExitStatus>> {
        let mut guard = match self.child.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(None),
        };
        match guard.as_mut() {
            Some(child) => child
                .try_wait()
                .map_err(|err| AppError::Server(format!("cannot poll game server: {err}"))),
            None => Ok(None),
        }
    }

    fn run_stop_command(&self) {
        let Some((program, args)) = self.stop_command.split_first() else {
            return;
        };
        match Command::new(program).args(args).stdin(Stdio::null()).status() {
            Ok(status) if status.success() => info!(%program, "stop command sent"),
            Ok(status) => warn!(%program, %status, "stop command failed"),
            Err(err) => warn!(%program, %err, "cannot run stop command"),
        }
    }
}

impl ServerControl for ChildServer {
    fn stop(&self) -> Result<()> {
        let mut guard = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(child) = guard.as_mut() else {
            return Ok(());
        };
        let pid = child.id();

        if !self.stop_command.is_empty() && poll(child)?.is_none() {
            self.run_stop_command();
            if let Some(status) = wait_for_exit(child, self.stop_timeout)? {
                info!(pid, %status, "game server stopped");
                *guard = None;
                return Ok(());
            }
            warn!(pid, timeout = ?self.stop_timeout, "game server ignored the stop command");
        }

        if poll(child)?.is_none() {
            terminate(child)?;
            if let Some(status) = wait_for_exit(child, self.stop_timeout)? {
                info!(pid, %status, "game server stopped");
                *guard = None;
                return Ok(());
            }
            warn!(pid, "game server still running after SIGTERM; killing it");
        }

        if poll(child)?.is_none() {
            child.kill().map_err(|err| {
                error!(pid, %err, "cannot kill game server");
                AppError::Server(format!("cannot kill game server {pid}: {err}"))
            })?;
        }
        let status = child
            .wait()
            .map_err(|err| AppError::Server(format!("cannot reap game server {pid}: {err}")))?;
        info!(pid, %status, "game server stopped");
        *guard = None;
        Ok(())
    }
}

fn poll(child: &mut Child) -> Result<Option<ExitStatus>> {
    child
        .try_wait()
        .map_err(|err| AppError::Server(format!("cannot poll game server: {err}")))
}

fn wait_for_exit(child: &mut Child, limit: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = poll(child)? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(EXIT_POLL.min(deadline - now));
    }
}

#[cfg(unix)]
fn terminate(child: &Child) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(child.id())
        .map_err(|err| AppError::Server(format!("invalid pid {}: {err}", child.id())))?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(err) => Err(AppError::Server(format!("cannot signal game server {raw}: {err}"))),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<()> {
    child
        .kill()
        .map_err(|err| AppError::Server(format!("cannot stop game server {}: {err}", child.id())))
}

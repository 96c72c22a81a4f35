// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::ExitStatus;
use tokio::process::Child;
use tokio::time::{Duration, Instant, sleep, timeout};

const SIGKILL_TIMEOUT: Duration = Duration::from_secs(5);
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a termination request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited after SIGTERM.
    Exited,
    /// Needed SIGKILL after the stop timeout.
    Killed,
    /// Still alive after SIGKILL.
    Unresponsive,
}

/// A server process, either spawned by this supervisor (with a child handle
/// that can be awaited and reaped) or adopted from a pid record.
#[derive(Debug)]
pub struct ServerProcess {
    pid: u32,
    child: Option<Child>,
}

impl ServerProcess {
    pub fn from_child(child: Child) -> Option<Self> {
        let pid = child.id()?;
        Some(Self {
            pid,
            child: Some(child),
        })
    }

    /// Track a pid we hold no handle for.
    pub fn adopt(pid: u32) -> Self {
        Self { pid, child: None }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn has_child_handle(&self) -> bool {
        self.child.is_some()
    }

    /// Exit status when a spawned child has already exited. Adopted processes
    /// carry no status and always report `None`.
    pub fn try_exit(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("[filebrowser] could not poll pid {}: {e}", self.pid);
                None
            }
        }
    }

    pub fn is_running(&mut self) -> bool {
        if self.child.is_some() {
            return self.try_exit().is_none();
        }
        pid_is_alive(self.pid)
    }

    pub fn send_signal(&self, sig: Signal) -> Result<(), Errno> {
        signal::kill(to_nix_pid(self.pid)?, sig)
    }

    /// Wait up to `limit` for the process to go away.
    pub async fn wait_for_exit(&mut self, limit: Duration) -> bool {
        if let Some(child) = self.child.as_mut() {
            return match timeout(limit, child.wait()).await {
                Ok(Ok(status)) => {
                    info!("[filebrowser] pid {} exited with {status}", self.pid);
                    true
                }
                Ok(Err(e)) => {
                    warn!("[filebrowser] waiting on pid {} failed: {e}", self.pid);
                    !pid_is_alive(self.pid)
                }
                Err(_) => false,
            };
        }

        let deadline = Instant::now() + limit;
        loop {
            if !pid_is_alive(self.pid) {
                info!("[filebrowser] pid {} is gone", self.pid);
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(LIVENESS_POLL_INTERVAL).await;
        }
    }

    /// Send SIGTERM, wait `stop_timeout`, then SIGKILL stragglers.
    ///
    /// Fails only when the initial SIGTERM cannot be delivered, e.g. the pid
    /// no longer exists.
    pub async fn terminate(&mut self, stop_timeout: Duration) -> Result<Termination, Errno> {
        info!("[filebrowser] sending SIGTERM to pid {}", self.pid);
        if let Err(e) = self.send_signal(Signal::SIGTERM) {
            warn!("[filebrowser] failed to send SIGTERM to pid {}: {e}", self.pid);
            // Reap a child that died on its own so it does not linger as a zombie.
            let _ = self.try_exit();
            return Err(e);
        }

        if self.wait_for_exit(stop_timeout).await {
            return Ok(Termination::Exited);
        }

        warn!(
            "[filebrowser] stop timeout ({}ms) reached for pid {}, sending SIGKILL",
            stop_timeout.as_millis(),
            self.pid
        );
        if let Err(e) = self.send_signal(Signal::SIGKILL) {
            // Exited between the timeout and the kill.
            if e == Errno::ESRCH {
                return Ok(Termination::Exited);
            }
            warn!("[filebrowser] failed to send SIGKILL to pid {}: {e}", self.pid);
        }
        if self.wait_for_exit(SIGKILL_TIMEOUT).await {
            Ok(Termination::Killed)
        } else {
            warn!("[filebrowser] pid {} still running after SIGKILL, giving up", self.pid);
            Ok(Termination::Unresponsive)
        }
    }
}

fn to_nix_pid(pid: u32) -> Result<Pid, Errno> {
    // 0 and negative values address process groups, never a single server.
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(Errno::EINVAL),
    }
}

/// Check whether `pid` refers to a live process. Zombies count as dead.
pub fn pid_is_alive(pid: u32) -> bool {
    let Ok(nix_pid) = to_nix_pid(pid) else {
        return false;
    };
    match signal::kill(nix_pid, None) {
        // EPERM: exists but belongs to someone else.
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The command name may contain spaces or parens; the state follows the last ')'.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .is_some_and(|state| state == "Z")
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Supervision of the single File Browser server process.
//!
//! The pid record on disk is the durable statement "a server is supervised".
//! Every control operation runs under one lock that also owns the settings and
//! the handle of the child spawned by this instance, so two concurrent
//! `start` calls can never both observe "no record" and spawn two servers.

use crate::config::SupervisorConfig;
use crate::credentials::validate_credentials;
use crate::error::{Error, Result};
use crate::pidfile::PidRecord;
use crate::port::{is_port_free, parse_port};
use crate::process::{ServerProcess, Termination};
use crate::server::{ServerBinary, read_output_prefix};
use crate::settings::{
    DEFAULT_USERNAME, JsonFileStore, LaunchConfig, SettingKey, Settings, SettingsStore,
};
use crate::state::ControlResult;
use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::process::ExitStatus;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Slot {
    settings: Settings,
    /// The server spawned by this instance, if any.
    current: Option<ServerProcess>,
}

pub struct Supervisor {
    config: SupervisorConfig,
    record: PidRecord,
    binary: ServerBinary,
    slot: Mutex<Slot>,
}

/// Outcome of the post-spawn observation window.
#[derive(Debug)]
enum Startup {
    /// Accepting connections on its port.
    Ready,
    /// Alive but not yet accepting connections when the readiness window closed.
    Running,
    Exited(ExitStatus),
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, store: Box<dyn SettingsStore>) -> Self {
        let settings = Settings::new(store, &config);
        Self {
            record: PidRecord::new(&config.pidfile),
            binary: ServerBinary::new(&config.server_binary),
            slot: Mutex::new(Slot {
                settings,
                current: None,
            }),
            config,
        }
    }

    /// Supervisor backed by `settings.json` in the settings directory.
    pub fn open(config: SupervisorConfig) -> Result<Self> {
        let store = JsonFileStore::open(config.settings_file())?;
        Ok(Self::new(config, Box::new(store)))
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn pid_record(&self) -> &PidRecord {
        &self.record
    }

    /// Report the apparent state from the pid record.
    ///
    /// This trusts the record and does not check that the pid is alive:
    /// records are only written for servers that survived startup and are
    /// cleared on every stop and on load.
    pub async fn status(&self) -> ControlResult {
        let slot = self.slot.lock().await;
        let port = slot.settings.port();

        if !self.record.exists() {
            info!("[filebrowser] the server is not online");
            return ControlResult::offline(Some(port));
        }

        match self.record.read() {
            Ok(pid) => {
                let address = host_ipv4().await;
                info!(
                    "[filebrowser] the server is online (pid={pid}, address={}, port={port})",
                    address.as_deref().unwrap_or("unknown")
                );
                ControlResult::online(pid, port).with_address(address)
            }
            Err(e) => {
                error!("[filebrowser] {e}");
                let mut result = ControlResult::error(e.to_string());
                result.port = Some(port);
                result
            }
        }
    }

    /// Ensure exactly one server: stop whatever is recorded, then launch a new
    /// one on `requested_port`.
    ///
    /// A missing or malformed port resets the setting to the default instead
    /// of failing.
    pub async fn start(&self, requested_port: Option<Value>) -> ControlResult {
        let mut slot = self.slot.lock().await;

        if self.record.exists() {
            info!("[filebrowser] the server has already been started, stopping it first");
            let stopped = self.stop_locked(&mut slot).await;
            debug!("[filebrowser] previous server: {}", stopped.status);
        }
        if let Some(mut orphan) = slot.current.take() {
            warn!(
                "[filebrowser] pid {} was running without a pid record, stopping it",
                orphan.pid()
            );
            if let Err(e) = orphan.terminate(self.config.stop_timeout).await {
                warn!("[filebrowser] could not stop pid {}: {e}", orphan.pid());
            }
        }

        match self.launch(&mut slot, requested_port).await {
            Ok(result) => result,
            Err(e) => {
                error!("[filebrowser] the server could not be started: {e}");
                ControlResult::error(e.to_string())
            }
        }
    }

    async fn launch(&self, slot: &mut Slot, requested_port: Option<Value>) -> Result<ControlResult> {
        let port = match requested_port.as_ref().and_then(parse_port) {
            Some(port) => port,
            None => {
                info!(
                    "[filebrowser] port {:?} is not a valid port number, resetting it",
                    requested_port
                );
                slot.settings.reset_port()?
            }
        };

        if !is_port_free(port).await {
            warn!("[filebrowser] port {port} is already in use, not starting");
            let mut result = ControlResult::error(format!("port {port} is already in use"));
            result.port = Some(port);
            return Ok(result);
        }

        slot.settings.ensure_defaults()?;
        let mut launch = slot.settings.launch_config();
        launch.port = port;

        let mut process = self.binary.spawn_server(&launch, &self.config.server_log)?;
        let pid = process.pid();

        match self.await_startup(&mut process, port).await {
            Startup::Exited(status) => {
                let output = read_output_prefix(&self.config.server_log);
                error!("[filebrowser] the server exited during startup ({status}): {output}");
                let mut result = ControlResult::error(output);
                result.port = Some(port);
                return Ok(result);
            }
            Startup::Ready => info!("[filebrowser] pid {pid} is accepting connections on {port}"),
            Startup::Running => warn!(
                "[filebrowser] pid {pid} is running but not yet accepting connections on {port}"
            ),
        }

        if let Err(e) = self.record.write(pid) {
            error!("[filebrowser] could not record pid {pid}, stopping it: {e}");
            if let Err(errno) = process.terminate(self.config.stop_timeout).await {
                warn!("[filebrowser] could not stop pid {pid}: {errno}");
            }
            return Err(e);
        }
        slot.current = Some(process);
        slot.settings.put(SettingKey::Port, Value::from(port))?;

        info!("[filebrowser] the server is running (pid={pid}, port={port})");
        Ok(ControlResult::online(pid, port))
    }

    /// Wait out the grace period, then poll the port until the server
    /// listens, exits, or the readiness timeout elapses. A slow server is left
    /// running.
    async fn await_startup(&self, process: &mut ServerProcess, port: u16) -> Startup {
        let grace_deadline = Instant::now() + self.config.grace_period;
        loop {
            if let Some(status) = process.try_exit() {
                return Startup::Exited(status);
            }
            if Instant::now() >= grace_deadline {
                break;
            }
            sleep(STARTUP_POLL_INTERVAL).await;
        }

        let ready_deadline = Instant::now() + self.config.readiness_timeout;
        loop {
            if !is_port_free(port).await {
                return Startup::Ready;
            }
            if let Some(status) = process.try_exit() {
                return Startup::Exited(status);
            }
            if Instant::now() >= ready_deadline {
                return Startup::Running;
            }
            sleep(STARTUP_POLL_INTERVAL).await;
        }
    }

    /// Stop the recorded server. Safe to call when nothing runs.
    pub async fn stop(&self) -> ControlResult {
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot).await
    }

    async fn stop_locked(&self, slot: &mut Slot) -> ControlResult {
        if !self.record.exists() {
            info!("[filebrowser] no server is currently running (no pidfile found)");
            return ControlResult::offline(Some(slot.settings.port()));
        }

        let pid = match self.record.read() {
            Ok(pid) => pid,
            Err(e) => {
                error!("[filebrowser] {e}, clearing it");
                self.clear_record();
                return ControlResult::error(e.to_string());
            }
        };

        let mut process = match slot.current.take() {
            Some(current) if current.pid() == pid => current,
            Some(mut other) => {
                warn!(
                    "[filebrowser] pidfile names pid {pid} but this instance spawned pid {}, stopping both",
                    other.pid()
                );
                if let Err(e) = other.terminate(self.config.stop_timeout).await {
                    warn!("[filebrowser] could not stop pid {}: {e}", other.pid());
                }
                ServerProcess::adopt(pid)
            }
            None => ServerProcess::adopt(pid),
        };

        info!("[filebrowser] the process ID is {pid}, attempting to stop it");
        let outcome = process.terminate(self.config.stop_timeout).await;

        // The record states intent to supervise. Once the attempt is over it
        // goes, whatever the OS said.
        self.clear_record();

        let port = Some(slot.settings.port());
        match outcome {
            Ok(Termination::Exited) => {
                info!("[filebrowser] process {pid} stopped");
                ControlResult::offline(port).with_output(format!("process {pid} stopped"))
            }
            Ok(Termination::Killed) => {
                warn!("[filebrowser] process {pid} had to be killed");
                ControlResult::offline(port).with_output(format!(
                    "process {pid} did not stop within {}ms and was killed",
                    self.config.stop_timeout.as_millis()
                ))
            }
            Ok(Termination::Unresponsive) => {
                ControlResult::error(format!("process {pid} is still running after SIGKILL"))
            }
            Err(errno) => {
                error!("[filebrowser] failed to stop process {pid}: {errno}");
                ControlResult::error(format!("failed to stop process {pid}: {errno}"))
            }
        }
    }

    fn clear_record(&self) {
        if let Err(e) = self.record.remove() {
            error!("[filebrowser] {e}");
        }
    }

    /// Bring on-disk state in line with a freshly loaded plugin.
    ///
    /// A pid record that survived a restart of the host cannot belong to a
    /// server this instance is responsible for, so it is dropped. Missing
    /// settings get their defaults, and a missing database is created by a
    /// short run of the server.
    pub async fn reconcile(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;

        if let Some(mut current) = slot.current.take() {
            info!(
                "[filebrowser] reconciling while pid {} is supervised, stopping it",
                current.pid()
            );
            if let Err(e) = current.terminate(self.config.stop_timeout).await {
                warn!("[filebrowser] could not stop pid {}: {e}", current.pid());
            }
        }
        if self.record.remove()? {
            info!("[filebrowser] removed pidfile left over from a previous run");
        }

        slot.settings.ensure_defaults()?;

        let database = slot.settings.database_path();
        if !database.exists() {
            info!(
                "[filebrowser] no database at {}, initializing it",
                database.display()
            );
            self.initialize_database(slot.settings.launch_config()).await?;
            slot.settings.set_current_username(DEFAULT_USERNAME)?;
            info!("[filebrowser] database initialized for user {DEFAULT_USERNAME}");
        }
        Ok(())
    }

    /// Run the server just long enough for it to create its database.
    async fn initialize_database(&self, launch: LaunchConfig) -> Result<()> {
        let database = launch.database_path.clone();
        let mut process = self.binary.spawn_server(&launch, &self.config.server_log)?;

        let deadline = Instant::now() + self.config.init_timeout;
        let mut exited = false;
        while !database.exists() && Instant::now() < deadline {
            if process.try_exit().is_some() {
                exited = true;
                break;
            }
            sleep(STARTUP_POLL_INTERVAL).await;
        }
        // Let the server finish writing before it is signalled.
        if database.exists() && !exited {
            sleep(self.config.grace_period).await;
        }

        if !exited
            && let Err(e) = process.terminate(self.config.stop_timeout).await
        {
            debug!("[filebrowser] init run pid {} already gone: {e}", process.pid());
        }

        if database.exists() {
            Ok(())
        } else {
            Err(Error::Command {
                command: format!("{} (database init)", self.binary.path().display()),
                output: read_output_prefix(&self.config.server_log),
            })
        }
    }

    /// Stored value for `key`, or its default.
    pub async fn get_setting(&self, key: &str) -> Result<Value> {
        let key: SettingKey = key.parse()?;
        let slot = self.slot.lock().await;
        Ok(slot.settings.get_or_default(key))
    }

    /// Validate and persist a setting; returns the stored value.
    pub async fn set_setting(&self, key: &str, value: Value) -> Result<Value> {
        let key: SettingKey = key.parse()?;
        if key == SettingKey::CurrentUsername {
            return Err(Error::Settings(
                "the username can only be changed together with the password".to_string(),
            ));
        }
        let mut slot = self.slot.lock().await;
        slot.settings.set(key, value)
    }

    pub async fn reset_settings(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        slot.settings.reset()
    }

    /// Every setting with defaults filled in.
    pub async fn user_settings(&self) -> Map<String, Value> {
        let slot = self.slot.lock().await;
        slot.settings.to_map()
    }

    /// Rename the File Browser account and set its password.
    pub async fn change_credentials(&self, username: &str, password: &str) -> Result<()> {
        let (username, password) = validate_credentials(username, password)?;
        let mut slot = self.slot.lock().await;
        let current = slot.settings.current_username();
        let database = slot.settings.database_path();

        info!("[filebrowser] changing credentials of user {current} to {username}");
        let output = self
            .binary
            .update_user(&database, &current, &username, &password)
            .await?;

        if !output.success() || output.stdout.trim().is_empty() {
            let detail = match output.stderr.trim() {
                "" => format!("no output from users update ({})", output.status),
                stderr => stderr.to_string(),
            };
            error!("[filebrowser] could not update credentials: {detail}");
            return Err(Error::CredentialUpdate(detail));
        }

        slot.settings.set_current_username(&username)?;
        info!("[filebrowser] credentials changed, current user is {username}");
        Ok(())
    }

    /// Hash `text` with the server's password hasher.
    pub async fn hash(&self, text: &str) -> Result<String> {
        let _slot = self.slot.lock().await;
        let output = self.binary.hash(text).await?;
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            return Err(Error::Hash(stderr.to_string()));
        }
        if !output.success() {
            return Err(Error::Hash(format!("hash exited with {}", output.status)));
        }
        Ok(output.stdout.trim().to_string())
    }
}

/// First IPv4 address the host name resolves to.
async fn host_ipv4() -> Option<String> {
    let hostname = nix::unistd::gethostname().ok()?.into_string().ok()?;
    match tokio::net::lookup_host((hostname.as_str(), 0)).await {
        Ok(addrs) => addrs
            .map(|addr| addr.ip())
            .find(IpAddr::is_ipv4)
            .map(|ip| ip.to_string()),
        Err(e) => {
            debug!("[filebrowser] could not resolve host name {hostname}: {e}");
            None
        }
    }
}

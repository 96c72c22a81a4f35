// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PIDFILE_NAME: &str = "decky-filebrowser.pid";
pub const SERVER_LOG_NAME: &str = "filebrowser.log";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DATABASE_FILE_NAME: &str = "filebrowser.db";

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(200);
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Filesystem layout and timings for one supervisor instance.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Plugin install directory; holds `bin/filebrowser` and `bin/certs/`.
    pub plugin_dir: PathBuf,
    /// Durable directory for `settings.json` and the server database.
    pub settings_dir: PathBuf,
    /// Scratch directory for the pidfile and the server's output log.
    pub runtime_dir: PathBuf,
    /// Directory served by default.
    pub home_dir: PathBuf,
    pub server_binary: PathBuf,
    pub pidfile: PathBuf,
    pub server_log: PathBuf,
    /// Minimum post-spawn wait before the child is considered up.
    pub grace_period: Duration,
    /// How long to poll the listen port after the grace period.
    pub readiness_timeout: Duration,
    /// SIGTERM to SIGKILL escalation delay.
    pub stop_timeout: Duration,
    /// Upper bound on the first-run database initialization.
    pub init_timeout: Duration,
}

impl SupervisorConfig {
    /// Derive the whole layout from the three plugin directories and the user home.
    pub fn new(
        plugin_dir: impl Into<PathBuf>,
        settings_dir: impl Into<PathBuf>,
        runtime_dir: impl Into<PathBuf>,
        home_dir: impl Into<PathBuf>,
    ) -> Self {
        let plugin_dir = plugin_dir.into();
        let runtime_dir = runtime_dir.into();
        Self {
            server_binary: plugin_dir.join("bin").join("filebrowser"),
            pidfile: runtime_dir.join(PIDFILE_NAME),
            server_log: runtime_dir.join(SERVER_LOG_NAME),
            plugin_dir,
            settings_dir: settings_dir.into(),
            runtime_dir,
            home_dir: home_dir.into(),
            grace_period: DEFAULT_GRACE_PERIOD,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }

    /// Build the layout from the host plugin environment.
    ///
    /// `DECKY_PLUGIN_DIR`, `DECKY_PLUGIN_SETTINGS_DIR`, `DECKY_PLUGIN_RUNTIME_DIR`
    /// and `DECKY_USER_HOME` are set by the plugin loader. Outside the loader
    /// the plugin dir falls back to the working directory, and settings and
    /// runtime dirs to subdirectories of it. `FB_SERVER_BIN` overrides the
    /// server binary location.
    pub fn from_env() -> Self {
        let plugin_dir = env_path("DECKY_PLUGIN_DIR")
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let settings_dir =
            env_path("DECKY_PLUGIN_SETTINGS_DIR").unwrap_or_else(|| plugin_dir.join("settings"));
        let runtime_dir =
            env_path("DECKY_PLUGIN_RUNTIME_DIR").unwrap_or_else(|| plugin_dir.join("runtime"));
        let home_dir = env_path("DECKY_USER_HOME")
            .or_else(|| env_path("HOME"))
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut config = Self::new(plugin_dir, settings_dir, runtime_dir, home_dir);
        if let Some(bin) = env_path("FB_SERVER_BIN") {
            config.server_binary = bin;
        }
        config
    }

    pub fn settings_file(&self) -> PathBuf {
        self.settings_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn default_database_path(&self) -> PathBuf {
        self.settings_dir.join(DATABASE_FILE_NAME)
    }

    pub fn default_cert_path(&self) -> PathBuf {
        self.certs_dir().join("cert.pem")
    }

    pub fn default_key_path(&self) -> PathBuf {
        self.certs_dir().join("key.pem")
    }

    fn certs_dir(&self) -> PathBuf {
        self.plugin_dir.join("bin").join("certs")
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

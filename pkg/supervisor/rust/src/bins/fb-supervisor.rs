// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fb_supervisor::{Supervisor, SupervisorConfig, bridge, lifecycle};
use log::{LevelFilter, error, info};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;
use tokio::signal::unix::{SignalKind, signal};

/// Supervise the File Browser server of the Decky plugin.
#[derive(Parser, Debug)]
#[command(name = "fb-supervisor", version)]
struct Args {
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, env = "FB_LOG_LEVEL", default_value = "info")]
    log_level: LevelFilter,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "FB_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Plugin install directory [default: $DECKY_PLUGIN_DIR]
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Settings directory [default: $DECKY_PLUGIN_SETTINGS_DIR]
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// Runtime directory [default: $DECKY_PLUGIN_RUNTIME_DIR]
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Default served directory [default: $DECKY_USER_HOME]
    #[arg(long)]
    home_dir: Option<PathBuf>,

    /// File Browser binary [default: <plugin dir>/bin/filebrowser]
    #[arg(long)]
    server_bin: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether the server is running
    Status,
    /// Start the server, replacing any running instance
    Start {
        /// Port to listen on [default: the configured port]
        #[arg(long)]
        port: Option<String>,
    },
    /// Stop the server
    Stop,
    /// Clear stale state and initialize the database if needed
    Reconcile,
    /// Print a setting
    Get { key: String },
    /// Change a setting; the value is parsed as JSON, falling back to a string
    Set { key: String, value: String },
    /// Reset settings to their defaults
    Reset,
    /// Change the File Browser username and password
    Credentials { username: String, password: String },
    /// Hash a password with the server's hasher
    Hash { text: String },
    /// Serve newline-delimited JSON requests on stdin until EOF or a signal
    Bridge,
}

impl Args {
    fn config(&self) -> SupervisorConfig {
        let env = SupervisorConfig::from_env();
        let plugin_dir = self.plugin_dir.clone().unwrap_or(env.plugin_dir.clone());
        let mut config = SupervisorConfig::new(
            &plugin_dir,
            self.settings_dir.clone().unwrap_or(env.settings_dir),
            self.runtime_dir.clone().unwrap_or(env.runtime_dir),
            self.home_dir.clone().unwrap_or(env.home_dir),
        );
        config.server_binary = match &self.server_bin {
            Some(bin) => bin.clone(),
            None if self.plugin_dir.is_some() => config.server_binary,
            None => env.server_binary,
        };
        config
    }
}

fn print(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_control(result: &fb_supervisor::ControlResult) -> Result<ExitCode> {
    print(result)?;
    Ok(if result.status == fb_supervisor::ServerStatus::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    fb_log::init(args.log_level, args.log_file.as_deref()).context("initializing logging")?;

    let config = args.config();
    let supervisor = Supervisor::open(config).context("opening settings")?;

    match args.command {
        Command::Status => print_control(&supervisor.status().await),
        Command::Start { port } => {
            let port = match port {
                Some(raw) => Value::String(raw),
                None => supervisor.get_setting("port").await?,
            };
            print_control(&supervisor.start(Some(port)).await)
        }
        Command::Stop => print_control(&supervisor.stop().await),
        Command::Reconcile => {
            supervisor.reconcile().await.context("reconciling")?;
            print(&json!({"ok": true}))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Get { key } => {
            print(&json!({"value": supervisor.get_setting(&key).await?}))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            print(&json!({"value": supervisor.set_setting(&key, value).await?}))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset => {
            supervisor.reset_settings().await?;
            print(&supervisor.user_settings().await)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Credentials { username, password } => {
            supervisor
                .change_credentials(&username, &password)
                .await
                .context("changing credentials")?;
            print(&json!({"ok": true}))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Hash { text } => {
            print(&json!({"value": supervisor.hash(&text).await?}))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Bridge => {
            let code = run_bridge(&supervisor).await?;
            // The blocking stdin reader would otherwise hold the runtime open.
            std::process::exit(code);
        }
    }
}

async fn run_bridge(supervisor: &Supervisor) -> Result<i32> {
    info!(
        "fb-supervisor bridge starting (version {})",
        env!("CARGO_PKG_VERSION")
    );
    lifecycle::on_load(supervisor).await;

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let served = tokio::select! {
        res = bridge::serve(supervisor, stdin, stdout) => {
            info!("stdin closed");
            res
        }
        _ = sigterm.recv() => { info!("received SIGTERM"); Ok(()) }
        _ = sigint.recv() => { info!("received SIGINT"); Ok(()) }
    };

    let stopped = lifecycle::on_unload(supervisor).await;
    info!("fb-supervisor bridge shutting down ({})", stopped.status);

    Ok(match served {
        Ok(()) => 0,
        Err(e) => {
            error!("serving bridge requests: {e}");
            1
        }
    })
}

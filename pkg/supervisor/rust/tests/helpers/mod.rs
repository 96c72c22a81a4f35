// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use fb_supervisor::SupervisorConfig;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{Receiver, channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fake File Browser: `serve` creates the `-d` database and sleeps, `hash`
/// and `users update` print canned output.
pub const FAKE_SERVER: &str = r#"#!/bin/sh
case "$1" in
  hash)
    shift
    [ "$1" = "--" ] && shift
    [ -n "$1" ] || { echo "hash: empty input" >&2; exit 1; }
    echo "\$2a\$10\$fake.$1"
    exit 0 ;;
  users)
    [ "$3" = "admin" ] || { echo "user $3 not found" >&2; exit 1; }
    echo "ID  Username"
    echo "1   $5"
    exit 0 ;;
esac
db=""
while [ $# -gt 0 ]; do
  [ "$1" = "-d" ] && db="$2"
  shift
done
[ -n "$db" ] && : > "$db"
exec sleep 300
"#;

/// A temporary plugin install with the fake server in `bin/`.
pub struct Layout {
    pub dir: tempfile::TempDir,
    pub plugin_dir: PathBuf,
    pub settings_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub home_dir: PathBuf,
}

impl Layout {
    pub fn new() -> Self {
        Self::with_server(FAKE_SERVER)
    }

    pub fn with_server(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("plugin");
        let settings_dir = dir.path().join("settings");
        let runtime_dir = dir.path().join("runtime");
        let home_dir = dir.path().join("home");
        std::fs::create_dir_all(plugin_dir.join("bin")).unwrap();
        std::fs::create_dir_all(&settings_dir).unwrap();

        let bin = plugin_dir.join("bin").join("filebrowser");
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            dir,
            plugin_dir,
            settings_dir,
            runtime_dir,
            home_dir,
        }
    }

    /// Library config with test-sized timings.
    pub fn config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(
            &self.plugin_dir,
            &self.settings_dir,
            &self.runtime_dir,
            &self.home_dir,
        );
        config.grace_period = Duration::from_millis(100);
        config.readiness_timeout = Duration::from_millis(100);
        config.stop_timeout = Duration::from_secs(2);
        config.init_timeout = Duration::from_secs(3);
        config
    }

    pub fn pidfile(&self) -> PathBuf {
        self.config().pidfile
    }

    pub fn database(&self) -> PathBuf {
        self.config().default_database_path()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_fb-supervisor"));
        cmd.arg("--plugin-dir")
            .arg(&self.plugin_dir)
            .arg("--settings-dir")
            .arg(&self.settings_dir)
            .arg("--runtime-dir")
            .arg(&self.runtime_dir)
            .arg("--home-dir")
            .arg(&self.home_dir)
            .env("FB_LOG_LEVEL", "debug")
            .env_remove("FB_LOG_FILE")
            .env_remove("FB_SERVER_BIN");
        cmd
    }

    /// Run one CLI subcommand to completion; returns its exit status and the
    /// JSON it printed (Null when it printed nothing).
    pub fn cli(&self, args: &[&str]) -> (ExitStatus, Value) {
        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .expect("failed to run fb-supervisor");
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            eprintln!("[cli:err] {line}");
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = match stdout.trim() {
            "" => Value::Null,
            text => serde_json::from_str(text)
                .unwrap_or_else(|e| panic!("cli printed invalid JSON {text:?}: {e}")),
        };
        (output.status, value)
    }

    pub fn bridge(&self) -> BridgeHandle {
        BridgeHandle::start(self.command())
    }
}

/// Handle to a running `fb-supervisor bridge` process.
pub struct BridgeHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    replies: Receiver<Value>,
    log_lines: Arc<Mutex<Vec<String>>>,
    _stdout_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

impl BridgeHandle {
    fn start(mut cmd: Command) -> Self {
        let mut child = cmd
            .arg("bridge")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start fb-supervisor bridge");

        let stdin = child.stdin.take().expect("failed to capture stdin");
        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let lines_clone = Arc::clone(&log_lines);
        let (tx, replies) = channel();

        // Replies go to stdout, fb-log writes to stderr.
        let stdout_thread = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        eprintln!("[bridge] {l}");
                        let value = serde_json::from_str(&l)
                            .unwrap_or_else(|e| panic!("invalid reply {l:?}: {e}"));
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let stderr_thread = std::thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        eprintln!("[bridge:err] {l}");
                        lines_clone.lock().unwrap().push(l);
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            child,
            stdin: Some(stdin),
            replies,
            log_lines,
            _stdout_thread: stdout_thread,
            _stderr_thread: stderr_thread,
        }
    }

    /// Send one request line and wait for its reply.
    pub fn request(&mut self, line: &str) -> Value {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        writeln!(stdin, "{line}").expect("failed to write request");
        stdin.flush().expect("failed to flush request");
        self.replies
            .recv_timeout(DEFAULT_TIMEOUT)
            .unwrap_or_else(|_| panic!("no reply to {line}"))
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let lines = self.log_lines.lock().unwrap();
                if lines.iter().any(|l| l.contains(pattern)) {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = self.child.id() as i32;
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to bridge");
    }

    /// Send SIGTERM and wait for the bridge to exit.
    pub fn stop(&mut self) -> ExitStatus {
        self.send_signal(Signal::SIGTERM);
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Close stdin and wait for the bridge to exit.
    pub fn close(&mut self) -> ExitStatus {
        drop(self.stdin.take());
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn wait_with_timeout(&mut self, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait().expect("failed to check bridge status") {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed bridge");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn pid_is_alive(pid: u32) -> bool {
    fb_supervisor::process::pid_is_alive(pid)
}

/// Wait until a PID is no longer alive, or timeout.
pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Invocations of the File Browser binary.
//!
//! Every invocation is an argument list handed straight to `execve`; no shell
//! ever sees user-supplied usernames, passwords or paths.

use crate::error::{Error, Result};
use crate::process::ServerProcess;
use crate::settings::LaunchConfig;
use log::{debug, info};
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Bound on the diagnostic output returned for a server that died on start.
pub const EARLY_OUTPUT_LIMIT: u64 = 4096;
const UTILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of a short-lived subcommand.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, Clone)]
pub struct ServerBinary {
    path: PathBuf,
}

impl ServerBinary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flags for the long-running server.
    pub fn serve_args(launch: &LaunchConfig) -> Vec<OsString> {
        vec![
            "-p".into(),
            launch.port.to_string().into(),
            "-a".into(),
            launch.address.clone().into(),
            "-d".into(),
            launch.database_path.clone().into(),
            "-t".into(),
            launch.cert_path.clone().into(),
            "-k".into(),
            launch.key_path.clone().into(),
            "-r".into(),
            launch.root_path.clone().into(),
        ]
    }

    /// Start the server detached from our stdio; its stdout and stderr go to
    /// `log_path`, truncated on every start.
    pub fn spawn_server(&self, launch: &LaunchConfig, log_path: &Path) -> Result<ServerProcess> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        let log = File::create(log_path)
            .map_err(|e| Error::io(format!("creating {}", log_path.display()), e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| Error::io(format!("duplicating {}", log_path.display()), e))?;

        let args = Self::serve_args(launch);
        info!("[filebrowser] running {} {:?}", self.path.display(), args);

        let child = Command::new(&self.path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| Error::Spawn {
                binary: self.path.clone(),
                source,
            })?;

        let process = ServerProcess::from_child(child).ok_or_else(|| Error::Command {
            command: self.path.display().to_string(),
            output: "exited before its pid could be read".to_string(),
        })?;
        info!("[filebrowser] spawned (pid={})", process.pid());
        Ok(process)
    }

    /// Run a subcommand to completion, capturing both output streams.
    pub async fn run(&self, args: &[OsString]) -> Result<CommandOutput> {
        debug!("[filebrowser] running {} {:?}", self.path.display(), args);
        let child = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                binary: self.path.clone(),
                source,
            })?;

        let output = timeout(UTILITY_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::Command {
                command: describe(&self.path, args),
                output: format!("timed out after {}s", UTILITY_TIMEOUT.as_secs()),
            })?
            .map_err(|e| Error::io(format!("waiting on {}", self.path.display()), e))?;

        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// `filebrowser hash -- <text>`. The separator keeps text such as
    /// `--help` from being read as a flag.
    pub async fn hash(&self, text: &str) -> Result<CommandOutput> {
        self.run(&["hash".into(), "--".into(), text.into()]).await
    }

    /// `filebrowser users update <current> --username <new> --password <pw> -d <db>`
    pub async fn update_user(
        &self,
        database: &Path,
        current_username: &str,
        username: &str,
        password: &str,
    ) -> Result<CommandOutput> {
        let args: Vec<OsString> = vec![
            "users".into(),
            "update".into(),
            current_username.into(),
            "--username".into(),
            username.into(),
            "--password".into(),
            password.into(),
            "-d".into(),
            database.into(),
        ];
        self.run(&args).await
    }
}

/// Command line for error messages, with the password masked.
fn describe(program: &Path, args: &[OsString]) -> String {
    let mut parts = vec![program.display().to_string()];
    let mut mask_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "--password";
        parts.push(arg.into_owned());
    }
    parts.join(" ")
}

/// First `EARLY_OUTPUT_LIMIT` bytes of the server log.
pub fn read_output_prefix(path: &Path) -> String {
    let mut buf = Vec::new();
    match File::open(path) {
        Ok(file) => {
            if let Err(e) = file.take(EARLY_OUTPUT_LIMIT).read_to_end(&mut buf) {
                return format!("could not read {}: {e}", path.display());
            }
        }
        Err(e) => return format!("could not read {}: {e}", path.display()),
    }
    String::from_utf8_lossy(&buf).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_script;

    fn launch() -> LaunchConfig {
        LaunchConfig {
            port: 8082,
            address: "0.0.0.0".into(),
            database_path: "/settings/filebrowser.db".into(),
            cert_path: "/plugin/bin/certs/cert.pem".into(),
            key_path: "/plugin/bin/certs/key.pem".into(),
            root_path: "/home/deck".into(),
        }
    }

    #[test]
    fn test_serve_args() {
        let args = ServerBinary::serve_args(&launch());
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            vec![
                "-p",
                "8082",
                "-a",
                "0.0.0.0",
                "-d",
                "/settings/filebrowser.db",
                "-t",
                "/plugin/bin/certs/cert.pem",
                "-k",
                "/plugin/bin/certs/key.pem",
                "-r",
                "/home/deck",
            ]
        );
    }

    #[test]
    fn test_describe_masks_password() {
        let args: Vec<OsString> = vec![
            "users".into(),
            "update".into(),
            "admin".into(),
            "--password".into(),
            "hunter22".into(),
        ];
        let text = describe(Path::new("/bin/fb"), &args);
        assert_eq!(text, "/bin/fb users update admin --password ***");
    }

    #[tokio::test]
    async fn test_run_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "echo \"out $1\"; echo \"err $2\" >&2; exit 4");

        let output = ServerBinary::new(bin)
            .run(&["a".into(), "b c".into()])
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(4));
        assert_eq!(output.stdout, "out a\n");
        assert_eq!(output.stderr, "err b c\n");
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_interpreted() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "printf '%s|' \"$@\"");

        let output = ServerBinary::new(bin)
            .hash("x; touch /tmp/should-not-exist-$$")
            .await
            .unwrap();
        assert_eq!(output.stdout, "hash|--|x; touch /tmp/should-not-exist-$$|");
    }

    #[tokio::test]
    async fn test_hash_text_is_never_a_flag() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "printf '%s|' \"$@\"");

        let binary = ServerBinary::new(bin);
        for text in ["--help", "-d", "--database=/tmp/x.db"] {
            let output = binary.hash(text).await.unwrap();
            assert_eq!(output.stdout, format!("hash|--|{text}|"));
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let err = ServerBinary::new("/nonexistent/filebrowser")
            .run(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_spawn_server_redirects_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "echo \"listening on $2\" >&2; exit 1");
        let log = dir.path().join("run").join("filebrowser.log");

        let mut proc = ServerBinary::new(bin).spawn_server(&launch(), &log).unwrap();
        assert!(proc.wait_for_exit(Duration::from_secs(5)).await);
        assert_eq!(read_output_prefix(&log), "listening on 8082");
    }

    #[test]
    fn test_read_output_prefix_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("filebrowser.log");
        std::fs::write(&log, "x".repeat(10_000)).unwrap();
        assert_eq!(read_output_prefix(&log).len(), EARLY_OUTPUT_LIMIT as usize);
    }

    #[test]
    fn test_read_output_prefix_missing_file() {
        let text = read_output_prefix(Path::new("/nonexistent/filebrowser.log"));
        assert!(text.starts_with("could not read"));
    }
}

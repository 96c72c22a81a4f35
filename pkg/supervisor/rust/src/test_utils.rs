// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::SupervisorConfig;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Write an executable `/bin/sh` script named `filebrowser` into `dir`.
pub fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("filebrowser");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stand-in for the File Browser binary: `serve` creates the database named by
/// `-d` then sleeps; `hash` and `users update` print canned output.
pub const FAKE_SERVER: &str = r#"
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

/// Plugin layout under `root` with a fake server binary and short timings.
pub fn fake_layout(root: &Path, server_body: &str) -> SupervisorConfig {
    let plugin_dir = root.join("plugin");
    let bin_dir = plugin_dir.join("bin");
    std::fs::create_dir_all(&bin_dir).unwrap();
    let settings_dir = root.join("settings");
    std::fs::create_dir_all(&settings_dir).unwrap();

    let mut config = SupervisorConfig::new(
        &plugin_dir,
        settings_dir,
        root.join("runtime"),
        root.join("home"),
    );
    config.server_binary = write_script(&bin_dir, server_body);
    config.grace_period = Duration::from_millis(100);
    config.readiness_timeout = Duration::from_millis(100);
    config.stop_timeout = Duration::from_secs(2);
    config.init_timeout = Duration::from_secs(3);
    config
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

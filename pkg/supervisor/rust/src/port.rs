// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use log::debug;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const DEFAULT_PORT: u16 = 8082;
/// Taken by the plugin loader itself.
pub const RESERVED_PORT: u16 = 1337;
/// Binding below this needs root.
pub const MIN_USER_PORT: u16 = 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Lenient parse: a JSON number or a string of digits in `1..=65535`.
pub fn parse_port(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<u64>().ok()?
        }
        _ => return None,
    };
    u16::try_from(port).ok().filter(|&p| p != 0)
}

/// Strict check for ports chosen by the user.
pub fn validate_port(value: &Value) -> Result<u16> {
    let port = parse_port(value)
        .ok_or_else(|| Error::InvalidPort(format!("{value} is not a port number")))?;
    if port == RESERVED_PORT {
        return Err(Error::InvalidPort(format!(
            "{port} is already used by the plugin loader"
        )));
    }
    if port < MIN_USER_PORT {
        return Err(Error::InvalidPort(format!(
            "{port} is below {MIN_USER_PORT} and needs root"
        )));
    }
    Ok(port)
}

/// Returns false when something on the local host accepts connections on `port`.
pub async fn is_port_free(port: u16) -> bool {
    // Dropping the stream closes the test connection on every path.
    match timeout(CONNECT_TIMEOUT, TcpStream::connect(("localhost", port))).await {
        Ok(Ok(_stream)) => {
            debug!("port {port} accepted a connection");
            false
        }
        Ok(Err(e)) => {
            debug!("port {port} refused a connection: {e}");
            true
        }
        Err(_) => {
            debug!("port {port} connect timed out");
            true
        }
    }
}

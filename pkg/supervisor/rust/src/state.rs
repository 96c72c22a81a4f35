// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// No pid record.
    Offline,
    /// A pid record exists for a spawned server.
    Online,
    /// The last operation failed; see the accompanying output.
    Error,
}

impl ServerStatus {
    pub fn is_online(self) -> bool {
        self == ServerStatus::Online
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Offline => write!(f, "offline"),
            ServerStatus::Online => write!(f, "online"),
            ServerStatus::Error => write!(f, "error"),
        }
    }
}

/// Structured reply of the control operations (`status`, `start`, `stop`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResult {
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ControlResult {
    pub fn offline(port: Option<u16>) -> Self {
        Self {
            status: ServerStatus::Offline,
            pid: None,
            ipv4_address: None,
            port,
            output: None,
        }
    }

    pub fn online(pid: u32, port: u16) -> Self {
        Self {
            status: ServerStatus::Online,
            pid: Some(pid),
            ipv4_address: None,
            port: Some(port),
            output: None,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            status: ServerStatus::Error,
            pid: None,
            ipv4_address: None,
            port: None,
            output: Some(output.into()),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.ipv4_address = address;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ServerStatus::Online).unwrap(), json!("online"));
        assert_eq!(ServerStatus::Error.to_string(), "error");
        assert!(ServerStatus::Online.is_online());
        assert!(!ServerStatus::Offline.is_online());
    }

    #[test]
    fn test_offline_reply_omits_missing_fields() {
        let reply = serde_json::to_value(ControlResult::offline(Some(8082))).unwrap();
        assert_eq!(reply, json!({"status": "offline", "port": 8082}));
    }

    #[test]
    fn test_online_reply() {
        let reply = ControlResult::online(4242, 9000).with_address(Some("10.0.0.5".into()));
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({"status": "online", "pid": 4242, "ipv4_address": "10.0.0.5", "port": 9000})
        );
    }

    #[test]
    fn test_error_reply_carries_output() {
        let reply = ControlResult::error("port 8082 is already in use");
        assert_eq!(reply.status, ServerStatus::Error);
        assert_eq!(reply.output.as_deref(), Some("port 8082 is already in use"));
    }
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod bridge;
pub mod config;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod pidfile;
pub mod port;
pub mod process;
pub mod server;
pub mod settings;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod test_utils;

pub use config::SupervisorConfig;
pub use error::{Error, Result};
pub use state::{ControlResult, ServerStatus};
pub use supervisor::Supervisor;

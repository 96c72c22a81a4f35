// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("settings: {0}")]
    Settings(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("pid record {}: {reason}", path.display())]
    PidRecord { path: PathBuf, reason: String },
    #[error("failed to spawn {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed: {output}")]
    Command { command: String, output: String },
    #[error("could not update credentials: {0}")]
    CredentialUpdate(String),
    #[error("could not hash text: {0}")]
    Hash(String),
    #[error("invalid request: {0}")]
    Request(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

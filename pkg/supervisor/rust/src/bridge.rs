// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Newline-delimited JSON control surface.
//!
//! Each input line is `{"method": "...", "params": {...}}`; each reply is one
//! JSON object on its own line. Method names accept both the snake_case form
//! and the camelCase names used by the plugin frontend.

use crate::error::{Error, Result};
use crate::state::ServerStatus;
use crate::supervisor::Supervisor;
use log::{debug, error, info};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Deserialize)]
struct Envelope {
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Default, Deserialize)]
struct StartParams {
    #[serde(default)]
    port: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Debug, Deserialize)]
struct SetParams {
    key: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct CredentialParams {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct HashParams {
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    #[serde(alias = "msg", default = "no_content")]
    message: String,
}

fn no_content() -> String {
    "Javascript: no content".to_string()
}

#[derive(Debug, PartialEq)]
pub enum Request {
    Status,
    Start { port: Option<Value> },
    Stop,
    GetSetting { key: String },
    SetSetting { key: String, value: Value },
    ResetSettings,
    GetUserSettings,
    ChangeCredentials { username: String, password: String },
    Hash { text: String },
    LogInfo { message: String },
    LogError { message: String },
}

fn params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::Request(format!("bad params for {method}: {e}")))
}

/// Absent params stand for an empty object.
fn or_empty(params: Value) -> Value {
    if params.is_null() { json!({}) } else { params }
}

impl Request {
    pub fn parse(line: &str) -> Result<Self> {
        let Envelope { method, params: raw } = serde_json::from_str(line)?;
        let request = match method.as_str() {
            "status" | "get_status" | "getFileBrowserStatus" => Request::Status,
            "start" | "startFileBrowser" => {
                let p: StartParams = params(&method, or_empty(raw))?;
                Request::Start { port: p.port }
            }
            "stop" | "stopFileBrowser" => Request::Stop,
            "get_setting" | "getSetting" => {
                let p: KeyParams = params(&method, raw)?;
                Request::GetSetting { key: p.key }
            }
            "set_setting" | "save_user_settings" | "saveUserSettings" => {
                let p: SetParams = params(&method, raw)?;
                Request::SetSetting {
                    key: p.key,
                    value: p.value,
                }
            }
            "reset_settings" | "resetSettings" => Request::ResetSettings,
            "get_user_settings" | "getUserSettings" => Request::GetUserSettings,
            "change_credentials" | "save_username_password" | "saveUsernamePassword" => {
                let p: CredentialParams = params(&method, raw)?;
                Request::ChangeCredentials {
                    username: p.username,
                    password: p.password,
                }
            }
            "hash" => {
                let p: HashParams = params(&method, raw)?;
                Request::Hash { text: p.text }
            }
            "log_info" | "logInfo" => {
                let p: MessageParams = params(&method, or_empty(raw))?;
                Request::LogInfo { message: p.message }
            }
            "log_error" | "logError" => {
                let p: MessageParams = params(&method, or_empty(raw))?;
                Request::LogError { message: p.message }
            }
            other => return Err(Error::Request(format!("unknown method {other:?}"))),
        };
        Ok(request)
    }
}

fn error_reply(e: &Error) -> Value {
    json!({"status": ServerStatus::Error, "output": e.to_string()})
}

async fn dispatch(supervisor: &Supervisor, request: Request) -> Result<Value> {
    let reply = match request {
        Request::Status => serde_json::to_value(supervisor.status().await)?,
        Request::Start { port } => serde_json::to_value(supervisor.start(port).await)?,
        Request::Stop => serde_json::to_value(supervisor.stop().await)?,
        Request::GetSetting { key } => json!({"value": supervisor.get_setting(&key).await?}),
        Request::SetSetting { key, value } => {
            json!({"value": supervisor.set_setting(&key, value).await?})
        }
        Request::ResetSettings => {
            supervisor.reset_settings().await?;
            json!({"ok": true})
        }
        Request::GetUserSettings => Value::Object(supervisor.user_settings().await),
        Request::ChangeCredentials { username, password } => {
            supervisor.change_credentials(&username, &password).await?;
            json!({"ok": true})
        }
        Request::Hash { text } => json!({"value": supervisor.hash(&text).await?}),
        Request::LogInfo { message } => {
            info!("[filebrowser][frontend] {message}");
            json!({"ok": true})
        }
        Request::LogError { message } => {
            error!("[filebrowser][frontend] {message}");
            json!({"ok": true})
        }
    };
    Ok(reply)
}

/// Answer one request line. Never fails: errors become `status: error` replies.
pub async fn handle(supervisor: &Supervisor, line: &str) -> Value {
    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(e) => {
            error!("[filebrowser] rejected request: {e}");
            return error_reply(&e);
        }
    };
    debug!("[filebrowser] request {request:?}");
    match dispatch(supervisor, request).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("[filebrowser] request failed: {e}");
            error_reply(&e)
        }
    }
}

/// Serve requests from `input` until EOF, writing one reply line per request.
pub async fn serve<R, W>(supervisor: &Supervisor, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::io("reading request", e))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle(supervisor, &line).await;
        let mut bytes = serde_json::to_vec(&reply)?;
        bytes.push(b'\n');
        output
            .write_all(&bytes)
            .await
            .map_err(|e| Error::io("writing reply", e))?;
        output
            .flush()
            .await
            .map_err(|e| Error::io("writing reply", e))?;
    }
    Ok(())
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Persisted plugin settings.
//!
//! [`SettingsStore`] is the raw key-value persistence; [`Settings`] is the
//! typed view the supervisor reads its launch configuration from, filling in
//! defaults for absent keys.

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::port::{DEFAULT_PORT, parse_port, validate_port};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_USERNAME: &str = "admin";

/// Durable key-value persistence. Single writer.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// Settings kept in a JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store; a corrupt
    /// one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Map<String, Value>>(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!("ignoring unreadable settings file {}: {e}", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no settings file at {}, starting empty", path.display());
                Map::new()
            }
            Err(e) => return Err(Error::io(format!("reading {}", path.display()), e)),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::io(format!("writing {}", tmp.display()), e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::io(format!("replacing {}", self.path.display()), e))
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.persist()
    }
}

/// Volatile store, for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Port,
    Address,
    DatabasePath,
    CertPath,
    KeyPath,
    RootPath,
    CurrentUsername,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::Port,
        SettingKey::Address,
        SettingKey::DatabasePath,
        SettingKey::CertPath,
        SettingKey::KeyPath,
        SettingKey::RootPath,
        SettingKey::CurrentUsername,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Port => "port",
            SettingKey::Address => "address",
            SettingKey::DatabasePath => "database_path",
            SettingKey::CertPath => "cert_path",
            SettingKey::KeyPath => "key_path",
            SettingKey::RootPath => "root_path",
            SettingKey::CurrentUsername => "current_username",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    /// Accepts the canonical snake_case names plus the spellings the plugin UI
    /// uses (`currentUsername`, `database path`, ...).
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | ' ' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "port" => Ok(SettingKey::Port),
            "address" => Ok(SettingKey::Address),
            "databasepath" => Ok(SettingKey::DatabasePath),
            "certpath" => Ok(SettingKey::CertPath),
            "keypath" => Ok(SettingKey::KeyPath),
            "rootpath" => Ok(SettingKey::RootPath),
            "currentusername" => Ok(SettingKey::CurrentUsername),
            _ => Err(Error::Settings(format!("unknown setting key: {s}"))),
        }
    }
}

/// The settings consumed when launching the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchConfig {
    pub port: u16,
    pub address: String,
    pub database_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub root_path: PathBuf,
}

/// Typed accessor over a [`SettingsStore`].
pub struct Settings {
    store: Box<dyn SettingsStore>,
    defaults: HashMap<SettingKey, Value>,
}

impl Settings {
    pub fn new(store: Box<dyn SettingsStore>, config: &SupervisorConfig) -> Self {
        let path_value = |p: PathBuf| Value::String(p.to_string_lossy().into_owned());
        let defaults = HashMap::from([
            (SettingKey::Port, Value::from(DEFAULT_PORT)),
            (SettingKey::Address, Value::from(DEFAULT_ADDRESS)),
            (SettingKey::DatabasePath, path_value(config.default_database_path())),
            (SettingKey::CertPath, path_value(config.default_cert_path())),
            (SettingKey::KeyPath, path_value(config.default_key_path())),
            (SettingKey::RootPath, path_value(config.home_dir().to_path_buf())),
            (SettingKey::CurrentUsername, Value::from(DEFAULT_USERNAME)),
        ]);
        Self { store, defaults }
    }

    /// Raw stored value; `None` when the key was never written.
    pub fn get(&self, key: SettingKey) -> Option<Value> {
        self.store.get(key.as_str())
    }

    /// Stored value, or the default when absent.
    pub fn get_or_default(&self, key: SettingKey) -> Value {
        self.get(key).unwrap_or_else(|| self.default_value(key))
    }

    pub fn default_value(&self, key: SettingKey) -> Value {
        self.defaults.get(&key).cloned().unwrap_or(Value::Null)
    }

    /// Validate and persist a value. Ports are stored as numbers; every other
    /// key must be a non-empty string.
    pub fn set(&mut self, key: SettingKey, value: Value) -> Result<Value> {
        let value = match key {
            SettingKey::Port => Value::from(validate_port(&value)?),
            _ => match value {
                Value::String(s) if !s.trim().is_empty() => Value::String(s),
                other => {
                    return Err(Error::Settings(format!(
                        "{key} must be a non-empty string, got {other}"
                    )));
                }
            },
        };
        info!("changing setting {key}: {value}");
        self.store.set(key.as_str(), value.clone())?;
        Ok(value)
    }

    /// Write a value without validation. Used for values the supervisor
    /// derives itself.
    pub(crate) fn put(&mut self, key: SettingKey, value: Value) -> Result<()> {
        self.store.set(key.as_str(), value)
    }

    /// Restore every absent key to its default. Returns the keys restored.
    pub fn ensure_defaults(&mut self) -> Result<Vec<SettingKey>> {
        let mut restored = Vec::new();
        for key in SettingKey::ALL {
            if self.get(key).is_none() {
                let value = self.default_value(key);
                self.store.set(key.as_str(), value)?;
                restored.push(key);
            }
        }
        if !restored.is_empty() {
            info!("restored default settings for {restored:?}");
        }
        Ok(restored)
    }

    /// Reset the launch settings to their defaults. The stored username is
    /// kept: it mirrors the account inside the server database.
    pub fn reset(&mut self) -> Result<()> {
        for key in SettingKey::ALL {
            if key == SettingKey::CurrentUsername {
                continue;
            }
            let value = self.default_value(key);
            self.store.set(key.as_str(), value)?;
        }
        info!("settings reset to defaults");
        Ok(())
    }

    pub fn reset_port(&mut self) -> Result<u16> {
        self.store.set(SettingKey::Port.as_str(), Value::from(DEFAULT_PORT))?;
        Ok(DEFAULT_PORT)
    }

    /// Configured port, falling back to the default when the stored value is
    /// not a usable port.
    pub fn port(&self) -> u16 {
        self.get(SettingKey::Port)
            .and_then(|v| parse_port(&v))
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn address(&self) -> String {
        self.string(SettingKey::Address)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(self.string(SettingKey::DatabasePath))
    }

    pub fn current_username(&self) -> String {
        self.string(SettingKey::CurrentUsername)
    }

    pub fn set_current_username(&mut self, username: &str) -> Result<()> {
        self.put(SettingKey::CurrentUsername, Value::from(username))
    }

    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            port: self.port(),
            address: self.address(),
            database_path: self.database_path(),
            cert_path: PathBuf::from(self.string(SettingKey::CertPath)),
            key_path: PathBuf::from(self.string(SettingKey::KeyPath)),
            root_path: PathBuf::from(self.string(SettingKey::RootPath)),
        }
    }

    /// Every setting, defaults filled in.
    pub fn to_map(&self) -> Map<String, Value> {
        SettingKey::ALL
            .iter()
            .map(|&key| (key.as_str().to_string(), self.get_or_default(key)))
            .collect()
    }

    fn string(&self, key: SettingKey) -> String {
        match self.get_or_default(key) {
            Value::String(s) if !s.is_empty() => s,
            Value::String(_) | Value::Null => {
                self.default_value(key).as_str().unwrap_or_default().to_string()
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings").field("values", &self.to_map()).finish()
    }
}

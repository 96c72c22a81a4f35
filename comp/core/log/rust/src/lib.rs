// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Logging backend for the file browser supervisor.
//!
//! Installs a [`log::Log`] implementation that writes one line per record:
//!
//! ```text
//! 2026-10-19 07:12:03.114 UTC | INFO | fb_supervisor::supervisor: [filebrowser] spawned (pid=4242)
//! ```
//!
//! Records go to a log file when one is given (opened in append mode, so the
//! host plugin log survives restarts), otherwise to stderr.

use log::{LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

#[derive(Debug)]
pub enum InitError {
    /// The log file could not be opened.
    Open(io::Error),
    /// A global logger was already installed.
    AlreadyInstalled(log::SetLoggerError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Open(e) => write!(f, "could not open log file: {e}"),
            InitError::AlreadyInstalled(e) => write!(f, "logger already installed: {e}"),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Open(e) => Some(e),
            InitError::AlreadyInstalled(e) => Some(e),
        }
    }
}

pub struct Logger {
    level: LevelFilter,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    pub fn new(level: LevelFilter, sink: Box<dyn Write + Send>) -> Self {
        Self {
            level,
            sink: Mutex::new(sink),
        }
    }

    pub fn stderr(level: LevelFilter) -> Self {
        Self::new(level, Box::new(io::stderr()))
    }

    pub fn file(level: LevelFilter, path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(level, Box::new(file)))
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(record, OffsetDateTime::now_utc());
        // A poisoned sink still holds a usable writer.
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = sink.write_all(line.as_bytes());
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.flush();
        }
    }
}

/// Render one record as a newline-terminated log line.
pub fn format_record(record: &Record<'_>, now: OffsetDateTime) -> String {
    let timestamp = now
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!(
        "{timestamp} UTC | {level} | {target}: {message}\n",
        level = record.level(),
        target = record.target(),
        message = record.args(),
    )
}

/// Install the global logger. Logs to `path` when given, stderr otherwise.
pub fn init(level: LevelFilter, path: Option<&Path>) -> Result<(), InitError> {
    let logger = match path {
        Some(path) => Logger::file(level, path).map_err(InitError::Open)?,
        None => Logger::stderr(level),
    };
    log::set_boxed_logger(Box::new(logger)).map_err(InitError::AlreadyInstalled)?;
    log::set_max_level(level);
    Ok(())
}

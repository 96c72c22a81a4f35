// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};
use log::{debug, info};
use std::fs::{DirBuilder, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// On-disk witness that a server process is supervised. Absence means offline.
#[derive(Debug, Clone)]
pub struct PidRecord {
    path: PathBuf,
}

impl PidRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the recorded pid. A record that cannot be parsed is an error; the
    /// caller decides whether to clear it.
    pub fn read(&self) -> Result<u32> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::io(format!("reading {}", self.path.display()), e))?;
        let trimmed = contents.trim();
        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(pid),
            _ => Err(Error::PidRecord {
                path: self.path.clone(),
                reason: format!("invalid pid {trimmed:?}"),
            }),
        }
    }

    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            DirBuilder::new()
                .recursive(true)
                .create(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| Error::io(format!("creating {}", self.path.display()), e))?;
        write!(file, "{pid}")
            .map_err(|e| Error::io(format!("writing {}", self.path.display()), e))?;
        debug!("wrote pid {pid} to {}", self.path.display());
        Ok(())
    }

    /// Delete the record. Returns false when there was nothing to delete.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("removed pidfile {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(format!("removing {}", self.path.display()), e)),
        }
    }
}

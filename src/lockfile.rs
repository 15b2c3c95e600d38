// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Advisory lock files.
//!
//! A lock is the file `<path>.lock`, created exclusively and holding the PID
//! of its owner. It is removed when the guard is dropped.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("{path} is locked by process {pid}")]
    Held { path: PathBuf, pid: String },

    #[error("cannot create lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Lock path guarding `target`.
    pub fn path_for(target: &Path) -> PathBuf {
        let mut name = OsString::from(target.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Takes the lock on `target` or fails at once if someone holds it.
    pub fn acquire(target: &Path) -> Result<Self, LockError> {
        let path = Self::path_for(target);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let pid = fs::read_to_string(&path).unwrap_or_default();
                return Err(LockError::Held {
                    path: path.clone(),
                    pid: pid.trim().to_string(),
                });
            }
            Err(e) => return Err(io_err(e)),
        };

        // the guard owns the file from here on, so a failed write still unlocks
        let lock = LockFile { path: path.clone() };
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock {:?}: {}", self.path, e);
        }
    }
}

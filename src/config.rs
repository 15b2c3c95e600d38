// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Repository layout and defaults.

use crate::patchfile::{DEFAULT_VERSION, MAX_VERSION};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding chain data, relative to the project root.
pub const CODECHAIN_DIR: &str = ".codechain";

pub const HASHCHAIN_FILE: &str = "hashchain";

pub const PATCHES_DIR: &str = "patches";

/// Working copy of the last published tree, used to compute the next patch.
pub const TREE_HEAD_DIR: &str = "tree/head";

pub const ENV_PATCHFILE_VERSION: &str = "CODECHAIN_PATCHFILE_VERSION";

/// Comma separated extra excludes.
pub const ENV_EXCLUDE: &str = "CODECHAIN_EXCLUDE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{ENV_PATCHFILE_VERSION}={0} is not a supported patchfile version")]
    PatchfileVersion(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub root: PathBuf,
    pub excludes: Vec<String>,
    pub patchfile_version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            excludes: vec![CODECHAIN_DIR.to_string()],
            patchfile_version: DEFAULT_VERSION,
        }
    }
}

impl Config {
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// [`Config::for_root`] with overrides from the environment.
    pub fn from_env(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::for_root(root);
        if let Ok(version) = env::var(ENV_PATCHFILE_VERSION) {
            config.patchfile_version = match version.trim().parse::<u32>() {
                Ok(v) if (1..=MAX_VERSION).contains(&v) => v,
                _ => return Err(ConfigError::PatchfileVersion(version)),
            };
        }
        if let Ok(extra) = env::var(ENV_EXCLUDE) {
            config.apply_excludes(&extra);
        }
        Ok(config)
    }

    fn apply_excludes(&mut self, list: &str) {
        for exclude in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if !self.excludes.iter().any(|e| e == exclude) {
                self.excludes.push(exclude.to_string());
            }
        }
    }

    pub fn codechain_dir(&self) -> PathBuf {
        self.root.join(CODECHAIN_DIR)
    }

    pub fn hashchain_file(&self) -> PathBuf {
        self.codechain_dir().join(HASHCHAIN_FILE)
    }

    pub fn patch_dir(&self) -> PathBuf {
        self.codechain_dir().join(PATCHES_DIR)
    }

    pub fn tree_head_dir(&self) -> PathBuf {
        self.codechain_dir().join(TREE_HEAD_DIR)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

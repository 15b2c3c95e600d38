// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use codechain::hashchain::ChainError;
use codechain::lockfile::LockError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistError {
    #[error("Unknown file in archive: {0}")]
    UnknownFileInArchive(String),
    #[error("Archive contains no hashchain")]
    MissingHashchain,
    #[error("Archive contains an empty hashchain")]
    EmptyHashchain,
    #[error("Patch {0} is missing from the patch directory")]
    MissingPatch(String),
    #[error("Patch {0} differs from the local copy")]
    PatchConflict(String),
    #[error("Hashchain in archive is not valid UTF-8")]
    NotUtf8,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DistError>;

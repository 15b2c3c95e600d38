// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Patchfiles: textual, hash-verified deltas between two tree states.
//!
//! ```text
//! codechain patchfile version 2
//! treehash <hash of the tree before>
//! - f <hash> path           deletion (or the first half of a move/diff)
//! + x <hash> path           addition (or the second half)
//! dmppatch N                content block, N payload lines follow
//! treehash <hash of the tree after>
//! ```
//!
//! Application is a state machine ([`apply`]) that checks every file hash it
//! touches and the tree hash at both ends. Generation ([`diff`]) merge-joins
//! the listings of two trees.

pub mod apply;
pub mod diff;
mod reader;

pub use apply::{apply, apply_file};
pub use diff::{diff, diff_to_file};

use crate::codec::{Codec, CodecError};
use crate::hash::Hash;
use crate::tree::TreeError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Highest patchfile version this crate reads and writes.
pub const MAX_VERSION: u32 = 2;

/// Version written when none is requested.
pub const DEFAULT_VERSION: u32 = 2;

pub(crate) const HEADER_PREFIX: &str = "codechain patchfile version ";
pub(crate) const TREEHASH_PREFIX: &str = "treehash ";

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("line {line}: unsupported patchfile version {version}")]
    HeaderVersion { line: usize, version: String },

    #[error("line {line}: malformed patchfile header")]
    HeaderFields { line: usize },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: {codec} block: {source}")]
    Codec {
        line: usize,
        codec: Codec,
        #[source]
        source: CodecError,
    },

    #[error("tree hash before patch is {actual}, patch expects {expected}")]
    TreeHashStartMismatch { expected: Hash, actual: Hash },

    #[error("tree hash after patch is {actual}, patch expects {expected}")]
    TreeHashFinishMismatch { expected: Hash, actual: Hash },

    #[error("file to add already exists: {0}")]
    AddTargetExists(String),

    #[error("move target already exists: {0}")]
    MoveTargetExists(String),

    #[error("file hash mismatch before change: {0}")]
    FileHashMismatchBefore(String),

    #[error("file hash mismatch after change: {0}")]
    FileHashMismatchAfter(String),

    #[error("cannot encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: CodecError,
    },

    #[error("line {line}: content block ended early")]
    PrematureDiffEnd { line: usize },

    #[error("patchfile ended early")]
    PrematurePatchfileEnd,

    #[error("line {line}: trailing data after final tree hash")]
    NotTerminal { line: usize },

    #[error("path not allowed in patchfile: {0}")]
    InvalidPath(String),

    #[error("trees are identical")]
    NoDifference,

    #[error("no clean line patch for {0} (patchfile version 1)")]
    DiffNotClean(String),
}

pub type Result<T> = std::result::Result<T, PatchError>;

pub(crate) fn io_err(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> PatchError {
    let path = path.into();
    move |source| PatchError::Io { path, source }
}

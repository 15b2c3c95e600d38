// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::link::LinkParseError;
use crate::hash::Hash;
use crate::lockfile::LockError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: LinkParseError,
    },

    #[error("hashchain {0} is empty")]
    Empty(PathBuf),

    // integrity
    #[error("line {line}: previous hash does not match line {}", line.saturating_sub(1))]
    LinkBroken { line: usize },

    #[error("line {line}: timestamp is earlier than the previous line")]
    DescendingTime { line: usize },

    #[error("line {line}: cstart is only allowed on line 0")]
    IllegalChainStart { line: usize },

    #[error("hashchain must start with cstart")]
    MustStartWithChainStart,

    #[error("line {line}: invalid signature")]
    InvalidSignature { line: usize },

    // policy
    #[error("line {line}: {pubkey} is not a signer")]
    UnknownSigner { line: usize, pubkey: String },

    #[error("line {line}: {pubkey} is already a signer")]
    DuplicateSigner { line: usize, pubkey: String },

    #[error("line {line}: signer weight must be positive")]
    WeightNonPositive { line: usize },

    #[error("line {line}: total signer weight would overflow")]
    WeightOverflow { line: usize },

    #[error("line {line}: signature threshold must be positive")]
    SignatureThresholdNonPositive { line: usize },

    #[error("line {line}: threshold m={m} would exceed total weight n={n}")]
    MLargerThanN { line: usize, m: u32, n: u32 },

    #[error("line {line}: no entry with hash {hash}")]
    UnknownEntry { line: usize, hash: Hash },

    #[error("line {line}: {pubkey} already signed this entry")]
    RedundantSignature { line: usize, pubkey: String },

    #[error("head {0} not found in hashchain")]
    HeadNotFound(Hash),

    #[error("no line {0} in hashchain")]
    LineOutOfRange(usize),

    // merge
    #[error("hashchains diverge at line {line}")]
    CannotMerge { line: usize },

    #[error("nothing to merge")]
    NothingToMerge,
}

pub type Result<T> = std::result::Result<T, ChainError>;

pub(crate) fn io_err(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> ChainError {
    let path = path.into();
    move |source| ChainError::Io { path, source }
}

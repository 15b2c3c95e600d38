// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Offline verification of hashchain files and trees.

use crate::hash::Hash;
use crate::hashchain::{self, ChainError};
use crate::proof::ChainProof;
use crate::tree::{self, TreeError};
use std::path::Path;

/// Replays the chain at `path` from scratch and summarizes it.
///
/// Takes no lock; the file is only read.
pub fn verify_hashchain(path: &Path) -> Result<ChainProof, ChainError> {
    let (_, state) = hashchain::verify_file(path)?;
    Ok(ChainProof::from(&state))
}

/// True when the tree at `root` hashes to `expected`.
pub fn tree_matches(root: &Path, excludes: &[String], expected: &Hash) -> Result<bool, TreeError> {
    Ok(tree::hash(root, excludes)? == *expected)
}

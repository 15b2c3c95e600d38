// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Bringing a directory to a tree state recorded in a hashchain.
//!
//! Patches are stored as `patch_dir/<hex of the tree hash they start from>`,
//! so the tree-hash history of a chain is also the sequence of patches that
//! walks an empty directory to any published state.

use crate::hash::{Hash, EMPTY_HASH};
use crate::patchfile::{self, PatchError};
use crate::tree::{self, TreeError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("tree hash history must start with the empty tree")]
    HistoryStart,

    #[error("target {0} is not in the tree hash history")]
    TargetNotInHistory(Hash),

    #[error("{0} matches no state before the target; a destructive reset is required")]
    CannotRemove(PathBuf),

    #[error("patch did not produce {expected} (tree is at {actual})")]
    PatchFailedToCreateTarget { expected: Hash, actual: Hash },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> SyncError {
    let path = path.to_path_buf();
    move |source| SyncError::Io { path, source }
}

/// Path of the patch that starts from `tree_hash`.
pub fn patch_path(patch_dir: &Path, tree_hash: &Hash) -> PathBuf {
    patch_dir.join(tree_hash.to_hex())
}

/// Brings `tree_dir` to `target` by applying patches from `patch_dir`.
///
/// The directory must currently match some history entry at or before the
/// target. Otherwise, with `allow_destructive_reset`, every non-excluded entry
/// is removed and the directory is rebuilt from the empty tree.
pub fn sync(
    tree_dir: &Path,
    target: &Hash,
    patch_dir: &Path,
    history: &[Hash],
    excludes: &[String],
    allow_destructive_reset: bool,
) -> Result<()> {
    if history.first() != Some(&EMPTY_HASH) {
        return Err(SyncError::HistoryStart);
    }
    let target_index = history
        .iter()
        .rposition(|h| h == target)
        .ok_or(SyncError::TargetNotInHistory(*target))?;

    let mut current = tree::hash(tree_dir, excludes)?;
    if current == *target {
        tracing::debug!("{:?} already at {}", tree_dir, target);
        return Ok(());
    }

    let start = match history[..=target_index].iter().rposition(|h| *h == current) {
        Some(index) => index,
        None if allow_destructive_reset => {
            tracing::warn!("Resetting {:?}: tree {} is not in history", tree_dir, current);
            reset(tree_dir, excludes)?;
            current = tree::hash(tree_dir, excludes)?;
            0
        }
        None => return Err(SyncError::CannotRemove(tree_dir.to_path_buf())),
    };

    for (index, expected) in history.iter().enumerate().take(target_index + 1).skip(start) {
        if current != *expected {
            return Err(SyncError::PatchFailedToCreateTarget {
                expected: *expected,
                actual: current,
            });
        }
        if current == *target || index == target_index {
            break;
        }
        let patch = patch_path(patch_dir, &current);
        patchfile::apply_file(tree_dir, &patch, excludes)?;
        current = tree::hash(tree_dir, excludes)?;
        tracing::info!("Synced {:?} to {}", tree_dir, current);
    }
    Ok(())
}

/// Removes everything below `dir` that is not excluded.
fn reset(dir: &Path, excludes: &[String]) -> Result<()> {
    let excludes = tree::normalize_excludes(excludes);
    remove_below(dir, "", &excludes)
}

fn remove_below(root: &Path, rel: &str, excludes: &[String]) -> Result<()> {
    let dir = root.join(rel);

    for dirent in fs::read_dir(&dir).map_err(io_err(&dir))? {
        let dirent = dirent.map_err(io_err(&dir))?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        let rel_path = if rel.is_empty() {
            name
        } else {
            format!("{rel}/{name}")
        };
        let path = dirent.path();

        if excludes.iter().any(|e| *e == rel_path) {
            continue;
        }
        // keep directories that hold an excluded path
        let prefix = format!("{rel_path}/");
        if excludes.iter().any(|e| e.starts_with(&prefix)) {
            remove_below(root, &rel_path, excludes)?;
            continue;
        }

        let file_type = dirent.file_type().map_err(io_err(&path))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(io_err(&path))?;
        } else {
            fs::remove_file(&path).map_err(io_err(&path))?;
        }
    }
    Ok(())
}

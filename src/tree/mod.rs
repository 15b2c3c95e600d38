// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Deterministic directory listings and tree hashes.
//!
//! The tree hash is the state fingerprint shared by the hashchain and the
//! patchfile engine:
//!
//! ```text
//! SHA-256( for each file in walk order: "{f|x} {sha256 hex} {path}\n" )
//! ```
//!
//! # Invariants
//! - Walk order is depth-first with entries sorted by name bytes.
//! - Only directories and regular files are allowed.
//! - The format is frozen. Changing it invalidates every recorded tree hash.

pub mod entry;

pub use entry::{cmp_paths, Mode, TreeEntry};

use crate::hash::Hash;
use sha2::{Digest, Sha256};
use std::fs::{self, File, Metadata};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("neither directory nor regular file: {0}")]
    InvalidEntryKind(PathBuf),

    #[error("permission error: {path} has mode {mode:o}")]
    Permission { path: PathBuf, mode: u32 },

    #[error("path cannot be represented in a listing: {0}")]
    InvalidPath(PathBuf),
}

pub type Result<T> = std::result::Result<T, TreeError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> TreeError + '_ {
    move |source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Lists every file below `root` in canonical order.
///
/// `excludes` are root-relative slash paths. An excluded directory is not
/// descended into.
pub fn list(root: &Path, excludes: &[String]) -> Result<Vec<TreeEntry>> {
    let excludes = normalize_excludes(excludes);
    let meta = fs::metadata(root).map_err(io_err(root))?;
    if !meta.is_dir() {
        return Err(TreeError::InvalidEntryKind(root.to_path_buf()));
    }
    check_dir_mode(root, &meta)?;

    let mut entries = Vec::new();
    walk(root, "", &excludes, &mut entries)?;
    Ok(entries)
}

/// Tree hash of `root`.
pub fn hash(root: &Path, excludes: &[String]) -> Result<Hash> {
    let entries = list(root, excludes)?;
    Ok(hash_entries(&entries))
}

/// Canonical listing text, one `"{mode} {hash} {path}\n"` line per entry.
pub fn serialize(entries: &[TreeEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.to_string());
        out.push('\n');
    }
    out
}

pub fn hash_entries(entries: &[TreeEntry]) -> Hash {
    Hash::digest(serialize(entries).as_bytes())
}

/// SHA-256 over the raw bytes of a file.
pub fn hash_file(path: &Path) -> Result<Hash> {
    let file = File::open(path).map_err(io_err(path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(io_err(path))?;
    Ok(Hash::from_bytes(hasher.finalize().into()))
}

pub(crate) fn normalize_excludes(excludes: &[String]) -> Vec<String> {
    excludes
        .iter()
        .map(|e| e.trim_start_matches("./").trim_end_matches('/').to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

fn walk(root: &Path, rel: &str, excludes: &[String], out: &mut Vec<TreeEntry>) -> Result<()> {
    let dir = if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    };

    let mut names = Vec::new();
    for dirent in fs::read_dir(&dir).map_err(io_err(&dir))? {
        let dirent = dirent.map_err(io_err(&dir))?;
        let name = dirent
            .file_name()
            .into_string()
            .map_err(|_| TreeError::InvalidPath(dirent.path()))?;
        if name.contains('\n') {
            return Err(TreeError::InvalidPath(dirent.path()));
        }
        names.push(name);
    }
    names.sort();

    for name in names {
        let rel_path = if rel.is_empty() {
            name
        } else {
            format!("{rel}/{name}")
        };
        if excludes.iter().any(|e| *e == rel_path) {
            continue;
        }

        let path = root.join(&rel_path);
        let meta = fs::symlink_metadata(&path).map_err(io_err(&path))?;
        if meta.is_dir() {
            check_dir_mode(&path, &meta)?;
            walk(root, &rel_path, excludes, out)?;
        } else if meta.is_file() {
            let mode = file_mode(&path, &meta)?;
            let hash = hash_file(&path)?;
            out.push(TreeEntry {
                mode,
                hash,
                path: rel_path,
            });
        } else {
            return Err(TreeError::InvalidEntryKind(path));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn check_dir_mode(path: &Path, meta: &Metadata) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode() & 0o777;
    if mode & 0o700 != 0o700 {
        return Err(TreeError::Permission {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_dir_mode(_path: &Path, _meta: &Metadata) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path, meta: &Metadata) -> Result<Mode> {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode() & 0o777;
    let permission_error = || TreeError::Permission {
        path: path.to_path_buf(),
        mode,
    };

    if mode & 0o100 != 0 {
        if mode & 0o700 != 0o700 {
            return Err(permission_error());
        }
        Ok(Mode::Executable)
    } else {
        // regular files must be owner rw and not executable by anyone
        if mode & 0o600 != 0o600 || mode & 0o011 != 0 {
            return Err(permission_error());
        }
        Ok(Mode::Regular)
    }
}

#[cfg(not(unix))]
fn file_mode(_path: &Path, _meta: &Metadata) -> Result<Mode> {
    Ok(Mode::Regular)
}

/// Applies the permission bits of `mode` to `path`.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: Mode) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode.permissions()))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: Mode) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::hash::EMPTY_HASH;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, data: &[u8], perm: u32) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, data).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(perm)).unwrap();
    }

    #[test]
    fn test_empty_tree_hash() {
        let dir = tempdir().unwrap();
        assert_eq!(hash(dir.path(), &[]).unwrap(), EMPTY_HASH);
        assert!(list(dir.path(), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_single_file_hash_is_frozen() {
        let dir = tempdir().unwrap();
        write(dir.path(), "hello.txt", b"hi\n", 0o644);

        let file_hash = Hash::digest(b"hi\n");
        let expected = Hash::digest(format!("f {} hello.txt\n", file_hash).as_bytes());
        assert_eq!(hash(dir.path(), &[]).unwrap(), expected);
    }

    #[test]
    fn test_walk_order_and_modes() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", b"1", 0o644);
        write(dir.path(), "a/b", b"2", 0o644);
        write(dir.path(), "bin/run", b"#!/bin/sh\n", 0o755);

        let entries = list(dir.path(), &[]).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b", "a.txt", "bin/run"]);
        assert_eq!(entries[2].mode, Mode::Executable);
        assert_eq!(entries[0].mode, Mode::Regular);
    }

    #[test]
    fn test_hash_independent_of_creation_order() {
        let one = tempdir().unwrap();
        let two = tempdir().unwrap();

        write(one.path(), "z/last", b"z", 0o644);
        write(one.path(), "m", b"m", 0o644);
        write(one.path(), "a/first", b"a", 0o755);

        write(two.path(), "a/first", b"a", 0o755);
        write(two.path(), "m", b"m", 0o644);
        write(two.path(), "z/last", b"z", 0o644);

        assert_eq!(hash(one.path(), &[]).unwrap(), hash(two.path(), &[]).unwrap());
    }

    #[test]
    fn test_excluded_directory_skips_subtree() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/main.rs", b"fn main() {}\n", 0o644);
        write(dir.path(), ".codechain/hashchain", b"junk", 0o644);
        write(dir.path(), ".codechain/patches/x", b"junk", 0o644);

        let excludes = vec![".codechain/".to_string()];
        let entries = list(dir.path(), &excludes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "src/main.rs");

        let clean = tempdir().unwrap();
        write(clean.path(), "src/main.rs", b"fn main() {}\n", 0o644);
        assert_eq!(hash(dir.path(), &excludes).unwrap(), hash(clean.path(), &[]).unwrap());
    }

    #[test]
    fn test_permission_policy() {
        let dir = tempdir().unwrap();
        write(dir.path(), "readonly", b"r", 0o444);
        assert!(matches!(list(dir.path(), &[]), Err(TreeError::Permission { .. })));

        let dir = tempdir().unwrap();
        write(dir.path(), "group-exec", b"g", 0o654);
        assert!(matches!(list(dir.path(), &[]), Err(TreeError::Permission { .. })));

        let dir = tempdir().unwrap();
        write(dir.path(), "half-exec", b"h", 0o544);
        assert!(matches!(list(dir.path(), &[]), Err(TreeError::Permission { .. })));
    }

    #[test]
    fn test_symlink_is_invalid_entry() {
        let dir = tempdir().unwrap();
        write(dir.path(), "target", b"t", 0o644);
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

        assert!(matches!(list(dir.path(), &[]), Err(TreeError::InvalidEntryKind(_))));
    }
}

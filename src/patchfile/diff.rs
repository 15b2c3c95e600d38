// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Patchfile generation.

use super::{io_err, PatchError, Result, HEADER_PREFIX, MAX_VERSION, TREEHASH_PREFIX};
use crate::codec::{self, CodecError};
use crate::tree::{self, cmp_paths, TreeEntry};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes the patchfile that turns tree `a` into tree `b`.
///
/// Returns [`PatchError::NoDifference`] when both trees hash the same.
/// Deletions are written first so that a path can change between file and
/// directory within one patch.
pub fn diff<W: Write>(w: &mut W, version: u32, a: &Path, b: &Path, excludes: &[String]) -> Result<()> {
    if !(1..=MAX_VERSION).contains(&version) {
        return Err(PatchError::HeaderVersion {
            line: 0,
            version: version.to_string(),
        });
    }

    let old = tree::list(a, excludes)?;
    let new = tree::list(b, excludes)?;
    let start = tree::hash_entries(&old);
    let finish = tree::hash_entries(&new);
    if start == finish {
        return Err(PatchError::NoDifference);
    }

    let mut deletions = String::new();
    let mut changes = String::new();
    let mut i = 0;
    let mut j = 0;
    while i < old.len() || j < new.len() {
        let order = match (old.get(i), new.get(j)) {
            (Some(x), Some(y)) => cmp_paths(&x.path, &y.path),
            (Some(_), None) => Ordering::Less,
            _ => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                push_entry(&mut deletions, '-', &old[i]);
                i += 1;
            }
            Ordering::Greater => {
                push_entry(&mut changes, '+', &new[j]);
                push_block(&mut changes, version, None, b, &new[j])?;
                j += 1;
            }
            Ordering::Equal => {
                let (x, y) = (&old[i], &new[j]);
                if x != y {
                    push_entry(&mut changes, '-', x);
                    push_entry(&mut changes, '+', y);
                    if x.hash != y.hash {
                        let before = read(a, x)?;
                        push_block(&mut changes, version, Some(&before), b, y)?;
                    }
                }
                i += 1;
                j += 1;
            }
        }
    }

    let out = format!(
        "{HEADER_PREFIX}{version}\n{TREEHASH_PREFIX}{start}\n{deletions}{changes}{TREEHASH_PREFIX}{finish}\n"
    );
    w.write_all(out.as_bytes()).map_err(io_err("<patchfile>"))?;
    tracing::debug!("Generated patch {} -> {}", start, finish);
    Ok(())
}

/// Writes the patch from `a` to `b` into a new file at `path` and syncs it.
pub fn diff_to_file(path: &Path, version: u32, a: &Path, b: &Path, excludes: &[String]) -> Result<()> {
    let mut buf = Vec::new();
    diff(&mut buf, version, a, b, excludes)?;

    let file = File::create(path).map_err(io_err(path))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&buf).map_err(io_err(path))?;
    writer.flush().map_err(io_err(path))?;
    writer.get_ref().sync_all().map_err(io_err(path))?;
    Ok(())
}

fn push_entry(out: &mut String, sign: char, entry: &TreeEntry) {
    out.push(sign);
    out.push(' ');
    out.push_str(&entry.to_string());
    out.push('\n');
}

fn push_block(out: &mut String, version: u32, before: Option<&[u8]>, b: &Path, entry: &TreeEntry) -> Result<()> {
    let after = read(b, entry)?;
    let block = codec::encode(version, before, &after).map_err(|e| encode_error(entry, e))?;
    out.push_str(&block.header());
    out.push('\n');
    out.push_str(&block.text);
    Ok(())
}

fn encode_error(entry: &TreeEntry, error: CodecError) -> PatchError {
    match error {
        CodecError::NotClean => PatchError::DiffNotClean(entry.path.clone()),
        source => PatchError::Encode {
            path: entry.path.clone(),
            source,
        },
    }
}

fn read(root: &Path, entry: &TreeEntry) -> Result<Vec<u8>> {
    let path = root.join(&entry.path);
    fs::read(&path).map_err(io_err(path))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, data: &[u8], perm: u32) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, data).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(perm)).unwrap();
    }

    fn diff_string(version: u32, a: &Path, b: &Path) -> Result<String> {
        let mut out = Vec::new();
        diff(&mut out, version, a, b, &[])?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_identical_trees_have_no_patch() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write(a.path(), "same", b"1\n", 0o644);
        write(b.path(), "same", b"1\n", 0o644);
        assert!(matches!(diff_string(2, a.path(), b.path()), Err(PatchError::NoDifference)));
    }

    #[test]
    fn test_unsupported_version() {
        let a = tempdir().unwrap();
        assert!(matches!(
            diff_string(3, a.path(), a.path()),
            Err(PatchError::HeaderVersion { .. })
        ));
        assert!(matches!(
            diff_string(0, a.path(), a.path()),
            Err(PatchError::HeaderVersion { .. })
        ));
    }

    #[test]
    fn test_deletions_come_first() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write(a.path(), "x/inner", b"i\n", 0o644);
        write(a.path(), "z", b"z\n", 0o644);
        write(b.path(), "x", b"now a file\n", 0o644);

        let patch = diff_string(2, a.path(), b.path()).unwrap();
        let ops: Vec<&str> = patch
            .lines()
            .filter(|l| l.starts_with("- ") || l.starts_with("+ "))
            .map(|l| l.rsplit(' ').next().unwrap())
            .collect();
        assert_eq!(ops, vec!["x/inner", "z", "x"]);
    }

    #[test]
    fn test_mode_change_has_no_block() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write(a.path(), "run", b"#!/bin/sh\n", 0o644);
        write(b.path(), "run", b"#!/bin/sh\n", 0o755);

        let patch = diff_string(2, a.path(), b.path()).unwrap();
        let lines: Vec<&str> = patch.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[2].starts_with("- f "));
        assert!(lines[3].starts_with("+ x "));
        assert!(lines[4].starts_with("treehash "));
    }

    #[test]
    fn test_unclean_text_in_version_one() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write(a.path(), "repeat", "a\n".repeat(20).as_bytes(), 0o644);
        let changed = format!("{}b\n{}", "a\n".repeat(10), "a\n".repeat(9));
        write(b.path(), "repeat", changed.as_bytes(), 0o644);

        assert!(matches!(
            diff_string(1, a.path(), b.path()),
            Err(PatchError::DiffNotClean(p)) if p == "repeat"
        ));
        let patch = diff_string(2, a.path(), b.path()).unwrap();
        assert!(patch.contains("\nutf8file 20\n"));
    }

    #[test]
    fn test_encode_errors_name_the_file() {
        let entry = TreeEntry {
            mode: tree::Mode::Regular,
            hash: crate::hash::EMPTY_HASH,
            path: "src/lib.rs".to_string(),
        };
        assert!(matches!(
            encode_error(&entry, CodecError::NotUtf8),
            PatchError::Encode { path, source: CodecError::NotUtf8 } if path == "src/lib.rs"
        ));
        assert!(matches!(
            encode_error(&entry, CodecError::NotClean),
            PatchError::DiffNotClean(p) if p == "src/lib.rs"
        ));
    }
}

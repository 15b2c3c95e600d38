// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Tree listing entries.

use crate::hash::Hash;
use std::cmp::Ordering;
use std::fmt;

/// File classification recorded in listings and patchfiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Regular,
    Executable,
}

impl Mode {
    pub fn as_char(self) -> char {
        match self {
            Mode::Regular => 'f',
            Mode::Executable => 'x',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'f' => Some(Mode::Regular),
            'x' => Some(Mode::Executable),
            _ => None,
        }
    }

    pub fn from_field(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => None,
        }
    }

    /// Permission bits written for files of this mode.
    pub fn permissions(self) -> u32 {
        match self {
            Mode::Regular => 0o644,
            Mode::Executable => 0o755,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One file of a tree snapshot. `path` is root-relative with `/` separators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: Mode,
    pub hash: Hash,
    pub path: String,
}

impl fmt::Display for TreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.mode, self.hash, self.path)
    }
}

/// Canonical ordering of tree paths.
///
/// Paths are compared component by component, which is exactly the order a
/// depth-first walk produces when it visits directory entries sorted by name.
/// `a/b` therefore sorts before `a.txt` even though `.` < `/` bytewise.
pub fn cmp_paths(a: &str, b: &str) -> Ordering {
    a.split('/').cmp(b.split('/'))
}

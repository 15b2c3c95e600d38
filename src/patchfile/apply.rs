// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Patchfile application.
//!
//! The parser is an explicit state machine. Each state consumes lines from the
//! reader and yields the next state; lookahead states push a line back when it
//! belongs to the following operation.
//!
//! Changes are written file by file as they are read. A failure part way
//! through leaves the earlier changes on disk; recovery is a fresh sync from a
//! verified tree.

use super::reader::LineReader;
use super::{io_err, PatchError, Result, HEADER_PREFIX, MAX_VERSION, TREEHASH_PREFIX};
use crate::codec::Codec;
use crate::hash::Hash;
use crate::tree::{self, Mode, TreeEntry};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Add,
    Delete,
}

#[derive(Debug)]
enum State {
    Start,
    TreeHashHeader,
    FileDiffLookahead,
    SecondFileDiffLookahead(TreeEntry),
    AddFileBody(TreeEntry),
    DiffFileBody { minus: TreeEntry, plus: TreeEntry },
    Terminal,
}

/// Applies the patchfile read from `reader` to the tree at `dir`.
pub fn apply<R: BufRead>(dir: &Path, reader: R, excludes: &[String]) -> Result<()> {
    Applier::new(dir, LineReader::new(reader, "<patchfile>"), excludes).run()
}

/// Applies the patchfile stored at `patch`.
pub fn apply_file(dir: &Path, patch: &Path, excludes: &[String]) -> Result<()> {
    let file = File::open(patch).map_err(io_err(patch))?;
    tracing::debug!("Applying patchfile {:?} to {:?}", patch, dir);
    Applier::new(dir, LineReader::new(BufReader::new(file), patch), excludes).run()
}

struct Applier<'a, R> {
    dir: &'a Path,
    excludes: Vec<String>,
    lines: LineReader<R>,
    version: u32,
}

impl<'a, R: BufRead> Applier<'a, R> {
    fn new(dir: &'a Path, lines: LineReader<R>, excludes: &[String]) -> Self {
        Self {
            dir,
            excludes: tree::normalize_excludes(excludes),
            lines,
            version: 0,
        }
    }

    fn run(mut self) -> Result<()> {
        let mut state = State::Start;
        loop {
            state = match state {
                State::Start => self.start()?,
                State::TreeHashHeader => self.tree_hash_header()?,
                State::FileDiffLookahead => self.file_diff_lookahead()?,
                State::SecondFileDiffLookahead(minus) => self.second_file_diff_lookahead(minus)?,
                State::AddFileBody(plus) => self.add_file_body(plus)?,
                State::DiffFileBody { minus, plus } => self.diff_file_body(minus, plus)?,
                State::Terminal => {
                    if self.lines.next_line()?.is_some() {
                        return Err(PatchError::NotTerminal {
                            line: self.lines.line(),
                        });
                    }
                    return Ok(());
                }
            };
        }
    }

    fn start(&mut self) -> Result<State> {
        let line = self.lines.expect_line()?;
        let n = self.lines.line();
        let field = line
            .strip_prefix(HEADER_PREFIX)
            .filter(|v| !v.is_empty() && !v.contains(' '))
            .ok_or(PatchError::HeaderFields { line: n })?;

        self.version = match field.parse::<u32>() {
            Ok(v) if (1..=MAX_VERSION).contains(&v) && v.to_string() == field => v,
            _ => {
                return Err(PatchError::HeaderVersion {
                    line: n,
                    version: field.to_string(),
                })
            }
        };
        Ok(State::TreeHashHeader)
    }

    fn tree_hash_header(&mut self) -> Result<State> {
        let line = self.lines.expect_line()?;
        let expected = match line.strip_prefix(TREEHASH_PREFIX) {
            Some(hex) => self.hash_field(hex)?,
            None => return Err(self.lines.syntax("expected treehash line")),
        };
        let actual = tree::hash(self.dir, &self.excludes)?;
        if actual != expected {
            return Err(PatchError::TreeHashStartMismatch { expected, actual });
        }
        Ok(State::FileDiffLookahead)
    }

    fn file_diff_lookahead(&mut self) -> Result<State> {
        let line = self.lines.expect_line()?;
        if let Some(hex) = line.strip_prefix(TREEHASH_PREFIX) {
            let expected = self.hash_field(hex)?;
            let actual = tree::hash(self.dir, &self.excludes)?;
            if actual != expected {
                return Err(PatchError::TreeHashFinishMismatch { expected, actual });
            }
            return Ok(State::Terminal);
        }

        match self.file_line(&line)? {
            (Op::Add, plus) => {
                if self.exists(&plus.path) {
                    return Err(PatchError::AddTargetExists(plus.path));
                }
                Ok(State::AddFileBody(plus))
            }
            (Op::Delete, minus) => Ok(State::SecondFileDiffLookahead(minus)),
        }
    }

    fn second_file_diff_lookahead(&mut self, minus: TreeEntry) -> Result<State> {
        let line = self.lines.expect_line()?;
        let plus = if line.starts_with(TREEHASH_PREFIX) {
            None
        } else {
            match self.file_line(&line)? {
                (Op::Add, plus) => Some(plus),
                (Op::Delete, _) => None,
            }
        };

        let Some(plus) = plus else {
            self.lines.push_back(line);
            self.delete(&minus)?;
            return Ok(State::FileDiffLookahead);
        };

        if plus.path != minus.path {
            self.verify_before(&minus)?;
            // the target may be a directory that only holds the source
            let inside = minus.path.starts_with(&format!("{}/", plus.path));
            if self.exists(&plus.path) && !inside {
                return Err(PatchError::MoveTargetExists(plus.path));
            }
            tracing::debug!("move {} -> {}", minus.path, plus.path);
            self.remove(&minus.path)?;
            if self.exists(&plus.path) {
                return Err(PatchError::MoveTargetExists(plus.path));
            }
            return Ok(State::AddFileBody(plus));
        }

        if plus.hash == minus.hash {
            self.verify_before(&minus)?;
            let path = self.dir.join(&plus.path);
            tree::set_mode(&path, plus.mode).map_err(io_err(&path))?;
            tracing::debug!("mode {} {}", plus.mode, plus.path);
            return Ok(State::FileDiffLookahead);
        }

        Ok(State::DiffFileBody { minus, plus })
    }

    fn add_file_body(&mut self, plus: TreeEntry) -> Result<State> {
        let content = self.content_block(None)?;
        let path = self.dir.join(&plus.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_err(&path))?;
        file.write_all(&content).map_err(io_err(&path))?;
        drop(file);

        tree::set_mode(&path, plus.mode).map_err(io_err(&path))?;
        self.verify_after(&plus)?;
        tracing::debug!("add {}", plus.path);
        Ok(State::FileDiffLookahead)
    }

    fn diff_file_body(&mut self, minus: TreeEntry, plus: TreeEntry) -> Result<State> {
        let path = self.dir.join(&plus.path);
        self.verify_before(&minus)?;
        let old = fs::read(&path).map_err(io_err(&path))?;
        let content = self.content_block(Some(&old))?;

        fs::write(&path, &content).map_err(io_err(&path))?;
        tree::set_mode(&path, plus.mode).map_err(io_err(&path))?;
        self.verify_after(&plus)?;
        tracing::debug!("diff {}", plus.path);
        Ok(State::FileDiffLookahead)
    }

    /// Reads a `codec N` header plus its payload and decodes it.
    fn content_block(&mut self, old: Option<&[u8]>) -> Result<Vec<u8>> {
        let header = self.lines.next_line()?.ok_or(PatchError::PrematureDiffEnd {
            line: self.lines.line(),
        })?;
        let header_line = self.lines.line();

        let (keyword, count) = header
            .split_once(' ')
            .ok_or_else(|| self.lines.syntax("expected content block header"))?;
        let codec = Codec::from_keyword(keyword)
            .ok_or_else(|| self.lines.syntax(format!("unknown content codec {keyword:?}")))?;
        if codec.since_version() > self.version {
            return Err(self
                .lines
                .syntax(format!("{codec} needs patchfile version {}", codec.since_version())));
        }
        let count: usize = match count.parse() {
            Ok(n) if count.bytes().all(|b| b.is_ascii_digit()) => n,
            _ => return Err(self.lines.syntax(format!("bad line count {count:?}"))),
        };
        if count < codec.min_lines() {
            return Err(self
                .lines
                .syntax(format!("{codec} block needs at least {} lines", codec.min_lines())));
        }

        let mut payload = Vec::new();
        for _ in 0..count {
            match self.lines.next_line()? {
                Some(line) => payload.push(line),
                None => return Err(PatchError::PrematureDiffEnd { line: header_line }),
            }
        }

        codec.apply(old, &payload).map_err(|source| PatchError::Codec {
            line: header_line,
            codec,
            source,
        })
    }

    /// Parses `"{+|-} {f|x} HASH path"`.
    fn file_line(&self, line: &str) -> Result<(Op, TreeEntry)> {
        let mut fields = line.splitn(4, ' ');
        let (Some(sign), Some(mode), Some(hex), Some(path)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(self.lines.syntax(format!("malformed file line {line:?}")));
        };

        let op = match sign {
            "+" => Op::Add,
            "-" => Op::Delete,
            _ => return Err(self.lines.syntax(format!("malformed file line {line:?}"))),
        };
        let mode = Mode::from_field(mode)
            .ok_or_else(|| self.lines.syntax(format!("unknown file mode {mode:?}")))?;
        let hash = self.hash_field(hex)?;
        self.check_path(path)?;

        Ok((
            op,
            TreeEntry {
                mode,
                hash,
                path: path.to_string(),
            },
        ))
    }

    fn hash_field(&self, hex: &str) -> Result<Hash> {
        Hash::from_hex(hex).map_err(|e| self.lines.syntax(e.to_string()))
    }

    /// Patch paths are relative, normalized and outside excluded subtrees.
    fn check_path(&self, path: &str) -> Result<()> {
        let normalized = !path.is_empty()
            && path
                .split('/')
                .all(|c| !c.is_empty() && c != "." && c != "..");
        let excluded = self
            .excludes
            .iter()
            .any(|e| path == e || path.strip_prefix(e.as_str()).is_some_and(|r| r.starts_with('/')));
        if !normalized || excluded {
            return Err(PatchError::InvalidPath(path.to_string()));
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        fs::symlink_metadata(self.dir.join(path)).is_ok()
    }

    fn verify_before(&self, entry: &TreeEntry) -> Result<()> {
        let path = self.dir.join(&entry.path);
        if !path.is_file() || tree::hash_file(&path)? != entry.hash {
            return Err(PatchError::FileHashMismatchBefore(entry.path.clone()));
        }
        Ok(())
    }

    fn verify_after(&self, entry: &TreeEntry) -> Result<()> {
        if tree::hash_file(&self.dir.join(&entry.path))? != entry.hash {
            return Err(PatchError::FileHashMismatchAfter(entry.path.clone()));
        }
        Ok(())
    }

    fn delete(&self, minus: &TreeEntry) -> Result<()> {
        self.verify_before(minus)?;
        self.remove(&minus.path)?;
        tracing::debug!("delete {}", minus.path);
        Ok(())
    }

    /// Removes a file and then every parent directory it left empty.
    fn remove(&self, rel: &str) -> Result<()> {
        let path = self.dir.join(rel);
        fs::remove_file(&path).map_err(io_err(&path))?;

        let mut parent: Option<PathBuf> = path.parent().map(Path::to_path_buf);
        while let Some(dir) = parent {
            if dir == self.dir || !dir.starts_with(self.dir) {
                break;
            }
            let empty = fs::read_dir(&dir)
                .map_err(io_err(&dir))?
                .next()
                .is_none();
            if !empty {
                break;
            }
            fs::remove_dir(&dir).map_err(io_err(&dir))?;
            parent = dir.parent().map(Path::to_path_buf);
        }
        Ok(())
    }
}

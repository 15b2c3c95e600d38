// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Numbered line reader with one line of push-back.

use super::{PatchError, Result};
use std::io::BufRead;
use std::path::PathBuf;

pub(crate) struct LineReader<R> {
    inner: R,
    source: PathBuf,
    line: usize,
    pushed: Option<String>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R, source: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            source: source.into(),
            line: 0,
            pushed: None,
        }
    }

    /// Number of the line most recently returned (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Next line without its `'\n'`, or `None` at end of input.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pushed.take() {
            self.line += 1;
            return Ok(Some(line));
        }

        let mut buf = String::new();
        let read = self.inner.read_line(&mut buf).map_err(|source| PatchError::Io {
            path: self.source.clone(),
            source,
        })?;
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        if buf.ends_with('\n') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    /// Like [`next_line`](Self::next_line) but end of input is an error.
    pub fn expect_line(&mut self) -> Result<String> {
        self.next_line()?.ok_or(PatchError::PrematurePatchfileEnd)
    }

    pub fn push_back(&mut self, line: String) {
        debug_assert!(self.pushed.is_none());
        self.line -= 1;
        self.pushed = Some(line);
    }

    pub fn syntax(&self, message: impl Into<String>) -> PatchError {
        PatchError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Line-oriented text patches in diff-match-patch patch text form.
//!
//! The diff is computed over lines (Myers, via `similar`) and grouped into
//! hunks with [`CONTEXT_LINES`] lines of context. Each hunk is written as
//!
//! ```text
//! @@ -{start1},{len1} +{start2},{len2} @@
//!  {context}
//! -{deleted}
//! +{inserted}
//! ```
//!
//! with character coordinates in diff-match-patch convention and every
//! segment URI-encoded onto a single line (`\n` becomes `%0A`).
//!
//! # Invariants
//! - Application is exact: a hunk must match at its recorded position.
//! - A patch is only emitted when it is clean, i.e. it round-trips and no hunk
//!   pre-image could be matched anywhere else in the old text.

use super::{CodecError, Result};
use similar::{Algorithm, DiffTag};
use std::fmt::Write as _;

pub const CONTEXT_LINES: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Equal(String),
    Delete(String),
    Insert(String),
}

impl Segment {
    fn prefix(&self) -> char {
        match self {
            Segment::Equal(_) => ' ',
            Segment::Delete(_) => '-',
            Segment::Insert(_) => '+',
        }
    }

    fn text(&self) -> &str {
        match self {
            Segment::Equal(t) | Segment::Delete(t) | Segment::Insert(t) => t,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    pub start1: usize,
    pub len1: usize,
    pub start2: usize,
    pub len2: usize,
    pub segments: Vec<Segment>,
}

impl Hunk {
    /// Text this hunk expects to find in the old file.
    pub fn source(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Insert(_)))
            .map(Segment::text)
            .collect()
    }

    /// Text this hunk leaves behind.
    pub fn target(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Delete(_)))
            .map(Segment::text)
            .collect()
    }

    fn push(&mut self, segment: Segment) {
        if segment.text().is_empty() {
            return;
        }
        match (self.segments.last_mut(), &segment) {
            (Some(Segment::Equal(a)), Segment::Equal(b))
            | (Some(Segment::Delete(a)), Segment::Delete(b))
            | (Some(Segment::Insert(a)), Segment::Insert(b)) => a.push_str(b),
            _ => self.segments.push(segment),
        }
    }
}

/// Computes the hunks that turn `old` into `new`.
pub fn make(old: &str, new: &str) -> Vec<Hunk> {
    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new.split_inclusive('\n').collect();
    let old_offsets = char_offsets(&old_lines);
    let new_offsets = char_offsets(&new_lines);

    let ops = similar::capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);
    let mut hunks = Vec::new();

    for group in similar::group_diff_ops(ops, CONTEXT_LINES) {
        if group.iter().all(|op| op.tag() == DiffTag::Equal) {
            continue;
        }
        let Some(first) = group.first() else { continue };
        let mut hunk = Hunk {
            start1: old_offsets[first.old_range().start],
            len1: 0,
            start2: new_offsets[first.new_range().start],
            len2: 0,
            segments: Vec::new(),
        };

        for op in &group {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            let removed = old_lines[old_range].concat();
            let added = new_lines[new_range].concat();
            match tag {
                DiffTag::Equal => hunk.push(Segment::Equal(removed)),
                DiffTag::Delete => hunk.push(Segment::Delete(removed)),
                DiffTag::Insert => hunk.push(Segment::Insert(added)),
                DiffTag::Replace => {
                    hunk.push(Segment::Delete(removed));
                    hunk.push(Segment::Insert(added));
                }
            }
        }

        hunk.len1 = hunk.source().chars().count();
        hunk.len2 = hunk.target().chars().count();
        hunks.push(hunk);
    }
    hunks
}

fn char_offsets(lines: &[&str]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(lines.len() + 1);
    let mut total = 0;
    offsets.push(0);
    for line in lines {
        total += line.chars().count();
        offsets.push(total);
    }
    offsets
}

/// Serializes hunks to patch text. Returns the text and its line count.
pub fn to_text(hunks: &[Hunk]) -> (String, usize) {
    let mut out = String::new();
    let mut lines = 0;
    for hunk in hunks {
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            coords(hunk.start1, hunk.len1),
            coords(hunk.start2, hunk.len2)
        );
        lines += 1;
        for segment in &hunk.segments {
            out.push(segment.prefix());
            out.push_str(&encode_uri(segment.text()));
            out.push('\n');
            lines += 1;
        }
    }
    (out, lines)
}

fn coords(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, len),
    }
}

fn parse_coords(s: &str) -> Result<(usize, usize)> {
    let bad = || CodecError::DmpSyntax(format!("bad coordinates {s:?}"));
    let number = |n: &str| -> Result<usize> {
        if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        n.parse().map_err(|_| bad())
    };

    match s.split_once(',') {
        None => {
            let start = number(s)?;
            Ok((start.checked_sub(1).ok_or_else(bad)?, 1))
        }
        Some((start, "0")) => Ok((number(start)?, 0)),
        Some((start, len)) => {
            let start = number(start)?;
            Ok((start.checked_sub(1).ok_or_else(bad)?, number(len)?))
        }
    }
}

/// Parses patch text lines back into hunks.
pub fn from_text<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();

    for line in lines {
        let line = line.as_ref();
        if let Some(header) = line.strip_prefix("@@ -") {
            let inner = header
                .strip_suffix(" @@")
                .ok_or_else(|| CodecError::DmpSyntax(format!("bad hunk header {line:?}")))?;
            let (c1, c2) = inner
                .split_once(" +")
                .ok_or_else(|| CodecError::DmpSyntax(format!("bad hunk header {line:?}")))?;
            let (start1, len1) = parse_coords(c1)?;
            let (start2, len2) = parse_coords(c2)?;
            hunks.push(Hunk {
                start1,
                len1,
                start2,
                len2,
                segments: Vec::new(),
            });
            continue;
        }

        let hunk = hunks
            .last_mut()
            .ok_or_else(|| CodecError::DmpSyntax("segment before first hunk header".into()))?;
        let mut chars = line.chars();
        let prefix = chars.next();
        let text = decode_uri(chars.as_str())?;
        let segment = match prefix {
            Some(' ') => Segment::Equal(text),
            Some('-') => Segment::Delete(text),
            Some('+') => Segment::Insert(text),
            _ => return Err(CodecError::DmpSyntax(format!("bad segment line {line:?}"))),
        };
        hunk.segments.push(segment);
    }

    for hunk in &hunks {
        if hunk.source().chars().count() != hunk.len1 || hunk.target().chars().count() != hunk.len2 {
            return Err(CodecError::DmpSyntax(format!(
                "hunk at {} does not match its declared lengths",
                hunk.start1
            )));
        }
    }
    Ok(hunks)
}

/// Applies hunks to `old`. Every hunk must match exactly where it says.
pub fn apply(hunks: &[Hunk], old: &str) -> Result<String> {
    let mut text: Vec<char> = old.chars().collect();
    let mut delta: isize = 0;

    for hunk in hunks {
        let pos = hunk.start1 as isize + delta;
        if pos < 0 || pos as usize != hunk.start2 {
            return Err(CodecError::DmpMismatch { position: hunk.start1 });
        }
        let pos = pos as usize;
        let source: Vec<char> = hunk.source().chars().collect();
        let end = pos + source.len();
        if end > text.len() || text[pos..end] != source[..] {
            return Err(CodecError::DmpMismatch { position: hunk.start1 });
        }
        let target: Vec<char> = hunk.target().chars().collect();
        delta += target.len() as isize - source.len() as isize;
        text.splice(pos..end, target);
    }
    Ok(text.into_iter().collect())
}

/// True when every hunk pre-image is unambiguous in `old`.
fn unambiguous(hunks: &[Hunk], old: &str) -> bool {
    hunks.iter().all(|hunk| {
        let source = hunk.source();
        if source.is_empty() {
            return old.is_empty();
        }
        occurrences(old, &source) == 1
    })
}

fn occurrences(haystack: &str, needle: &str) -> usize {
    let mut count = 0;
    let mut from = 0;
    while let Some(i) = haystack[from..].find(needle) {
        count += 1;
        if count > 1 {
            break;
        }
        // step one char so overlapping matches are seen
        let step = haystack[from + i..].chars().next().map_or(1, char::len_utf8);
        from += i + step;
    }
    count
}

/// Produces a clean patch block from `old` to `new`.
pub fn diff(old: &str, new: &str) -> Result<(String, usize)> {
    let hunks = make(old, new);
    if !unambiguous(&hunks, old) {
        return Err(CodecError::NotClean);
    }
    let (text, lines) = to_text(&hunks);

    let lines_vec: Vec<&str> = text.lines().collect();
    let reparsed = from_text(&lines_vec)?;
    if apply(&reparsed, old)? != new {
        return Err(CodecError::NotClean);
    }
    Ok((text, lines))
}

fn is_uri_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b" -_.!~*'();/?:@&=+$,#".contains(&b)
}

/// `encodeURI` with spaces left as is, the escaping diff-match-patch uses.
pub fn encode_uri(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        if is_uri_safe(b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

pub fn decode_uri(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| CodecError::DmpSyntax(format!("bad escape in {text:?}")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| CodecError::DmpSyntax(format!("escape is not UTF-8 in {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(old: &str, new: &str) {
        let (text, n) = diff(old, new).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), n);
        let hunks = from_text(&lines).unwrap();
        assert_eq!(apply(&hunks, old).unwrap(), new);
    }

    #[test]
    fn test_new_file_is_two_lines() {
        let new = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hello world!\")\n}\n";
        let (text, n) = diff("", new).unwrap();
        assert_eq!(n, 2);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(format!("@@ -0,0 +1,{} @@", new.chars().count()).as_str()));
        assert!(lines
            .next()
            .unwrap()
            .starts_with("+package main%0A%0Aimport %22fmt%22%0A%0Afunc main() %7B%0A%09fmt"));
    }

    #[test]
    fn test_identical_text_has_no_hunks() {
        assert_eq!(diff("a\nb\n", "a\nb\n").unwrap(), (String::new(), 0));
        assert_eq!(diff("", "").unwrap(), (String::new(), 0));
    }

    #[test]
    fn test_roundtrips() {
        roundtrip("", "x");
        roundtrip("x", "");
        roundtrip("a\nb\nc\n", "a\nB\nc\n");
        roundtrip("one\ntwo\nthree\n", "one\ntwo\nthree\nfour");
        roundtrip("no newline", "no newline\n");
        roundtrip("ünïcödé\n100%\n", "ünïcödé\n50% + 50%\n");

        let old: String = (0..40).map(|i| format!("line {i}\n")).collect();
        let new = old.replace("line 5\n", "line five\n").replace("line 30\n", "");
        roundtrip(&old, &new);
    }

    #[test]
    fn test_ambiguous_context_is_not_clean() {
        let old = "a\n".repeat(20);
        let new = format!("{}b\n{}", "a\n".repeat(10), "a\n".repeat(9));
        assert!(matches!(diff(&old, &new), Err(CodecError::NotClean)));
    }

    #[test]
    fn test_apply_rejects_wrong_base() {
        let (text, _) = diff("a\nb\nc\n", "a\nX\nc\n").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let hunks = from_text(&lines).unwrap();
        assert!(matches!(
            apply(&hunks, "a\nY\nc\n"),
            Err(CodecError::DmpMismatch { .. })
        ));
    }

    #[test]
    fn test_coordinates() {
        assert_eq!(coords(0, 0), "0,0");
        assert_eq!(coords(4, 1), "5");
        assert_eq!(coords(4, 7), "5,7");
        assert_eq!(parse_coords("0,0").unwrap(), (0, 0));
        assert_eq!(parse_coords("5").unwrap(), (4, 1));
        assert_eq!(parse_coords("5,7").unwrap(), (4, 7));
        assert!(parse_coords("0").is_err());
        assert!(parse_coords("x,2").is_err());
    }

    #[test]
    fn test_uri_escaping() {
        assert_eq!(encode_uri("a b\n%"), "a b%0A%25");
        assert_eq!(encode_uri("é"), "%C3%A9");
        assert_eq!(decode_uri("a b%0A%25%C3%A9").unwrap(), "a b\n%é");
        assert!(decode_uri("%zz").is_err());
        assert!(decode_uri("%C3").is_err());
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Content codecs for patchfile blocks.
//!
//! | header       | codec                     | min lines | since version |
//! |--------------|---------------------------|-----------|---------------|
//! | `ascii85 N`  | [`ascii85`] whole file     | 1         | 1             |
//! | `dmppatch N` | [`dmp`] line patch         | 0         | 1             |
//! | `utf8file N` | [`utf8file`] passthrough   | 1         | 2             |

pub mod ascii85;
pub mod dmp;
pub mod utf8file;

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("ascii85: {0}")]
    Ascii85(String),

    #[error("dmppatch syntax: {0}")]
    DmpSyntax(String),

    #[error("dmppatch does not apply at character {position}")]
    DmpMismatch { position: usize },

    #[error("line patch is not clean")]
    NotClean,

    #[error("content is not valid UTF-8")]
    NotUtf8,
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Ascii85,
    DmpPatch,
    Utf8File,
}

impl Codec {
    pub fn keyword(self) -> &'static str {
        match self {
            Codec::Ascii85 => "ascii85",
            Codec::DmpPatch => "dmppatch",
            Codec::Utf8File => "utf8file",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "ascii85" => Some(Codec::Ascii85),
            "dmppatch" => Some(Codec::DmpPatch),
            "utf8file" => Some(Codec::Utf8File),
            _ => None,
        }
    }

    pub fn min_lines(self) -> usize {
        match self {
            Codec::DmpPatch => 0,
            Codec::Ascii85 | Codec::Utf8File => 1,
        }
    }

    /// First patchfile version that knows this codec.
    pub fn since_version(self) -> u32 {
        match self {
            Codec::Utf8File => 2,
            Codec::Ascii85 | Codec::DmpPatch => 1,
        }
    }

    /// Decodes a block. `old` is the current file content for diffs and
    /// `None` for additions.
    pub fn apply<S: AsRef<str>>(self, old: Option<&[u8]>, payload: &[S]) -> Result<Vec<u8>> {
        match self {
            Codec::Ascii85 => ascii85::decode(payload),
            Codec::Utf8File => Ok(utf8file::decode(payload).into_bytes()),
            Codec::DmpPatch => {
                let old = match old {
                    Some(bytes) => std::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?,
                    None => "",
                };
                let hunks = dmp::from_text(payload)?;
                Ok(dmp::apply(&hunks, old)?.into_bytes())
            }
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Binary sniff: not UTF-8, or a binary-data control byte in the first 512
/// bytes (the set used by WHATWG MIME sniffing).
pub fn is_binary(data: &[u8]) -> bool {
    if std::str::from_utf8(data).is_err() {
        return true;
    }
    data.iter()
        .take(512)
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F))
}

/// An encoded content block ready to be written after its header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub codec: Codec,
    pub text: String,
    pub lines: usize,
}

impl Block {
    pub fn header(&self) -> String {
        format!("{} {}", self.codec, self.lines)
    }
}

/// Picks and runs the encoder for a change from `old` to `new`.
///
/// Binary content is always ascii85. Text gets a clean line patch; if none
/// exists, version 1 fails with [`CodecError::NotClean`] and later versions
/// fall back to utf8file (or ascii85 when utf8file cannot represent the text).
pub fn encode(version: u32, old: Option<&[u8]>, new: &[u8]) -> Result<Block> {
    let old_is_binary = old.is_some_and(is_binary);
    if old_is_binary || is_binary(new) {
        let (text, lines) = ascii85::encode(new);
        return Ok(Block {
            codec: Codec::Ascii85,
            text,
            lines,
        });
    }

    // both sides passed the sniff, so both are UTF-8
    let old_text = match old {
        Some(bytes) => std::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)?,
        None => "",
    };
    let new_text = std::str::from_utf8(new).map_err(|_| CodecError::NotUtf8)?;

    match dmp::diff(old_text, new_text) {
        Ok((text, lines)) => Ok(Block {
            codec: Codec::DmpPatch,
            text,
            lines,
        }),
        Err(CodecError::NotClean) if version >= Codec::Utf8File.since_version() => {
            if let Some((text, lines)) = utf8file::encode(new_text) {
                return Ok(Block {
                    codec: Codec::Utf8File,
                    text,
                    lines,
                });
            }
            let (text, lines) = ascii85::encode(new);
            Ok(Block {
                codec: Codec::Ascii85,
                text,
                lines,
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(block: &Block) -> Vec<String> {
        block.text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_binary_sniff() {
        assert!(!is_binary(b"plain text\n"));
        assert!(!is_binary("ünïcödé\n".as_bytes()));
        assert!(!is_binary(b""));
        assert!(is_binary(b"\x00\x01\x02"));
        assert!(is_binary(&[0xff, 0xfe, 0x41]));
        assert!(!is_binary(b"tabs\tand\r\nnewlines\x0c"));
    }

    #[test]
    fn test_codec_policy() {
        let block = encode(1, None, b"hello\n").unwrap();
        assert_eq!(block.codec, Codec::DmpPatch);

        let block = encode(1, Some(b"text\n"), b"\x00binary").unwrap();
        assert_eq!(block.codec, Codec::Ascii85);

        let ambiguous_old = "a\n".repeat(20);
        let ambiguous_new = format!("{}b\n{}", "a\n".repeat(10), "a\n".repeat(9));
        assert_eq!(
            encode(1, Some(ambiguous_old.as_bytes()), ambiguous_new.as_bytes()),
            Err(CodecError::NotClean)
        );
        let block = encode(2, Some(ambiguous_old.as_bytes()), ambiguous_new.as_bytes()).unwrap();
        assert_eq!(block.codec, Codec::Utf8File);
        assert_eq!(block.header(), "utf8file 20");
    }

    #[test]
    fn test_apply_inverts_encode() {
        let cases: [(Option<&[u8]>, &[u8]); 4] = [
            (None, b"fresh file\n"),
            (Some(b"one\ntwo\n"), b"one\n2\n"),
            (Some(b"\x00\x01"), b""),
            (None, b"\x89PNG\r\n\x1a\n"),
        ];
        for (old, new) in cases {
            let block = encode(2, old, new).unwrap();
            assert!(block.lines >= block.codec.min_lines());
            assert_eq!(block.codec.apply(old, &payload(&block)).unwrap(), new);
        }
    }
}

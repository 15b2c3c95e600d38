// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Binary-safe whole-file encoding.
//!
//! Adobe ascii85 alphabet (`!`..`u`), `z` for an all-zero group of four bytes,
//! no `<~ ~>` delimiters. Output is wrapped at 80 characters per line.

use super::{CodecError, Result};

pub const LINE_WIDTH: usize = 80;

/// Encodes `data`, returning the block text (newline terminated) and its line
/// count. Empty input is a single empty line.
pub fn encode(data: &[u8]) -> (String, usize) {
    let mut flat = String::with_capacity(data.len() * 5 / 4 + 5);

    for chunk in data.chunks(4) {
        let mut group = [0u8; 4];
        group[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(group);

        if chunk.len() == 4 && value == 0 {
            flat.push('z');
            continue;
        }

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 85) as u8 + b'!';
            value /= 85;
        }
        for &d in &digits[..chunk.len() + 1] {
            flat.push(d as char);
        }
    }

    if flat.is_empty() {
        return ("\n".to_string(), 1);
    }

    let mut out = String::with_capacity(flat.len() + flat.len() / LINE_WIDTH + 1);
    let mut lines = 0;
    // the alphabet is ASCII, so byte chunks are char chunks
    for line in flat.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(line).unwrap_or_default());
        out.push('\n');
        lines += 1;
    }
    (out, lines)
}

/// Decodes the payload lines of an `ascii85` block.
pub fn decode<S: AsRef<str>>(lines: &[S]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut filled = 0;

    for line in lines {
        for c in line.as_ref().bytes() {
            match c {
                b'z' if filled == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => return Err(CodecError::Ascii85("'z' inside a group".into())),
                b'!'..=b'u' => {
                    group[filled] = c - b'!';
                    filled += 1;
                    if filled == 5 {
                        out.extend_from_slice(&decode_group(&group)?);
                        filled = 0;
                    }
                }
                b' ' | b'\t' | b'\r' | b'\n' => {}
                other => {
                    return Err(CodecError::Ascii85(format!("illegal character {:?}", other as char)))
                }
            }
        }
    }

    match filled {
        0 => {}
        1 => return Err(CodecError::Ascii85("truncated final group".into())),
        n => {
            for slot in group.iter_mut().skip(n) {
                *slot = b'u' - b'!';
            }
            let bytes = decode_group(&group)?;
            out.extend_from_slice(&bytes[..n - 1]);
        }
    }
    Ok(out)
}

fn decode_group(group: &[u8; 5]) -> Result<[u8; 4]> {
    let mut value: u64 = 0;
    for &digit in group {
        value = value * 85 + u64::from(digit);
    }
    let value = u32::try_from(value).map_err(|_| CodecError::Ascii85("group overflow".into()))?;
    Ok(value.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn test_known_vector() {
        let (text, n) = encode(b"Man is");
        assert_eq!(text, "9jqo^Bla\n");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_zero_group_shorthand() {
        let (text, _) = encode(&[0, 0, 0, 0, 1]);
        assert!(text.starts_with('z'));
        assert_eq!(decode(&lines(&text)).unwrap(), vec![0, 0, 0, 0, 1]);

        // a partial zero group is not abbreviated
        let (text, _) = encode(&[0, 0]);
        assert_eq!(text, "!!!\n");
    }

    #[test]
    fn test_roundtrip_all_lengths() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for len in [0, 1, 2, 3, 4, 5, 63, 64, 65, 257, 1000] {
            let (text, n) = encode(&data[..len]);
            assert_eq!(n, text.matches('\n').count());
            assert!(text.lines().all(|l| l.len() <= LINE_WIDTH));
            assert_eq!(decode(&lines(&text)).unwrap(), &data[..len]);
        }
    }

    #[test]
    fn test_empty_input_is_one_line() {
        let (text, n) = encode(b"");
        assert_eq!((text.as_str(), n), ("\n", 1));
        assert!(decode(&[""]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(&["abc~"]).is_err());
        assert!(decode(&["!"]).is_err());
        assert!(decode(&["!!z"]).is_err());
        assert!(decode(&["uuuuu"]).is_err());
    }
}

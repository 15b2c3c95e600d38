// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Raw UTF-8 passthrough: the new file verbatim as a counted line block.

/// Encodes `text` if it can be represented: non-empty and newline terminated.
pub fn encode(text: &str) -> Option<(String, usize)> {
    if text.is_empty() || !text.ends_with('\n') {
        return None;
    }
    Some((text.to_string(), text.matches('\n').count()))
}

/// Rebuilds the file from its payload lines (terminators stripped).
pub fn decode<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Hashchain links and their frozen text grammar.
//!
//! ```text
//! previous_hex rfc3339_utc cstart pubkey nonce signature [comment]
//! previous_hex rfc3339_utc source tree_hash pubkey signature [comment]
//! previous_hex rfc3339_utc signtr entry_hash pubkey signature
//! previous_hex rfc3339_utc addkey weight pubkey signature [comment]
//! previous_hex rfc3339_utc remkey pubkey
//! previous_hex rfc3339_utc sigctl m
//! ```
//!
//! Keys, nonces and signatures are URL-safe base64 without padding; hashes are
//! lowercase hex. A comment is the remainder of the line.
//!
//! # Invariants
//! - `Link::to_string` and `Link::from_str` are inverse. Parsing rejects any
//!   line that does not re-serialize to exactly the same bytes.
//! - The link hash is SHA-256 over the canonical line without its newline.

use super::keys::{self, KeyError, Nonce};
use crate::hash::{Hash, HashError};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkParseError {
    #[error("missing fields")]
    MissingFields,

    #[error("unexpected trailing fields")]
    TrailingFields,

    #[error("unknown link kind {0:?}")]
    UnknownKind(String),

    #[error("bad timestamp {0:?}")]
    Timestamp(String),

    #[error("bad number {0:?}")]
    Number(String),

    #[error("comment contains a line break")]
    Comment,

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("line is not in canonical form")]
    NotCanonical,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkKind {
    ChainStart {
        pubkey: VerifyingKey,
        nonce: Nonce,
        signature: Signature,
        comment: String,
    },
    Source {
        tree_hash: Hash,
        pubkey: VerifyingKey,
        signature: Signature,
        comment: String,
    },
    Signature {
        entry_hash: Hash,
        pubkey: VerifyingKey,
        signature: Signature,
    },
    AddKey {
        weight: u32,
        pubkey: VerifyingKey,
        signature: Signature,
        comment: String,
    },
    RemoveKey {
        pubkey: VerifyingKey,
    },
    SignatureControl {
        m: u32,
    },
}

impl LinkKind {
    pub fn name(&self) -> &'static str {
        match self {
            LinkKind::ChainStart { .. } => "cstart",
            LinkKind::Source { .. } => "source",
            LinkKind::Signature { .. } => "signtr",
            LinkKind::AddKey { .. } => "addkey",
            LinkKind::RemoveKey { .. } => "remkey",
            LinkKind::SignatureControl { .. } => "sigctl",
        }
    }

    pub fn chain_start(key: &SigningKey, nonce: Nonce, comment: &str) -> Self {
        let pubkey = key.verifying_key();
        let signature = key.sign(&chain_start_message(&pubkey, &nonce, comment));
        LinkKind::ChainStart {
            pubkey,
            nonce,
            signature,
            comment: comment.to_string(),
        }
    }

    pub fn source(key: &SigningKey, tree_hash: Hash, comment: &str) -> Self {
        LinkKind::Source {
            tree_hash,
            pubkey: key.verifying_key(),
            signature: key.sign(&source_message(&tree_hash, comment)),
            comment: comment.to_string(),
        }
    }

    pub fn signature(key: &SigningKey, entry_hash: Hash) -> Self {
        LinkKind::Signature {
            entry_hash,
            pubkey: key.verifying_key(),
            signature: key.sign(entry_hash.as_bytes()),
        }
    }

    /// `addkey` is signed by the key being added.
    pub fn add_key(key: &SigningKey, weight: u32, comment: &str) -> Self {
        let pubkey = key.verifying_key();
        LinkKind::AddKey {
            weight,
            pubkey,
            signature: key.sign(&add_key_message(&pubkey, comment)),
            comment: comment.to_string(),
        }
    }

    /// Checks the embedded signature. Kinds without one always pass.
    pub fn verify_signature(&self) -> bool {
        match self {
            LinkKind::ChainStart {
                pubkey,
                nonce,
                signature,
                comment,
            } => pubkey
                .verify(&chain_start_message(pubkey, nonce, comment), signature)
                .is_ok(),
            LinkKind::Source {
                tree_hash,
                pubkey,
                signature,
                comment,
            } => pubkey
                .verify(&source_message(tree_hash, comment), signature)
                .is_ok(),
            LinkKind::Signature {
                entry_hash,
                pubkey,
                signature,
            } => pubkey.verify(entry_hash.as_bytes(), signature).is_ok(),
            LinkKind::AddKey {
                pubkey,
                signature,
                comment,
                ..
            } => pubkey
                .verify(&add_key_message(pubkey, comment), signature)
                .is_ok(),
            LinkKind::RemoveKey { .. } | LinkKind::SignatureControl { .. } => true,
        }
    }
}

fn chain_start_message(pubkey: &VerifyingKey, nonce: &Nonce, comment: &str) -> Vec<u8> {
    [pubkey.as_bytes().as_slice(), nonce.as_slice(), comment.as_bytes()].concat()
}

fn source_message(tree_hash: &Hash, comment: &str) -> Vec<u8> {
    [tree_hash.as_bytes().as_slice(), comment.as_bytes()].concat()
}

fn add_key_message(pubkey: &VerifyingKey, comment: &str) -> Vec<u8> {
    [pubkey.as_bytes().as_slice(), comment.as_bytes()].concat()
}

/// One immutable hashchain entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub previous: Hash,
    pub time: DateTime<Utc>,
    pub kind: LinkKind,
}

impl Link {
    /// Builds a link, dropping sub-second precision from `time`.
    pub fn new(previous: Hash, time: DateTime<Utc>, kind: LinkKind) -> Self {
        let time = DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time);
        Self {
            previous,
            time,
            kind,
        }
    }

    pub fn hash(&self) -> Hash {
        Hash::digest(self.to_string().as_bytes())
    }

    /// Unix seconds.
    pub fn timestamp(&self) -> i64 {
        self.time.timestamp()
    }
}

fn write_comment(f: &mut fmt::Formatter<'_>, comment: &str) -> fmt::Result {
    if comment.is_empty() {
        Ok(())
    } else {
        write!(f, " {comment}")
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.previous,
            self.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.kind.name()
        )?;
        match &self.kind {
            LinkKind::ChainStart {
                pubkey,
                nonce,
                signature,
                comment,
            } => {
                write!(
                    f,
                    " {} {} {}",
                    keys::key_id(pubkey),
                    keys::encode(nonce),
                    keys::encode(&signature.to_bytes())
                )?;
                write_comment(f, comment)
            }
            LinkKind::Source {
                tree_hash,
                pubkey,
                signature,
                comment,
            } => {
                write!(
                    f,
                    " {} {} {}",
                    tree_hash,
                    keys::key_id(pubkey),
                    keys::encode(&signature.to_bytes())
                )?;
                write_comment(f, comment)
            }
            LinkKind::Signature {
                entry_hash,
                pubkey,
                signature,
            } => write!(
                f,
                " {} {} {}",
                entry_hash,
                keys::key_id(pubkey),
                keys::encode(&signature.to_bytes())
            ),
            LinkKind::AddKey {
                weight,
                pubkey,
                signature,
                comment,
            } => {
                write!(
                    f,
                    " {} {} {}",
                    weight,
                    keys::key_id(pubkey),
                    keys::encode(&signature.to_bytes())
                )?;
                write_comment(f, comment)
            }
            LinkKind::RemoveKey { pubkey } => write!(f, " {}", keys::key_id(pubkey)),
            LinkKind::SignatureControl { m } => write!(f, " {m}"),
        }
    }
}

fn number(s: &str) -> Result<u32, LinkParseError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LinkParseError::Number(s.to_string()));
    }
    s.parse().map_err(|_| LinkParseError::Number(s.to_string()))
}

/// Splits `rest` into exactly `N` fields plus an optional trailing comment.
fn fields<const N: usize>(rest: &str, comment: bool) -> Result<([&str; N], String), LinkParseError> {
    let limit = if comment { N + 1 } else { N };
    let mut parts = rest.splitn(limit, ' ');
    let mut out = [""; N];
    for slot in out.iter_mut() {
        *slot = parts.next().ok_or(LinkParseError::MissingFields)?;
    }
    let tail = parts.next();
    if !comment && rest.split(' ').count() != N {
        return Err(LinkParseError::TrailingFields);
    }
    Ok((out, tail.unwrap_or_default().to_string()))
}

impl FromStr for Link {
    type Err = LinkParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line.contains('\n') {
            return Err(LinkParseError::Comment);
        }
        let mut head = line.splitn(4, ' ');
        let (Some(previous), Some(time), Some(kind), Some(rest)) =
            (head.next(), head.next(), head.next(), head.next())
        else {
            return Err(LinkParseError::MissingFields);
        };

        let previous = Hash::from_hex(previous)?;
        let time = DateTime::parse_from_rfc3339(time)
            .map_err(|_| LinkParseError::Timestamp(time.to_string()))?
            .with_timezone(&Utc);

        let kind = match kind {
            "cstart" => {
                let ([pubkey, nonce, signature], comment) = fields::<3>(rest, true)?;
                LinkKind::ChainStart {
                    pubkey: keys::decode_public_key(pubkey)?,
                    nonce: keys::decode_nonce(nonce)?,
                    signature: keys::decode_signature(signature)?,
                    comment,
                }
            }
            "source" => {
                let ([tree_hash, pubkey, signature], comment) = fields::<3>(rest, true)?;
                LinkKind::Source {
                    tree_hash: Hash::from_hex(tree_hash)?,
                    pubkey: keys::decode_public_key(pubkey)?,
                    signature: keys::decode_signature(signature)?,
                    comment,
                }
            }
            "signtr" => {
                let ([entry_hash, pubkey, signature], _) = fields::<3>(rest, false)?;
                LinkKind::Signature {
                    entry_hash: Hash::from_hex(entry_hash)?,
                    pubkey: keys::decode_public_key(pubkey)?,
                    signature: keys::decode_signature(signature)?,
                }
            }
            "addkey" => {
                let ([weight, pubkey, signature], comment) = fields::<3>(rest, true)?;
                LinkKind::AddKey {
                    weight: number(weight)?,
                    pubkey: keys::decode_public_key(pubkey)?,
                    signature: keys::decode_signature(signature)?,
                    comment,
                }
            }
            "remkey" => {
                let ([pubkey], _) = fields::<1>(rest, false)?;
                LinkKind::RemoveKey {
                    pubkey: keys::decode_public_key(pubkey)?,
                }
            }
            "sigctl" => {
                let ([m], _) = fields::<1>(rest, false)?;
                LinkKind::SignatureControl { m: number(m)? }
            }
            other => return Err(LinkParseError::UnknownKind(other.to_string())),
        };

        let link = Link {
            previous,
            time,
            kind,
        };
        if link.to_string() != line {
            return Err(LinkParseError::NotCanonical);
        }
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::EMPTY_HASH;
    use chrono::TimeZone;

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_text_form() {
        let key = keys::generate_key();
        let nonce = [7u8; 24];
        let link = Link::new(EMPTY_HASH, time(), LinkKind::chain_start(&key, nonce, "release key"));
        let text = link.to_string();

        let fields: Vec<&str> = text.split(' ').collect();
        assert_eq!(fields[0], EMPTY_HASH.to_hex());
        assert_eq!(fields[1], "2024-05-01T12:30:00Z");
        assert_eq!(fields[2], "cstart");
        assert_eq!(fields[4], keys::encode(&nonce));
        assert!(text.ends_with(" release key"));

        assert_eq!(text.parse::<Link>().unwrap(), link);
        assert_eq!(link.hash(), Hash::digest(text.as_bytes()));
    }

    #[test]
    fn test_all_kinds_parse_back() {
        let key = keys::generate_key();
        let kinds = vec![
            LinkKind::source(&key, Hash::digest(b"tree"), ""),
            LinkKind::source(&key, Hash::digest(b"tree"), "v1.0  with spaces"),
            LinkKind::signature(&key, Hash::digest(b"entry")),
            LinkKind::add_key(&key, 3, "bob"),
            LinkKind::RemoveKey {
                pubkey: key.verifying_key(),
            },
            LinkKind::SignatureControl { m: 2 },
        ];
        for kind in kinds {
            let link = Link::new(Hash::digest(b"prev"), time(), kind);
            assert!(link.kind.verify_signature());
            assert_eq!(link.to_string().parse::<Link>().unwrap(), link);
        }
    }

    #[test]
    fn test_non_canonical_lines_are_rejected() {
        let link = Link::new(EMPTY_HASH, time(), LinkKind::SignatureControl { m: 2 });
        let text = link.to_string();

        let offset = text.replace("12:30:00Z", "12:30:00+00:00");
        assert_eq!(offset.parse::<Link>(), Err(LinkParseError::NotCanonical));

        let padded = text.replace("sigctl 2", "sigctl 02");
        assert_eq!(padded.parse::<Link>(), Err(LinkParseError::NotCanonical));

        let trailing = format!("{text} extra");
        assert_eq!(trailing.parse::<Link>(), Err(LinkParseError::TrailingFields));

        let upper = text.replacen('e', "E", 1);
        assert!(matches!(upper.parse::<Link>(), Err(LinkParseError::Hash(_))));

        let unknown = text.replace("sigctl", "sigctx");
        assert_eq!(
            unknown.parse::<Link>(),
            Err(LinkParseError::UnknownKind("sigctx".into()))
        );
    }

    #[test]
    fn test_tampered_comment_breaks_signature() {
        let key = keys::generate_key();
        let link = Link::new(EMPTY_HASH, time(), LinkKind::source(&key, EMPTY_HASH, "good"));
        let tampered: Link = link.to_string().replace(" good", " evil").parse().unwrap();
        assert!(!tampered.kind.verify_signature());
    }
}

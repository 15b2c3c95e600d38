// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Hashchain files and the locked session that appends to them.

use super::error::{io_err, ChainError, Result};
use super::keys;
use super::link::{Link, LinkKind, LinkParseError};
use super::state::ChainState;
use crate::hash::{Hash, EMPTY_HASH};
use crate::lockfile::LockFile;
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Parses hashchain text. Every line must be `'\n'` terminated.
pub fn parse_links(text: &str) -> Result<Vec<Link>> {
    let mut links = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let line = links.len();
        let Some((entry, tail)) = rest.split_once('\n') else {
            return Err(ChainError::Parse {
                line,
                source: LinkParseError::MissingFields,
            });
        };
        let link = entry
            .parse::<Link>()
            .map_err(|source| ChainError::Parse { line, source })?;
        links.push(link);
        rest = tail;
    }
    Ok(links)
}

/// Reads and parses a hashchain file without locking or verifying it.
pub fn read_links(path: &Path) -> Result<Vec<Link>> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    parse_links(&text)
}

/// Reads a hashchain file and verifies it from scratch.
pub fn verify_file(path: &Path) -> Result<(Vec<Link>, ChainState)> {
    let links = read_links(path)?;
    if links.is_empty() {
        return Err(ChainError::Empty(path.to_path_buf()));
    }
    let state = ChainState::replay(&links)?;
    Ok((links, state))
}

/// A signature on a chain entry made away from the chain, to be appended by
/// whoever holds the chain. Text form: `entry_hash pubkey signature`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachedSignature {
    pub entry_hash: Hash,
    pub pubkey: VerifyingKey,
    pub signature: Signature,
}

impl DetachedSignature {
    pub fn sign(key: &SigningKey, entry_hash: Hash) -> Self {
        Self {
            entry_hash,
            pubkey: key.verifying_key(),
            signature: key.sign(entry_hash.as_bytes()),
        }
    }

    pub fn verify(&self) -> bool {
        self.pubkey.verify(self.entry_hash.as_bytes(), &self.signature).is_ok()
    }
}

impl fmt::Display for DetachedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.entry_hash,
            keys::key_id(&self.pubkey),
            keys::encode(&self.signature.to_bytes())
        )
    }
}

impl FromStr for DetachedSignature {
    type Err = LinkParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim_end().split(' ').collect();
        let [entry_hash, pubkey, signature] = fields.as_slice() else {
            return Err(LinkParseError::MissingFields);
        };
        Ok(Self {
            entry_hash: Hash::from_hex(entry_hash)?,
            pubkey: keys::decode_public_key(pubkey)?,
            signature: keys::decode_signature(signature)?,
        })
    }
}

/// An open, locked hashchain.
///
/// Mutations build the next link, check it against a copy of the current
/// state, append and sync the line, and only then commit the new state. A
/// rejected link leaves both the file and the session unchanged.
pub struct HashChain {
    path: PathBuf,
    file: File,
    links: Vec<Link>,
    state: ChainState,
    _lock: LockFile,
}

impl HashChain {
    /// Creates a new chain at `path`, which must not exist yet.
    pub fn start(path: &Path, key: &SigningKey, comment: &str) -> Result<Self> {
        let lock = LockFile::acquire(path)?;
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(path)
            .map_err(io_err(path))?;

        let mut chain = HashChain {
            path: path.to_path_buf(),
            file,
            links: Vec::new(),
            state: ChainState::default(),
            _lock: lock,
        };
        let nonce = keys::generate_nonce();
        chain.append(LinkKind::chain_start(key, nonce, comment))?;
        tracing::info!("Started hashchain {:?}", path);
        Ok(chain)
    }

    /// Locks, reads and fully verifies the chain at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let lock = LockFile::acquire(path)?;
        let (links, state) = verify_file(path)?;
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(io_err(path))?;
        tracing::debug!("Opened hashchain {:?} with {} lines", path, links.len());
        Ok(HashChain {
            path: path.to_path_buf(),
            file,
            links,
            state,
            _lock: lock,
        })
    }

    /// Releases the lock.
    pub fn close(self) {}

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn head(&self) -> Hash {
        self.state.head().unwrap_or(EMPTY_HASH)
    }

    pub fn add_key(&mut self, key: &SigningKey, weight: u32, comment: &str) -> Result<&Link> {
        self.append(LinkKind::add_key(key, weight, comment))
    }

    pub fn remove_key(&mut self, pubkey: VerifyingKey) -> Result<&Link> {
        self.append(LinkKind::RemoveKey { pubkey })
    }

    pub fn signature_control(&mut self, m: u32) -> Result<&Link> {
        self.append(LinkKind::SignatureControl { m })
    }

    /// Publishes `tree_hash` as the next source state.
    pub fn source(&mut self, tree_hash: Hash, key: &SigningKey, comment: &str) -> Result<&Link> {
        self.append(LinkKind::source(key, tree_hash, comment))
    }

    /// Signs the entry on `line` and everything before it.
    pub fn sign(&mut self, line: usize, key: &SigningKey) -> Result<&Link> {
        let entry_hash = self.state.link_hash(line).ok_or(ChainError::LineOutOfRange(line))?;
        self.append(LinkKind::signature(key, entry_hash))
    }

    /// Signature on `line` for another party to append.
    pub fn detached_signature(&self, line: usize, key: &SigningKey) -> Result<DetachedSignature> {
        let entry_hash = self.state.link_hash(line).ok_or(ChainError::LineOutOfRange(line))?;
        Ok(DetachedSignature::sign(key, entry_hash))
    }

    pub fn add_detached_signature(&mut self, detached: &DetachedSignature) -> Result<&Link> {
        self.append(LinkKind::Signature {
            entry_hash: detached.entry_hash,
            pubkey: detached.pubkey,
            signature: detached.signature,
        })
    }

    fn append(&mut self, kind: LinkKind) -> Result<&Link> {
        let link = Link::new(self.head(), Utc::now(), kind);
        let line = self.links.len();
        // comments must survive a write and re-read unchanged
        match link.to_string().parse::<Link>() {
            Ok(parsed) if parsed == link => {}
            Ok(_) => {
                return Err(ChainError::Parse {
                    line,
                    source: LinkParseError::NotCanonical,
                })
            }
            Err(source) => return Err(ChainError::Parse { line, source }),
        }
        let state = self.state.clone().apply_link(&link)?;
        self.commit(link, state)
    }

    /// Writes an already verified link and adopts `state`.
    pub(super) fn commit(&mut self, link: Link, state: ChainState) -> Result<&Link> {
        writeln!(self.file, "{link}").map_err(io_err(&self.path))?;
        self.file.sync_all().map_err(io_err(&self.path))?;

        tracing::info!(
            "Appended line {} ({}) to {:?}",
            self.links.len(),
            link.kind.name(),
            self.path
        );
        self.state = state;
        self.links.push(link);
        Ok(&self.links[self.links.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_start_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashchain");
        let key = keys::generate_key();

        let mut chain = HashChain::start(&path, &key, "creator").unwrap();
        let tree = Hash::digest(b"tree");
        chain.source(tree, &key, "first").unwrap();
        assert!(matches!(HashChain::open(&path), Err(ChainError::Lock(_))));
        chain.close();

        let chain = HashChain::open(&path).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.state().tree_hashes(), vec![EMPTY_HASH, tree]);
        assert_eq!(chain.state().last_signed_tree_hash(), tree);
        let id = keys::key_id(&key.verifying_key());
        assert_eq!(chain.state().signer_comment(&id), Some("creator"));
    }

    #[test]
    fn test_start_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashchain");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            HashChain::start(&path, &keys::generate_key(), ""),
            Err(ChainError::Io { .. })
        ));
        assert!(!LockFile::path_for(&path).exists());
    }

    #[test]
    fn test_rejected_link_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashchain");
        let key = keys::generate_key();
        let mut chain = HashChain::start(&path, &key, "").unwrap();
        let before = fs::read(&path).unwrap();

        assert!(matches!(
            chain.signature_control(2),
            Err(ChainError::MLargerThanN { .. })
        ));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(chain.len(), 1);

        assert!(matches!(
            chain.source(Hash::digest(b"tree"), &key, "two\nlines"),
            Err(ChainError::Parse {
                line: 1,
                source: LinkParseError::Comment
            })
        ));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_detached_signature() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashchain");
        let owner = keys::generate_key();
        let other = keys::generate_key();

        let mut chain = HashChain::start(&path, &owner, "").unwrap();
        chain.add_key(&other, 1, "other").unwrap();
        chain.signature_control(2).unwrap();
        chain.sign(2, &owner).unwrap();
        chain.source(Hash::digest(b"tree"), &owner, "").unwrap();
        assert_eq!(chain.state().signed_line(), 2);

        let detached = chain.detached_signature(4, &other).unwrap();
        let text = detached.to_string();
        let parsed: DetachedSignature = text.parse().unwrap();
        assert!(parsed.verify());
        chain.add_detached_signature(&parsed).unwrap();
        assert_eq!(chain.state().signed_line(), 4);

        assert!(matches!(
            chain.detached_signature(99, &other),
            Err(ChainError::LineOutOfRange(99))
        ));
    }

    #[test]
    fn test_parse_requires_line_terminator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashchain");
        let key = keys::generate_key();
        HashChain::start(&path, &key, "").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(parse_links(&text).unwrap().len(), 1);
        assert!(matches!(
            parse_links(text.trim_end()),
            Err(ChainError::Parse { line: 0, .. })
        ));
        assert!(parse_links("").unwrap().is_empty());
    }
}

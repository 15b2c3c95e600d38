// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chain state derived by replaying links.
//!
//! The state keeps two views of the signer configuration:
//!
//! - the **head view** (`m`, `n`, signers) reflects every configuration link
//!   appended so far and is what new configuration links are checked against;
//! - the **signed view** only includes configuration links that are inside the
//!   signed boundary, and is what decides whether a signature counts.
//!
//! Every signer has an approval mark: the highest line it has approved, either
//! by publishing a `source` on that line or by a `signtr` on that line's hash.
//! The signed boundary is the highest line whose approving signed weight
//! reaches the signed threshold.
//!
//! # Invariants
//! - `1 <= m <= n` in both views once line 0 is applied.
//! - The signed boundary never moves backwards.
//! - `apply_link` either returns the successor state or an error; the input
//!   state is consumed either way and callers keep a clone when they need one.

use super::error::{ChainError, Result};
use super::keys;
use super::link::{Link, LinkKind};
use crate::hash::{Hash, EMPTY_HASH};
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// A signer in the head view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Signer {
    pub pubkey: String,
    pub weight: u32,
    pub comment: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ConfigOp {
    Add { pubkey: String, weight: u32 },
    Remove { pubkey: String },
    Threshold(u32),
}

#[derive(Clone, Debug, Default)]
pub struct ChainState {
    hashes: Vec<Hash>,
    index: FxHashMap<Hash, usize>,
    last_time: Option<DateTime<Utc>>,

    m: u32,
    n: u32,
    signers: BTreeMap<String, Signer>,

    signed_m: u32,
    signed_weights: BTreeMap<String, u32>,
    pending: Vec<(usize, ConfigOp)>,
    marks: BTreeMap<String, usize>,
    signed_line: usize,

    sources: Vec<(usize, Hash)>,
}

impl ChainState {
    /// Replays `links` from scratch.
    pub fn replay(links: &[Link]) -> Result<Self> {
        links
            .iter()
            .try_fold(ChainState::default(), |state, link| state.apply_link(link))
    }

    /// Verifies `link` as the next line and returns the resulting state.
    pub fn apply_link(mut self, link: &Link) -> Result<Self> {
        let line = self.hashes.len();
        let previous = self.hashes.last().copied().unwrap_or(EMPTY_HASH);

        if link.previous != previous {
            return Err(ChainError::LinkBroken { line });
        }
        if self.last_time.is_some_and(|t| link.time < t) {
            return Err(ChainError::DescendingTime { line });
        }
        match (&link.kind, line) {
            (LinkKind::ChainStart { .. }, 0) => {}
            (LinkKind::ChainStart { .. }, _) => return Err(ChainError::IllegalChainStart { line }),
            (_, 0) => return Err(ChainError::MustStartWithChainStart),
            _ => {}
        }
        if !link.kind.verify_signature() {
            return Err(ChainError::InvalidSignature { line });
        }

        match &link.kind {
            LinkKind::ChainStart { pubkey, comment, .. } => {
                let id = keys::key_id(pubkey);
                self.signers.insert(
                    id.clone(),
                    Signer {
                        pubkey: id.clone(),
                        weight: 1,
                        comment: comment.clone(),
                    },
                );
                self.m = 1;
                self.n = 1;
                self.signed_weights.insert(id.clone(), 1);
                self.signed_m = 1;
                self.marks.insert(id, 0);
                self.signed_line = 0;
            }

            LinkKind::Source {
                tree_hash, pubkey, ..
            } => {
                let id = self.signed_signer(pubkey, line)?;
                self.sources.push((line, *tree_hash));
                self.marks.insert(id, line);
            }

            LinkKind::Signature {
                entry_hash, pubkey, ..
            } => {
                let target = *self.index.get(entry_hash).ok_or(ChainError::UnknownEntry {
                    line,
                    hash: *entry_hash,
                })?;
                let id = self.signed_signer(pubkey, line)?;
                if self.marks.get(&id).is_some_and(|&mark| mark >= target) {
                    return Err(ChainError::RedundantSignature { line, pubkey: id });
                }
                self.marks.insert(id, target);
            }

            LinkKind::AddKey {
                weight,
                pubkey,
                comment,
                ..
            } => {
                if *weight == 0 {
                    return Err(ChainError::WeightNonPositive { line });
                }
                let id = keys::key_id(pubkey);
                if self.signers.contains_key(&id) {
                    return Err(ChainError::DuplicateSigner { line, pubkey: id });
                }
                self.n = self
                    .n
                    .checked_add(*weight)
                    .ok_or(ChainError::WeightOverflow { line })?;
                self.signers.insert(
                    id.clone(),
                    Signer {
                        pubkey: id.clone(),
                        weight: *weight,
                        comment: comment.clone(),
                    },
                );
                self.pending.push((
                    line,
                    ConfigOp::Add {
                        pubkey: id,
                        weight: *weight,
                    },
                ));
            }

            LinkKind::RemoveKey { pubkey } => {
                let id = keys::key_id(pubkey);
                let weight = match self.signers.get(&id) {
                    Some(signer) => signer.weight,
                    None => return Err(ChainError::UnknownSigner { line, pubkey: id }),
                };
                let n = self.n.saturating_sub(weight);
                if n < self.m {
                    return Err(ChainError::MLargerThanN { line, m: self.m, n });
                }
                self.n = n;
                self.signers.remove(&id);
                self.pending.push((line, ConfigOp::Remove { pubkey: id }));
            }

            LinkKind::SignatureControl { m } => {
                if *m == 0 {
                    return Err(ChainError::SignatureThresholdNonPositive { line });
                }
                if *m > self.n {
                    return Err(ChainError::MLargerThanN {
                        line,
                        m: *m,
                        n: self.n,
                    });
                }
                self.m = *m;
                self.pending.push((line, ConfigOp::Threshold(*m)));
            }
        }

        let hash = link.hash();
        self.hashes.push(hash);
        self.index.insert(hash, line);
        self.last_time = Some(link.time);
        self.advance_signed();
        tracing::debug!("Applied line {} ({}), signed up to {}", line, link.kind.name(), self.signed_line);
        Ok(self)
    }

    /// Signer id of `pubkey` if it may sign under the signed view.
    fn signed_signer(&self, pubkey: &VerifyingKey, line: usize) -> Result<String> {
        let id = keys::key_id(pubkey);
        if !self.signed_weights.contains_key(&id) {
            return Err(ChainError::UnknownSigner { line, pubkey: id });
        }
        Ok(id)
    }

    /// Moves the signed boundary forward and folds newly signed configuration
    /// links into the signed view until nothing changes.
    fn advance_signed(&mut self) {
        loop {
            self.signed_line = self.signed_line.max(self.boundary());

            let ready = self
                .pending
                .iter()
                .take_while(|(line, _)| *line <= self.signed_line)
                .count();
            if ready == 0 {
                return;
            }
            for (_, op) in self.pending.drain(..ready) {
                match op {
                    ConfigOp::Add { pubkey, weight } => {
                        self.signed_weights.insert(pubkey, weight);
                    }
                    ConfigOp::Remove { pubkey } => {
                        self.signed_weights.remove(&pubkey);
                    }
                    ConfigOp::Threshold(m) => self.signed_m = m,
                }
            }
        }
    }

    /// Highest line approved by at least `signed_m` signed weight.
    fn boundary(&self) -> usize {
        let mut approvals: Vec<(usize, u32)> = self
            .signed_weights
            .iter()
            .filter_map(|(id, &weight)| self.marks.get(id).map(|&mark| (mark, weight)))
            .collect();
        approvals.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        let mut total: u32 = 0;
        for (mark, weight) in approvals {
            total = total.saturating_add(weight);
            if total >= self.signed_m {
                return mark;
            }
        }
        0
    }

    /// Number of lines applied.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Hash of the last line.
    pub fn head(&self) -> Option<Hash> {
        self.hashes.last().copied()
    }

    pub fn link_hash(&self, line: usize) -> Option<Hash> {
        self.hashes.get(line).copied()
    }

    /// Line of the link with hash `hash`.
    pub fn line_of(&self, hash: &Hash) -> Option<usize> {
        self.index.get(hash).copied()
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.last_time
    }

    pub fn m(&self) -> u32 {
        self.m
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn signed_m(&self) -> u32 {
        self.signed_m
    }

    /// Signers of the head view, ordered by key.
    pub fn signers(&self) -> impl Iterator<Item = &Signer> {
        self.signers.values()
    }

    pub fn signer_comment(&self, pubkey: &str) -> Option<&str> {
        self.signers.get(pubkey).map(|s| s.comment.as_str())
    }

    /// Highest line `pubkey` has approved.
    pub fn approval_mark(&self, pubkey: &str) -> Option<usize> {
        self.marks.get(pubkey).copied()
    }

    /// Last line inside the signed boundary.
    pub fn signed_line(&self) -> usize {
        self.signed_line
    }

    /// Lines not yet covered by enough signatures.
    pub fn unsigned_lines(&self) -> std::ops::Range<usize> {
        (self.signed_line + 1).min(self.len())..self.len()
    }

    /// Every published tree hash, starting with the empty tree.
    pub fn tree_hashes(&self) -> Vec<Hash> {
        std::iter::once(EMPTY_HASH)
            .chain(self.sources.iter().map(|(_, hash)| *hash))
            .collect()
    }

    /// Published tree hashes inside the signed boundary, starting with the
    /// empty tree.
    pub fn signed_tree_hashes(&self) -> Vec<Hash> {
        std::iter::once(EMPTY_HASH)
            .chain(
                self.sources
                    .iter()
                    .take_while(|(line, _)| *line <= self.signed_line)
                    .map(|(_, hash)| *hash),
            )
            .collect()
    }

    pub fn last_signed_tree_hash(&self) -> Hash {
        self.signed_tree_hashes().last().copied().unwrap_or(EMPTY_HASH)
    }

    /// Succeeds if `head` is the hash of some line of this chain.
    pub fn check_head(&self, head: &Hash) -> Result<()> {
        if self.index.contains_key(head) {
            Ok(())
        } else {
            Err(ChainError::HeadNotFound(*head))
        }
    }
}

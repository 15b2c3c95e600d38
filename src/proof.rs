// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chain proofs: a serializable summary of a verified hashchain.

use crate::hash::Hash;
use crate::hashchain::{ChainState, Signer};
use serde::Serialize;

/// What replaying a chain established.
///
/// Produced only from a state that verified from scratch, so every field is
/// backed by the signatures and hashes of the chain it describes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChainProof {
    pub lines: usize,
    pub head: Option<Hash>,
    pub signed_line: usize,
    pub last_signed_tree_hash: Hash,
    pub m: u32,
    pub n: u32,
    pub signers: Vec<Signer>,
}

impl From<&ChainState> for ChainProof {
    fn from(state: &ChainState) -> Self {
        Self {
            lines: state.len(),
            head: state.head(),
            signed_line: state.signed_line(),
            last_signed_tree_hash: state.last_signed_tree_hash(),
            m: state.m(),
            n: state.n(),
            signers: state.signers().cloned().collect(),
        }
    }
}

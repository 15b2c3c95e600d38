// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Merging a longer copy of a chain into a local one.

use super::chain::HashChain;
use super::error::{ChainError, Result};
use super::link::Link;
use super::state::ChainState;

/// Returns the links of `src` that extend `dest`.
///
/// `src` must agree with `dest` on every line they share.
pub fn extension<'a>(dest: &[Link], src: &'a [Link]) -> Result<&'a [Link]> {
    if let Some(line) = dest.iter().zip(src).position(|(d, s)| d != s) {
        return Err(ChainError::CannotMerge { line });
    }
    if src.len() <= dest.len() {
        return Err(ChainError::NothingToMerge);
    }
    Ok(&src[dest.len()..])
}

impl HashChain {
    /// Appends the links by which `src` extends this chain. Returns how many
    /// were appended.
    ///
    /// The whole chain is replayed from scratch before each link is written.
    pub fn merge(&mut self, src: &[Link]) -> Result<usize> {
        let extra = extension(self.links(), src)?;
        let mut candidate = self.links().to_vec();
        for link in extra {
            candidate.push(link.clone());
            let state = ChainState::replay(&candidate)?;
            self.commit(link.clone(), state)?;
        }
        tracing::info!("Merged {} lines into {:?}", extra.len(), self.path());
        Ok(extra.len())
    }
}

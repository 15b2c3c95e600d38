// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! codechain: verifiable code changes.
//!
//! A hashchain records which source tree states were published and who signed
//! off on them; patchfiles carry the deltas between those states. Together they
//! rebuild any signed state of a tree from nothing and prove it is the one that
//! was signed.

pub mod codec;
pub mod config;
pub mod hash;
pub mod hashchain;
pub mod lockfile;
pub mod patchfile;
pub mod proof;
pub mod signed_head;
pub mod sync;
pub mod tree;
pub mod verify;

pub use hash::{Hash, EMPTY_HASH};

#[cfg(test)]
mod tests;

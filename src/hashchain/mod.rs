// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The hashchain: a hash-linked, threshold-signed, append-only ledger of
//! source tree states and signer configuration.

pub mod chain;
pub mod error;
pub mod keys;
pub mod link;
pub mod merge;
pub mod state;

pub use chain::{parse_links, read_links, verify_file, DetachedSignature, HashChain};
pub use error::{ChainError, Result};
pub use link::{Link, LinkKind, LinkParseError};
pub use state::{ChainState, Signer};

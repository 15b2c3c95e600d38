// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Signed heads: a compact, signed statement of a chain's current head.
//!
//! Binary layout, big endian, 188 bytes:
//!
//! | field            | bytes |
//! |------------------|-------|
//! | `pub_key`        | 32    |
//! | `pub_key_rotate` | 32 (all zero when absent) |
//! | `valid_from`     | 8     |
//! | `valid_to`       | 8     |
//! | `counter`        | 8     |
//! | `head`           | 32    |
//! | `line`           | 4     |
//! | `signature`      | 64    |
//!
//! The signature covers every byte before it. The text form is the layout in
//! URL-safe base64 without padding.

use crate::hash::{Hash, HASH_LEN};
use crate::hashchain::keys::{self, KeyError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;
use thiserror::Error;

pub const SIZE: usize = 188;
const SIGNED_SIZE: usize = SIZE - 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignedHeadError {
    #[error("signed head must be {SIZE} bytes, got {0}")]
    Length(usize),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("signed head signature is invalid")]
    InvalidSignature,

    #[error("validity window is empty ({valid_from} > {valid_to})")]
    EmptyWindow { valid_from: i64, valid_to: i64 },

    #[error("signed head is not valid before {valid_from} (now {now})")]
    NotYetValid { valid_from: i64, now: i64 },

    #[error("signed head expired at {valid_to} (now {now})")]
    Expired { valid_to: i64, now: i64 },

    #[error("counter must increase ({current} -> {next})")]
    CounterNotIncreasing { current: u64, next: u64 },

    #[error("successor is signed by an unannounced key")]
    KeyNotRotated,
}

pub type Result<T> = std::result::Result<T, SignedHeadError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHead {
    pub pub_key: VerifyingKey,
    pub pub_key_rotate: Option<VerifyingKey>,
    pub valid_from: i64,
    pub valid_to: i64,
    pub counter: u64,
    pub head: Hash,
    pub line: u32,
    pub signature: Signature,
}

impl SignedHead {
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        key: &SigningKey,
        pub_key_rotate: Option<VerifyingKey>,
        valid_from: i64,
        valid_to: i64,
        counter: u64,
        head: Hash,
        line: u32,
    ) -> Result<Self> {
        if valid_from > valid_to {
            return Err(SignedHeadError::EmptyWindow { valid_from, valid_to });
        }
        let mut sh = SignedHead {
            pub_key: key.verifying_key(),
            pub_key_rotate,
            valid_from,
            valid_to,
            counter,
            head,
            line,
            signature: Signature::from_bytes(&[0; 64]),
        };
        sh.signature = key.sign(&sh.marshal()[..SIGNED_SIZE]);
        Ok(sh)
    }

    pub fn marshal(&self) -> [u8; SIZE] {
        let mut out = Vec::with_capacity(SIZE);
        out.extend_from_slice(self.pub_key.as_bytes());
        match &self.pub_key_rotate {
            Some(key) => out.extend_from_slice(key.as_bytes()),
            None => out.extend_from_slice(&[0; 32]),
        }
        // writes into a Vec cannot fail
        let _ = out.write_i64::<BigEndian>(self.valid_from);
        let _ = out.write_i64::<BigEndian>(self.valid_to);
        let _ = out.write_u64::<BigEndian>(self.counter);
        out.extend_from_slice(self.head.as_bytes());
        let _ = out.write_u32::<BigEndian>(self.line);
        out.extend_from_slice(&self.signature.to_bytes());

        let mut bytes = [0u8; SIZE];
        bytes.copy_from_slice(&out);
        bytes
    }

    /// Decodes the binary layout. Does not check the signature.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIZE {
            return Err(SignedHeadError::Length(bytes.len()));
        }
        let short = |_| SignedHeadError::Length(bytes.len());
        let mut r = Cursor::new(bytes);

        let mut key = [0u8; 32];
        r.read_exact(&mut key).map_err(short)?;
        let pub_key = VerifyingKey::from_bytes(&key).map_err(|_| KeyError::InvalidKey)?;

        r.read_exact(&mut key).map_err(short)?;
        let pub_key_rotate = if key == [0; 32] {
            None
        } else {
            Some(VerifyingKey::from_bytes(&key).map_err(|_| KeyError::InvalidKey)?)
        };

        let valid_from = r.read_i64::<BigEndian>().map_err(short)?;
        let valid_to = r.read_i64::<BigEndian>().map_err(short)?;
        let counter = r.read_u64::<BigEndian>().map_err(short)?;
        let mut head = [0u8; HASH_LEN];
        r.read_exact(&mut head).map_err(short)?;
        let line = r.read_u32::<BigEndian>().map_err(short)?;
        let mut signature = [0u8; 64];
        r.read_exact(&mut signature).map_err(short)?;

        Ok(SignedHead {
            pub_key,
            pub_key_rotate,
            valid_from,
            valid_to,
            counter,
            head: Hash::from_bytes(head),
            line,
            signature: Signature::from_bytes(&signature),
        })
    }

    pub fn verify(&self) -> Result<()> {
        self.pub_key
            .verify(&self.marshal()[..SIGNED_SIZE], &self.signature)
            .map_err(|_| SignedHeadError::InvalidSignature)
    }

    /// Checks that `now` (Unix seconds) is inside the validity window.
    pub fn check_valid_at(&self, now: i64) -> Result<()> {
        if now < self.valid_from {
            return Err(SignedHeadError::NotYetValid {
                valid_from: self.valid_from,
                now,
            });
        }
        if now > self.valid_to {
            return Err(SignedHeadError::Expired {
                valid_to: self.valid_to,
                now,
            });
        }
        Ok(())
    }

    /// Checks that `next` may replace this head: a higher counter, signed by
    /// the same key or by the rotation key announced here.
    pub fn check_successor(&self, next: &SignedHead) -> Result<()> {
        next.verify()?;
        if next.counter <= self.counter {
            return Err(SignedHeadError::CounterNotIncreasing {
                current: self.counter,
                next: next.counter,
            });
        }
        if next.pub_key != self.pub_key && Some(next.pub_key) != self.pub_key_rotate {
            return Err(SignedHeadError::KeyNotRotated);
        }
        Ok(())
    }
}

impl fmt::Display for SignedHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&keys::encode(&self.marshal()))
    }
}

impl FromStr for SignedHead {
    type Err = SignedHeadError;

    fn from_str(s: &str) -> Result<Self> {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|_| KeyError::Base64(s.to_string()))?;
        Self::unmarshal(&bytes)
    }
}

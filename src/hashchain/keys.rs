// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ed25519 keys, signatures and nonces in their base64 text form.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

pub const NONCE_LEN: usize = 24;

pub type Nonce = [u8; NONCE_LEN];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid base64: {0:?}")]
    Base64(String),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("not a valid Ed25519 public key")]
    InvalidKey,
}

/// URL-safe base64 without padding, the text form of all binary fields.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn decode_array<const N: usize>(s: &str) -> Result<[u8; N], KeyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| KeyError::Base64(s.to_string()))?;
    let actual = bytes.len();
    <[u8; N]>::try_from(bytes).map_err(|_| KeyError::Length { expected: N, actual })
}

pub fn decode_public_key(s: &str) -> Result<VerifyingKey, KeyError> {
    let bytes = decode_array::<PUBLIC_KEY_LENGTH>(s)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidKey)
}

pub fn decode_secret_key(s: &str) -> Result<SigningKey, KeyError> {
    let seed = decode_array::<32>(s)?;
    Ok(SigningKey::from_bytes(&seed))
}

pub fn decode_signature(s: &str) -> Result<Signature, KeyError> {
    let bytes = decode_array::<SIGNATURE_LENGTH>(s)?;
    Ok(Signature::from_bytes(&bytes))
}

pub fn decode_nonce(s: &str) -> Result<Nonce, KeyError> {
    decode_array::<NONCE_LEN>(s)
}

/// Text identifier of a signer.
pub fn key_id(key: &VerifyingKey) -> String {
    encode(key.as_bytes())
}

pub fn generate_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

pub fn generate_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_forms() {
        let key = generate_key();
        let id = key_id(&key.verifying_key());
        assert_eq!(id.len(), 43);
        assert!(!id.contains('='));
        assert_eq!(decode_public_key(&id).unwrap(), key.verifying_key());
        assert_eq!(decode_secret_key(&encode(&key.to_bytes())).unwrap().to_bytes(), key.to_bytes());

        let nonce = generate_nonce();
        assert_eq!(decode_nonce(&encode(&nonce)).unwrap(), nonce);
    }

    #[test]
    fn test_bad_input() {
        assert_eq!(
            decode_nonce(&encode(&[1, 2, 3])),
            Err(KeyError::Length { expected: 24, actual: 3 })
        );
        assert!(matches!(decode_public_key("not base64!"), Err(KeyError::Base64(_))));
        // standard alphabet padding is rejected
        assert!(decode_nonce("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA==").is_err());
    }
}

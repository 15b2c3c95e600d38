// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Secret key files.

use anyhow::{Context, Result};
use codechain::hashchain::keys;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Key file format
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyFile {
    /// Base64url encoded 32-byte private key seed
    pub private_key: String,
    /// Base64url encoded 32-byte public key
    pub public_key: String,
    /// Recorded in the hashchain next to the key
    #[serde(default)]
    pub comment: String,
}

impl KeyFile {
    pub fn new(key: &SigningKey, comment: &str) -> Self {
        Self {
            private_key: keys::encode(&key.to_bytes()),
            public_key: keys::key_id(&key.verifying_key()),
            comment: comment.to_string(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read key file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse key file: {}", path.display()))
    }

    /// Writes the key file readable by the owner only. Refuses to overwrite.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .with_context(|| format!("failed to write key file: {}", path.display()))?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Decodes the secret key and checks it against the stored public key.
    pub fn signing_key(&self) -> Result<SigningKey> {
        let key = keys::decode_secret_key(&self.private_key)
            .context("failed to decode private key from base64url")?;
        if keys::key_id(&key.verifying_key()) != self.public_key {
            anyhow::bail!("public key does not match private key");
        }
        Ok(key)
    }
}

pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
    KeyFile::load(path)?.signing_key()
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::keyfile::KeyFile;
use codechain::hashchain::keys;
use std::path::Path;

/// Generate a new Ed25519 keypair into `out`.
pub fn genkey(out: &Path, comment: &str) -> anyhow::Result<()> {
    let key = keys::generate_key();
    let file = KeyFile::new(&key, comment);
    file.save(out)?;

    eprintln!("Generated new keypair: {}", out.display());
    println!("{}", file.public_key);
    Ok(())
}

pub fn pubkey(key_path: &Path) -> anyhow::Result<()> {
    let file = KeyFile::load(key_path)?;
    file.signing_key()?;
    println!("{}", file.public_key);
    Ok(())
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Commands that append configuration and signatures to the hashchain.

use crate::keyfile::{load_signing_key, KeyFile};
use anyhow::Context;
use codechain::config::Config;
use codechain::hashchain::{keys, HashChain};
use std::fs;
use std::path::Path;

fn open(config: &Config) -> anyhow::Result<HashChain> {
    let path = config.hashchain_file();
    HashChain::open(&path).with_context(|| format!("failed to open hashchain {}", path.display()))
}

pub fn start(config: &Config, key_path: &Path) -> anyhow::Result<()> {
    let file = KeyFile::load(key_path)?;
    let key = file.signing_key()?;
    fs::create_dir_all(config.codechain_dir())?;

    let chain = HashChain::start(&config.hashchain_file(), &key, &file.comment)?;
    println!("Started {} ({})", chain.path().display(), chain.head());
    Ok(())
}

/// Adds the signer of `key_path`. The key file proves possession of the key.
pub fn addkey(config: &Config, key_path: &Path, weight: u32) -> anyhow::Result<()> {
    let file = KeyFile::load(key_path)?;
    let key = file.signing_key()?;
    let mut chain = open(config)?;

    chain.add_key(&key, weight, &file.comment)?;
    let state = chain.state();
    println!("Added {} with weight {} (m = {}, n = {})", file.public_key, weight, state.m(), state.n());
    Ok(())
}

pub fn remkey(config: &Config, pubkey: &str) -> anyhow::Result<()> {
    let pubkey = keys::decode_public_key(pubkey).context("invalid public key")?;
    let mut chain = open(config)?;

    chain.remove_key(pubkey)?;
    let state = chain.state();
    println!("Removed {} (m = {}, n = {})", keys::key_id(&pubkey), state.m(), state.n());
    Ok(())
}

pub fn sigctl(config: &Config, m: u32) -> anyhow::Result<()> {
    let mut chain = open(config)?;
    chain.signature_control(m)?;
    println!("Signature threshold set to {} of {}", m, chain.state().n());
    Ok(())
}

/// Signs `line`, or the head when no line is given.
pub fn sign(config: &Config, key_path: &Path, line: Option<usize>) -> anyhow::Result<()> {
    let key = load_signing_key(key_path)?;
    let mut chain = open(config)?;
    let line = line.unwrap_or(chain.len() - 1);

    chain.sign(line, &key)?;
    println!("Signed line {} (signed up to line {})", line, chain.state().signed_line());
    Ok(())
}

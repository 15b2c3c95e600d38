// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::keyfile::load_signing_key;
use anyhow::Context;
use codechain::config::Config;
use codechain::hashchain::HashChain;
use codechain::{patchfile, sync, tree};
use std::fs;
use std::path::Path;

/// Publishes the working tree as the next source state.
///
/// The last published tree is kept under `.codechain/tree/head`. It is rebuilt
/// from the patches when missing or stale, diffed against the working tree to
/// write the next patch, and then moved forward by that patch.
pub fn run(config: &Config, key_path: &Path, message: &str) -> anyhow::Result<()> {
    let key = load_signing_key(key_path)?;
    let chain_path = config.hashchain_file();
    let mut chain = HashChain::open(&chain_path)
        .with_context(|| format!("failed to open hashchain {}", chain_path.display()))?;

    let history = chain.state().tree_hashes();
    let last = history[history.len() - 1];
    let tree_hash = tree::hash(config.root(), &config.excludes)?;
    if tree_hash == last {
        anyhow::bail!("nothing to publish: tree is already at {}", last);
    }

    let head_dir = config.tree_head_dir();
    let patch_dir = config.patch_dir();
    fs::create_dir_all(&head_dir)?;
    fs::create_dir_all(&patch_dir)?;
    sync::sync(&head_dir, &last, &patch_dir, &history, &config.excludes, true)
        .context("failed to rebuild the last published tree")?;

    let patch = sync::patch_path(&patch_dir, &last);
    if patch.exists() {
        anyhow::bail!("patch {} already exists", patch.display());
    }
    patchfile::diff_to_file(&patch, config.patchfile_version, &head_dir, config.root(), &config.excludes)?;

    if let Err(e) = chain.source(tree_hash, &key, message) {
        if let Err(rm) = fs::remove_file(&patch) {
            tracing::warn!("Failed to remove patch {:?}: {}", patch, rm);
        }
        return Err(e.into());
    }
    patchfile::apply_file(&head_dir, &patch, &config.excludes)
        .context("failed to update the published tree copy")?;

    println!("Published {} on line {}", tree_hash, chain.len() - 1);
    Ok(())
}

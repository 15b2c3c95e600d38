// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::Context;
use codechain::config::Config;
use codechain::{hashchain, sync};
use std::path::Path;

pub fn create(config: &Config, out: &Path) -> anyhow::Result<()> {
    let patches = codechain_dist::create(out, config)
        .with_context(|| format!("failed to create distribution {}", out.display()))?;
    println!("Wrote {} with {} patches", out.display(), patches);
    Ok(())
}

/// Applies a distribution archive. With `sync_tree` the working tree is then
/// brought to the last signed tree.
pub fn apply(config: &Config, archive: &Path, sync_tree: bool) -> anyhow::Result<()> {
    let added = codechain_dist::apply(archive, config)
        .with_context(|| format!("failed to apply distribution {}", archive.display()))?;
    println!("Applied {} ({} new lines)", archive.display(), added);

    if sync_tree {
        let (_, state) = hashchain::verify_file(&config.hashchain_file())?;
        let history = state.signed_tree_hashes();
        let target = state.last_signed_tree_hash();
        sync::sync(config.root(), &target, &config.patch_dir(), &history, &config.excludes, false)
            .context("failed to sync the working tree")?;
        println!("Working tree is at {}", target);
    }
    Ok(())
}

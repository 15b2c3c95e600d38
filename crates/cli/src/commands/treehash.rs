// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use codechain::config::Config;
use codechain::tree;

/// Prints the tree hash of the project, or with `list` the listing it hashes.
pub fn run(config: &Config, list: bool) -> anyhow::Result<()> {
    if list {
        let entries = tree::list(config.root(), &config.excludes)?;
        print!("{}", tree::serialize(&entries));
    } else {
        println!("{}", tree::hash(config.root(), &config.excludes)?);
    }
    Ok(())
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::{Context, Result};
use clap::Parser;
use codechain::config::CODECHAIN_DIR;
use codechain::proof::ChainProof;
use codechain::verify;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the hashchain file (e.g. .codechain/hashchain)
    hashchain: PathBuf,

    /// Also check that this directory matches the last signed tree
    #[arg(long)]
    tree: Option<PathBuf>,
}

#[derive(Serialize, Debug)]
struct Report {
    #[serde(flatten)]
    proof: ChainProof,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree_matches: Option<bool>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    eprintln!("Codechain Verifier v{}", env!("CARGO_PKG_VERSION"));

    // Replay the whole chain; any broken link or signature is fatal
    let proof = verify::verify_hashchain(&args.hashchain)
        .with_context(|| format!("Failed to verify {:?}", args.hashchain))?;

    let tree_matches = match &args.tree {
        Some(dir) => Some(
            verify::tree_matches(dir, &[CODECHAIN_DIR.to_string()], &proof.last_signed_tree_hash)
                .context("Failed to hash tree")?,
        ),
        None => None,
    };

    let report = Report { proof, tree_matches };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.tree_matches == Some(false) {
        anyhow::bail!("Tree does not match the last signed tree hash");
    }
    Ok(())
}

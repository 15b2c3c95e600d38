// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::Context;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use codechain::config::Config;
use codechain::hashchain::{self, keys, ChainState, Link, LinkKind};
use codechain::tree;

fn short(s: &str) -> &str {
    &s[..s.len().min(12)]
}

fn describe(link: &Link, state: &ChainState) -> String {
    match &link.kind {
        LinkKind::ChainStart { pubkey, comment, .. } => {
            format!("{} {}", short(&keys::key_id(pubkey)), comment)
        }
        LinkKind::Source {
            tree_hash, comment, ..
        } => format!("{} {}", short(&tree_hash.to_hex()), comment),
        LinkKind::Signature {
            entry_hash, pubkey, ..
        } => match state.line_of(entry_hash) {
            Some(line) => format!("line {} by {}", line, short(&keys::key_id(pubkey))),
            None => format!("{} by {}", short(&entry_hash.to_hex()), short(&keys::key_id(pubkey))),
        },
        LinkKind::AddKey {
            weight,
            pubkey,
            comment,
            ..
        } => format!("{} weight {} {}", short(&keys::key_id(pubkey)), weight, comment),
        LinkKind::RemoveKey { pubkey } => short(&keys::key_id(pubkey)).to_string(),
        LinkKind::SignatureControl { m } => format!("m = {}", m),
    }
}

pub fn run(config: &Config) -> anyhow::Result<()> {
    let path = config.hashchain_file();
    let (links, state) = hashchain::verify_file(&path)
        .with_context(|| format!("failed to verify {}", path.display()))?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Line", "Timestamp", "Kind", "Detail", "Signed"]);

    for (line, link) in links.iter().enumerate() {
        let signed = if line <= state.signed_line() { "yes" } else { "" };
        table.add_row(vec![
            line.to_string(),
            link.time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            link.kind.name().to_string(),
            describe(link, &state).trim_end().to_string(),
            signed.to_string(),
        ]);
    }

    println!("\nHashchain {}\n", path.display());
    println!("{table}\n");

    let mut signers = Table::new();
    signers
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Signer", "Weight", "Approved up to", "Comment"]);
    for signer in state.signers() {
        let mark = state
            .approval_mark(&signer.pubkey)
            .map(|m| m.to_string())
            .unwrap_or_default();
        signers.add_row(vec![
            signer.pubkey.clone(),
            signer.weight.to_string(),
            mark,
            signer.comment.clone(),
        ]);
    }
    println!("Signers (m = {}, n = {})\n", state.m(), state.n());
    println!("{signers}\n");

    let unsigned = state.unsigned_lines();
    if !unsigned.is_empty() {
        println!("⚠️  Lines {}..{} still need signatures\n", unsigned.start, unsigned.end - 1);
    }

    let current = tree::hash(config.root(), &config.excludes)?;
    let published = state.tree_hashes();
    if published.last() == Some(&current) {
        println!("Working tree matches the last published tree {}", current);
    } else if state.last_signed_tree_hash() == current {
        println!("Working tree matches the last signed tree {}", current);
    } else {
        println!("Working tree {} has unpublished changes", current);
    }
    Ok(())
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use codechain::config::Config;
use codechain::verify;

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let path = config.hashchain_file();
    let proof = match verify::verify_hashchain(&path) {
        Ok(proof) => proof,
        Err(e) => {
            println!("\n❌ CORRUPTED\n");
            println!("Hashchain: {}", path.display());
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&proof)?);
        return Ok(());
    }

    println!("\n✅ VERIFIED\n");
    println!("Lines:       {}", proof.lines);
    if let Some(head) = proof.head {
        println!("Head:        {}", head);
    }
    println!("Signed line: {}", proof.signed_line);
    println!("Signed tree: {}", proof.last_signed_tree_hash);
    println!("Threshold:   {} of {}\n", proof.m, proof.n);

    let matches = verify::tree_matches(config.root(), &config.excludes, &proof.last_signed_tree_hash)?;
    if matches {
        println!("Working tree matches the last signed tree\n");
    }
    Ok(())
}

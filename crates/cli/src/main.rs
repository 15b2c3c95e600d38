// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::Context;
use clap::{Parser, Subcommand};
use codechain::config::Config;
use codechain_cli::commands::{chain, dist, keys, publish, status, treehash, verify};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codechain")]
#[command(about = "Codechain - verifiable, multi-party signed code changes", long_about = None)]
struct Cli {
    /// Project root; chain data lives in <dir>/.codechain
    #[arg(long, short, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new signing key file
    Genkey {
        /// Where to write the key file
        #[arg(long, short)]
        out: PathBuf,

        /// Comment recorded in the hashchain with the key
        #[arg(long, short, default_value = "")]
        comment: String,
    },
    /// Print the public key of a key file
    Pubkey {
        key: PathBuf,
    },
    /// Start a new hashchain signed by the given key
    Start {
        #[arg(long, short)]
        key: PathBuf,
    },
    /// Add a signer; the key file of the new signer proves possession
    Addkey {
        key: PathBuf,

        #[arg(long, short, default_value_t = 1)]
        weight: u32,
    },
    /// Remove a signer by public key
    Remkey {
        pubkey: String,
    },
    /// Set the signature threshold m
    Sigctl {
        m: u32,
    },
    /// Publish the current tree as the next source state
    Publish {
        #[arg(long, short)]
        key: PathBuf,

        #[arg(long, short, default_value = "")]
        message: String,
    },
    /// Sign a line of the hashchain (default: the head)
    Sign {
        #[arg(long, short)]
        key: PathBuf,

        #[arg(long, short)]
        line: Option<usize>,
    },
    /// Verify the hashchain from scratch
    Verify {
        /// Print the chain proof as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the hashchain, its signers and the state of the working tree
    Status,
    /// Print the tree hash of the project
    Treehash {
        /// Print the hashed listing instead
        #[arg(long, short)]
        list: bool,
    },
    /// Write a distribution archive of the hashchain and patches
    Createdist {
        out: PathBuf,
    },
    /// Apply a distribution archive
    Apply {
        archive: PathBuf,

        /// Also bring the working tree to the last signed tree
        #[arg(long)]
        sync: bool,
    },
}

fn main() -> anyhow::Result<()> {
    codechain_cli::telemetry::init_telemetry();

    let cli = Cli::parse();
    let config = Config::from_env(&cli.dir).context("invalid configuration")?;

    match cli.command {
        Commands::Genkey { out, comment } => keys::genkey(&out, &comment),
        Commands::Pubkey { key } => keys::pubkey(&key),
        Commands::Start { key } => chain::start(&config, &key),
        Commands::Addkey { key, weight } => chain::addkey(&config, &key, weight),
        Commands::Remkey { pubkey } => chain::remkey(&config, &pubkey),
        Commands::Sigctl { m } => chain::sigctl(&config, m),
        Commands::Publish { key, message } => publish::run(&config, &key, &message),
        Commands::Sign { key, line } => chain::sign(&config, &key, line),
        Commands::Verify { json } => verify::run(&config, json),
        Commands::Status => status::run(&config),
        Commands::Treehash { list } => treehash::run(&config, list),
        Commands::Createdist { out } => dist::create(&config, &out),
        Commands::Apply { archive, sync } => dist::apply(&config, &archive, sync),
    }
}

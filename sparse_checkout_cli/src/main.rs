// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

mod host;

use std::io::{self, Read as _};
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};

use host::{FsIndex, FsObjectStore, FsTreeMerger};
use sparse_checkout::{FileConfigStore, Mode, PatternFile, PatternList};

/// Compile, list, and apply sparse-checkout patterns against a working tree.
#[derive(Parser)]
struct Cli {
    /// Working tree to reconcile.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Committed tree to reconcile the working tree against, standing in
    /// for HEAD. Defaults to `<root>/.sparse-checkout-source`.
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Location of the pattern file. Defaults to
    /// `<root>/.git/info/sparse-checkout`.
    #[arg(long, global = true)]
    pattern_file: Option<PathBuf>,

    /// Location of the config file. Defaults to `<root>/.git/config`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the patterns currently in effect.
    List,
    /// Enable sparse-checkout and write the dialect's default pattern set.
    Init {
        /// Use the cone dialect instead of the general dialect.
        #[arg(long)]
        cone: bool,
    },
    /// Replace the active pattern set and reconcile the working tree.
    Set {
        /// Read patterns (or, in cone mode, directories) one per line from stdin.
        #[arg(long)]
        stdin: bool,
        /// Patterns (general dialect) or directories (cone dialect) to set.
        patterns: Vec<String>,
    },
    /// Disable sparse-checkout and restore the full working tree.
    Disable,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        exit(1);
    }
}

fn run(cli: Cli) -> sparse_checkout::Result<()> {
    let source = cli
        .source
        .unwrap_or_else(|| cli.root.join(".sparse-checkout-source"));
    let pattern_file_path = cli
        .pattern_file
        .unwrap_or_else(|| cli.root.join(".git").join("info").join("sparse-checkout"));
    let config_path = cli.config.unwrap_or_else(|| cli.root.join(".git").join("config"));

    let mut config = FileConfigStore::load(config_path)?;
    let mut pattern_file = PatternFile::new(&cli.root, pattern_file_path);
    let object_store = FsObjectStore::new(&source);
    let mut index = FsIndex;
    let mut tree_merger = FsTreeMerger::new(&source);

    match cli.command {
        Command::List => match pattern_file.list(&config)? {
            Some(patterns) => {
                for pattern in patterns {
                    println!("{pattern}");
                }
            }
            None => log::warn!("no sparse-checkout patterns file exists"),
        },
        Command::Init { cone } => {
            let stats = pattern_file.init(cone, &mut config, &object_store, &mut index, &mut tree_merger)?;
            log::info!(
                "sparse-checkout initialized ({} dialect): +{} -{} ~{}",
                if cone { "cone" } else { "general" },
                stats.added,
                stats.removed,
                stats.updated
            );
        }
        Command::Set { stdin, patterns } => {
            let lines = collect_lines(stdin, patterns)?;
            let cone = matches!(pattern_file.mode(&config)?, Mode::Cone);
            let mut list = PatternList::new(cone);
            for line in &lines {
                if cone {
                    list.cone_insert(line)?;
                } else {
                    list.add_pattern(line, 0)?;
                }
            }
            let stats = pattern_file.set(list, &mut config, &object_store, &mut index, &mut tree_merger)?;
            log::info!(
                "sparse-checkout updated: +{} -{} ~{}",
                stats.added,
                stats.removed,
                stats.updated
            );
        }
        Command::Disable => {
            let stats =
                pattern_file.disable(&mut config, &object_store, &mut index, &mut tree_merger)?;
            log::info!(
                "sparse-checkout disabled: +{} -{} ~{}",
                stats.added,
                stats.removed,
                stats.updated
            );
        }
    }

    Ok(())
}

fn collect_lines(stdin: bool, patterns: Vec<String>) -> sparse_checkout::Result<Vec<String>> {
    if !stdin {
        return Ok(patterns);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .chain(patterns)
        .collect())
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Podmig CLI
//!
//! Offline tooling for pod checkpoint archives and podmig configuration.

use clap::{Parser, Subcommand};

mod commands;

/// Podmig - pod checkpoint/restore tooling
#[derive(Parser)]
#[command(name = "podmig")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the contents of a pod checkpoint archive
    Inspect {
        /// Path to the archive (gzip-compressed tar)
        archive: String,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { archive } => commands::inspect::execute(&archive).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}

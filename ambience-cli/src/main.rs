// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Ambience daemon
//!
//! Fetches slideshow images, publishes each one through a named shared
//! memory region and wakes the render process with a signal.

use clap::{Parser, Subcommand};

mod commands;
mod daemon;
mod source;

/// ambienced - Slideshow image acquisition daemon
#[derive(Parser)]
#[command(name = "ambienced")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "ambience.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the slideshow loop until interrupted
    Run,

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Publish a single image file and leave it in the region
    Push {
        /// Path to the image file
        file: String,

        /// Do not signal the render process
        #[arg(long)]
        no_notify: bool,
    },

    /// Signal the render process once
    Notify,

    /// Show what the region currently holds
    Inspect,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Run => commands::run::execute(&cli.config).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Push { file, no_notify } => {
            commands::push::execute(&cli.config, &file, !no_notify).await
        }
        Commands::Notify => commands::notify::execute(&cli.config).await,
        Commands::Inspect => commands::inspect::execute(&cli.config).await,
    }
}

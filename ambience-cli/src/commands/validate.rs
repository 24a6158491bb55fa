// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ambienced validate` command - Validate configuration file.

use ambience_core::{ConfigLoader, SourceKind};

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Image Source:");
            match &config.source.kind {
                SourceKind::Http { url } => println!("  Service URL:        {}", url),
                SourceKind::Directory { path } => {
                    println!("  Directory:          {}", path.display())
                }
            }
            println!("  Client ID:          {}", config.source.client_id);
            println!(
                "  Target Size:        {}x{}",
                config.source.target_width, config.source.target_height
            );
            println!(
                "  QR Codes:           embedded={} standalone={}",
                config.source.embed_qr, config.source.request_standalone_qr
            );
            println!();
            println!("Image Store:");
            println!("  Region:             {}", config.store.name.os_name());
            println!("  Max Size:           {}", config.store.max_size);
            match &config.store.leak_image_path {
                Some(path) if config.store.leak_on_exit => {
                    println!("  Leak On Exit:       yes ({})", path.display())
                }
                _ => println!("  Leak On Exit:       no"),
            }
            println!();
            println!("Render Process:");
            println!("  Match:              {}", config.render.process_name);
            println!("  Signal:             {}", config.render.signal);
            println!();
            println!("Slideshow Interval:   {}s", config.slideshow.interval_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

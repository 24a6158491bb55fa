// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ambienced notify` command - Signal the render process once.

use ambience_core::{ConfigLoader, ProcessNotifier};

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;
    let mut notifier = ProcessNotifier::new(config.render.process_name, config.render.signal);

    let pid = notifier.notify()?;
    println!("✓ Sent {} to {} (PID: {})", notifier.signal(), notifier.pattern(), pid);
    Ok(())
}

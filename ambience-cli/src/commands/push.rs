// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ambienced push` command - Publish one image file.
//!
//! Opening the region truncates it, so this is meant for when the daemon is
//! not running. The region is leaked on exit so the render process keeps it.

use ambience_core::{ConfigLoader, ImageStore, ProcessNotifier};

pub async fn execute(
    config_path: &str,
    file: &str,
    notify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_file(config_path)?;

    let mut store = ImageStore::open(&config.store.name, config.store.max_size.bytes())?;
    let len = match store.write_from_file(file) {
        Ok(len) => len,
        Err(e) => {
            store.close(false);
            return Err(e.into());
        }
    };
    println!("✓ Wrote {} bytes from {} to {}", len, file, store.name().os_name());

    if notify {
        let mut notifier =
            ProcessNotifier::new(config.render.process_name.clone(), config.render.signal);
        match notifier.notify() {
            Ok(pid) => println!("✓ Notified {} (PID: {})", notifier.pattern(), pid),
            Err(e) => println!("⚠ Render process not notified: {}", e),
        }
    }

    store.close(true);
    Ok(())
}

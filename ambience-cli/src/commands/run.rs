// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ambienced run` command - Run the slideshow loop.

use std::time::Duration;

use ambience_core::{Config, ConfigLoader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;

use crate::daemon::Daemon;
use crate::source::ImageSource;

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Starting ambience daemon");

    // Fail fast on invalid config
    let config = ConfigLoader::load_file(config_path)?;
    log_summary(&config);

    let source = ImageSource::from_config(&config.source)?;
    let mut daemon = Daemon::new(&config, source)?;
    tracing::info!(
        region = %daemon.store().name(),
        capacity = %config.store.max_size,
        "Image store ready"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.slideshow.interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = daemon.cycle().await;
                tracing::debug!(outcome = ?outcome, "Cycle finished");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received interrupt");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                break;
            }
        }
    }

    daemon.shutdown();
    Ok(())
}

fn log_summary(config: &Config) {
    match &config.source.kind {
        ambience_core::SourceKind::Http { url } => tracing::info!(
            url = %url,
            client_id = %config.source.client_id,
            width = config.source.target_width,
            height = config.source.target_height,
            embed_qr = config.source.embed_qr,
            standalone_qr = config.source.request_standalone_qr,
            "Image source: remote service"
        ),
        ambience_core::SourceKind::Directory { path } => {
            tracing::info!(path = %path.display(), "Image source: local directory")
        }
    }
    tracing::info!(
        region = %config.store.name,
        max_size = %config.store.max_size,
        leak_on_exit = config.store.leak_on_exit,
        render_process = %config.render.process_name,
        signal = %config.render.signal,
        interval_secs = config.slideshow.interval_secs,
        "Configuration loaded"
    );
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Slideshow daemon state and per-cycle logic.
//!
//! Everything the loop needs lives in [`Daemon`]; the run command only
//! drives its timer and shutdown.

use std::path::PathBuf;

use ambience_core::{AmbienceError, Config, ImageStore, ProcessId, ProcessNotifier};

use crate::source::{describe_metadata, FetchedImage, ImageSource};

/// What one slideshow cycle achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No image this time; region untouched.
    FetchFailed,
    /// Image rejected by the store. The render process is still signalled
    /// and keeps showing the previous image; carries the pid if reached.
    StoreFailed(Option<ProcessId>),
    /// Image stored but the render process could not be signalled.
    Stored,
    /// Image stored and the render process signalled.
    Notified(ProcessId),
}

/// Slideshow daemon context.
pub struct Daemon {
    store: ImageStore,
    notifier: ProcessNotifier,
    source: ImageSource,
    /// Image left in the region on shutdown, if the region is to be leaked.
    leak_image: Option<PathBuf>,
    leak_on_exit: bool,
}

impl Daemon {
    /// Open the image store. Failing here is fatal for the daemon.
    pub fn new(config: &Config, source: ImageSource) -> Result<Self, AmbienceError> {
        let store = ImageStore::open(&config.store.name, config.store.max_size.bytes())?;
        let notifier = ProcessNotifier::new(
            config.render.process_name.clone(),
            config.render.signal,
        );

        Ok(Self {
            store,
            notifier,
            source,
            leak_image: config.store.leak_image_path.clone(),
            leak_on_exit: config.store.leak_on_exit,
        })
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn notifier(&self) -> &ProcessNotifier {
        &self.notifier
    }

    /// Fetch one image, store it and wake the render process.
    pub async fn cycle(&mut self) -> CycleOutcome {
        tracing::info!("Requesting next image");

        match self.source.next_image().await {
            Ok(image) => self.handle_image(&image),
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch image");
                CycleOutcome::FetchFailed
            }
        }
    }

    /// Store a received image and notify the render process.
    ///
    /// The notify step runs even when the write fails, so the cached pid
    /// stays fresh and duplicates keep getting cleaned up.
    pub fn handle_image(&mut self, image: &FetchedImage) -> CycleOutcome {
        let qr_len = image.qr.as_ref().map_or(0, Vec::len);
        match image.metadata.as_deref() {
            Some(metadata) => tracing::info!(
                file = %describe_metadata(metadata),
                len = image.bytes.len(),
                qr_len = qr_len,
                "Received new image"
            ),
            None => tracing::info!(len = image.bytes.len(), qr_len = qr_len, "Received new image"),
        }

        let stored = match self.store.write(&image.bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to update shared memory with received image");
                false
            }
        };

        let notified = match self.notifier.notify() {
            Ok(pid) => {
                tracing::info!(
                    process = %self.notifier.pattern(),
                    pid = %pid,
                    "Notified render process of new image"
                );
                Some(pid)
            }
            Err(e) => {
                tracing::warn!(
                    process = %self.notifier.pattern(),
                    error = %e,
                    "Failed to notify render process of new image"
                );
                None
            }
        };

        match (stored, notified) {
            (false, pid) => CycleOutcome::StoreFailed(pid),
            (true, Some(pid)) => CycleOutcome::Notified(pid),
            (true, None) => CycleOutcome::Stored,
        }
    }

    /// Release the region, leaving the idle image behind if configured to.
    pub fn shutdown(mut self) {
        tracing::info!("Shutting down ambience daemon");

        if !self.leak_on_exit {
            self.store.close(false);
            return;
        }

        if let Some(path) = self.leak_image.as_deref() {
            match self.store.write_from_file(path) {
                Ok(len) => tracing::info!(path = %path.display(), len = len, "Left idle image in region"),
                Err(e) => tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to update region pre-shutdown, contents not defined"
                ),
            }
        }
        self.store.close(true);
    }
}

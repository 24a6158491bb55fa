// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Validates the daemon configuration at boot-up time.
//! Any invalid field results in a HardValidationError that prevents startup.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use nix::sys::signal::Signal;
use serde::Deserialize;

use crate::error::{AmbienceError, AmbienceResult, HardValidationError};
use crate::types::{ProcessPattern, RegionCapacity, RegionName};

/// Smallest requested image edge, in pixels.
const IMG_MIN_SIZE_PX: u32 = 300;
/// Longest pause between two slides.
const SLIDESHOW_INTERVAL_MAX_SECS: u64 = 1000;

/// Raw image source section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSourceConfig {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_target_width")]
    target_width: u32,
    #[serde(default = "default_target_height")]
    target_height: u32,
    #[serde(default)]
    embed_qr: bool,
    #[serde(default)]
    request_standalone_qr: bool,
    #[serde(default = "default_true")]
    request_metadata: bool,
}

fn default_client_id() -> String {
    "ambience".to_string()
}

fn default_target_width() -> u32 {
    640
}

fn default_target_height() -> u32 {
    480
}

fn default_true() -> bool {
    true
}

/// Raw shared memory store section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStoreConfig {
    #[serde(default = "default_store_name")]
    name: String,
    #[serde(default = "default_max_size_bytes")]
    max_size_bytes: u64,
    #[serde(default)]
    leak_on_exit: bool,
    #[serde(default)]
    leak_image_path: Option<String>,
}

fn default_store_name() -> String {
    "ambience_img".to_string()
}

fn default_max_size_bytes() -> u64 {
    20 * 1024 * 1024 // 20MB
}

impl Default for RawStoreConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            max_size_bytes: default_max_size_bytes(),
            leak_on_exit: false,
            leak_image_path: None,
        }
    }
}

/// Raw render process section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRenderConfig {
    process_name: Option<String>,
    #[serde(default = "default_signal")]
    signal: String,
}

fn default_signal() -> String {
    "SIGUSR1".to_string()
}

/// Raw slideshow section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSlideshowConfig {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    10
}

impl Default for RawSlideshowConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    source: RawSourceConfig,
    #[serde(default)]
    store: RawStoreConfig,
    render: RawRenderConfig,
    #[serde(default)]
    slideshow: RawSlideshowConfig,
}

/// Where images come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Remote image service answering each GET with a fresh image.
    Http { url: String },
    /// Local directory of image files, shown in name order.
    Directory { path: PathBuf },
}

/// Validated image source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub client_id: String,
    pub target_width: u32,
    pub target_height: u32,
    /// Ask the service to draw a QR code with more info into the image.
    pub embed_qr: bool,
    /// Ask the service for a separate QR payload next to the image.
    pub request_standalone_qr: bool,
    pub request_metadata: bool,
}

/// Validated shared memory store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub name: RegionName,
    pub max_size: RegionCapacity,
    pub leak_on_exit: bool,
    /// Image copied into the region before leaking it on shutdown.
    pub leak_image_path: Option<PathBuf>,
}

/// Validated render process configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub process_name: ProcessPattern,
    pub signal: Signal,
}

/// Validated slideshow configuration.
#[derive(Debug, Clone)]
pub struct SlideshowConfig {
    pub interval_secs: u64,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub render: RenderConfig,
    pub slideshow: SlideshowConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    /// Returns HardValidationError for any invalid fields.
    pub fn load_file(path: impl AsRef<Path>) -> AmbienceResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AmbienceError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| AmbienceError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> AmbienceResult<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| AmbienceError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawConfig) -> AmbienceResult<Config> {
        Ok(Config {
            source: Self::validate_source(raw.source)?,
            store: Self::validate_store(raw.store)?,
            render: Self::validate_render(raw.render)?,
            slideshow: Self::validate_slideshow(raw.slideshow)?,
        })
    }

    fn validate_source(raw: RawSourceConfig) -> AmbienceResult<SourceConfig> {
        let kind = match (raw.url, raw.directory) {
            (Some(url), None) => {
                if url.trim().is_empty() {
                    return Err(HardValidationError::InvalidFieldValue {
                        field: "url",
                        value: url,
                        reason: "Image service URL cannot be empty".to_string(),
                    }
                    .into());
                }
                SourceKind::Http { url }
            }
            (None, Some(directory)) => {
                let path = PathBuf::from(&directory);
                if !path.is_dir() {
                    return Err(HardValidationError::InvalidFieldValue {
                        field: "directory",
                        value: directory,
                        reason: "Image directory does not exist".to_string(),
                    }
                    .into());
                }
                SourceKind::Directory { path }
            }
            (None, None) => {
                return Err(HardValidationError::MissingRequiredField {
                    field: "url",
                    context: "source (set either url or directory)".to_string(),
                }
                .into());
            }
            (Some(url), Some(_)) => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "url",
                    value: url,
                    reason: "Set either url or directory, not both".to_string(),
                }
                .into());
            }
        };

        if raw.target_width < IMG_MIN_SIZE_PX || raw.target_height < IMG_MIN_SIZE_PX {
            return Err(HardValidationError::InvalidFieldValue {
                field: "target_width",
                value: format!("{}x{}", raw.target_width, raw.target_height),
                reason: format!(
                    "Target width and height must be at least {}x{}",
                    IMG_MIN_SIZE_PX, IMG_MIN_SIZE_PX
                ),
            }
            .into());
        }

        if raw.client_id.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "client_id",
                value: raw.client_id,
                reason: "Client id cannot be empty".to_string(),
            }
            .into());
        }

        Ok(SourceConfig {
            kind,
            client_id: raw.client_id,
            target_width: raw.target_width,
            target_height: raw.target_height,
            embed_qr: raw.embed_qr,
            request_standalone_qr: raw.request_standalone_qr,
            request_metadata: raw.request_metadata,
        })
    }

    fn validate_store(raw: RawStoreConfig) -> AmbienceResult<StoreConfig> {
        let name = RegionName::new(raw.name)?;
        let max_size = RegionCapacity::new(raw.max_size_bytes)?;

        let leak_image_path = raw.leak_image_path.map(PathBuf::from);
        if raw.leak_on_exit {
            let Some(path) = leak_image_path.as_deref() else {
                return Err(HardValidationError::MissingRequiredField {
                    field: "leak_image_path",
                    context: "store (required when leak_on_exit is set)".to_string(),
                }
                .into());
            };
            Self::validate_leak_image(path, max_size)?;
        }

        Ok(StoreConfig {
            name,
            max_size,
            leak_on_exit: raw.leak_on_exit,
            leak_image_path,
        })
    }

    /// The leak image must be a non-empty regular file that fits the region.
    fn validate_leak_image(path: &Path, max_size: RegionCapacity) -> Result<(), HardValidationError> {
        let invalid = |reason: String| HardValidationError::LeakImageInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let metadata = std::fs::metadata(path).map_err(|e| invalid(e.to_string()))?;
        if !metadata.is_file() {
            return Err(invalid("not a regular file".to_string()));
        }
        if metadata.len() == 0 {
            return Err(invalid("file is empty".to_string()));
        }
        if metadata.len() > u64::from(max_size) {
            return Err(invalid(format!(
                "{} bytes does not fit region capacity {}",
                metadata.len(),
                max_size
            )));
        }
        Ok(())
    }

    fn validate_render(raw: RawRenderConfig) -> AmbienceResult<RenderConfig> {
        let Some(process_name) = raw.process_name else {
            return Err(HardValidationError::MissingRequiredField {
                field: "process_name",
                context: "render".to_string(),
            }
            .into());
        };
        let process_name = ProcessPattern::new(process_name)?;

        let signal = parse_signal(&raw.signal).ok_or_else(|| HardValidationError::InvalidFieldValue {
            field: "signal",
            value: raw.signal.clone(),
            reason: "Unknown signal name".to_string(),
        })?;

        if signal == Signal::SIGKILL || signal == Signal::SIGSTOP {
            return Err(HardValidationError::InvalidFieldValue {
                field: "signal",
                value: raw.signal,
                reason: "Notification signal must be catchable".to_string(),
            }
            .into());
        }

        Ok(RenderConfig {
            process_name,
            signal,
        })
    }

    fn validate_slideshow(raw: RawSlideshowConfig) -> AmbienceResult<SlideshowConfig> {
        if raw.interval_secs == 0 || raw.interval_secs > SLIDESHOW_INTERVAL_MAX_SECS {
            return Err(HardValidationError::InvalidFieldValue {
                field: "interval_secs",
                value: raw.interval_secs.to_string(),
                reason: format!("Must be between 1 and {} seconds", SLIDESHOW_INTERVAL_MAX_SECS),
            }
            .into());
        }

        Ok(SlideshowConfig {
            interval_secs: raw.interval_secs,
        })
    }
}

/// Accepts `SIGUSR1` as well as `USR1`.
fn parse_signal(name: &str) -> Option<Signal> {
    let name = name.trim().to_ascii_uppercase();
    if name.starts_with("SIG") {
        Signal::from_str(&name).ok()
    } else {
        Signal::from_str(&format!("SIG{}", name)).ok()
    }
}

//! Ambience Core Library
//!
//! Hand-off between the slideshow daemon and the independent render process:
//! a growable named shared memory region holding the latest image, and a
//! notifier that finds the render process in the process table and signals
//! it. Also carries the daemon's configuration parsing.

pub mod config;
pub mod error;
pub mod process;
pub mod shm;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, RenderConfig, SlideshowConfig, SourceConfig, SourceKind, StoreConfig};
pub use error::{AmbienceError, AmbienceResult, HardValidationError, NotifyError, SharedMemoryError};
pub use process::{ProcFs, ProcessNotifier, ProcessTable};
pub use shm::{ImageStore, SharedRegion};
pub use types::{ProcessId, ProcessPattern, RegionCapacity, RegionName};

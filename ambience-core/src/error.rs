// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for ambience.
//!
//! Explicit enum error types, one per subsystem, joined by [`AmbienceError`].
//! No `Box<dyn Error>`, no `anyhow::Result` inside the library.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::types::ProcessId;

/// Top-level error type for the ambience daemon.
#[derive(Debug, Error)]
pub enum AmbienceError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Shared Memory Errors
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    // =========================================================================
    // Render Process Notification Errors
    // =========================================================================
    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors prevent the daemon from starting.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Region capacity out of bounds: {bytes} bytes (min: {min}, max: {max})")]
    CapacityOutOfBounds { bytes: u64, min: u64, max: u64 },

    #[error("Leak image is not a usable file: {path} - {reason}")]
    LeakImageInvalid { path: PathBuf, reason: String },
}

/// Shared memory errors.
///
/// `CreateFailed`, `MapFailed` and `NotFound` are resource errors raised while
/// opening. Everything else is a per-write failure that leaves the region
/// contents untouched.
#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("Failed to create shared memory region: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Shared memory region not found: {name}")]
    NotFound { name: String },

    #[error("Failed to resize shared memory region {name} to {requested} bytes: {reason}")]
    ResizeFailed {
        name: String,
        requested: usize,
        reason: String,
    },

    #[error("Payload of {size} bytes exceeds region capacity of {max} bytes")]
    CapacityExceeded { size: usize, max: usize },

    #[error("Region is read-only: {name}")]
    ReadOnly { name: String },

    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Source is not a regular file: {path}")]
    NotARegularFile { path: PathBuf },

    #[error("Source file is empty: {path}")]
    EmptySource { path: PathBuf },

    #[error("Short read from {path}: expected {expected} bytes, got {actual}")]
    ShortRead {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render process notification errors. None of these are fatal to the daemon.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("No process matching '{pattern}', no signal sent")]
    NotFound { pattern: String },

    #[error("Process matching '{pattern}' vanished again after re-scan (pid {pid}), it may be crash looping")]
    StaleAfterRetry { pattern: String, pid: ProcessId },

    #[error("Failed to deliver signal to '{pattern}' (pid {pid}): {errno}")]
    DeliveryFailed {
        pattern: String,
        pid: ProcessId,
        errno: Errno,
    },

    #[error("Failed to read process table: {reason}")]
    ProcTable { reason: String },
}

/// Result type alias using AmbienceError.
pub type AmbienceResult<T> = Result<T, AmbienceError>;

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Every type checks its invariants at construction, so a value that exists
//! is a value that can be handed to the OS.

use std::fmt;

use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Smallest capacity the daemon accepts for the image region: 2 MB.
pub const MIN_REGION_CAPACITY: u64 = 2 * 1024 * 1024;
/// Largest capacity the daemon accepts for the image region: 1 GB.
pub const MAX_REGION_CAPACITY: u64 = 1024 * 1024 * 1024;

/// Longest name accepted for a shared memory object (NAME_MAX).
const MAX_REGION_NAME_LEN: usize = 255;

/// Validated shared memory object name.
///
/// Stored without the leading `/`; [`RegionName::os_name`] adds it. Must be
/// non-empty, at most 255 bytes, and free of `/` and NUL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionName(String);

impl RegionName {
    /// Create a new RegionName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "region_name",
                value: name,
                reason: "Region name cannot be empty".to_string(),
            });
        }

        if name.len() > MAX_REGION_NAME_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "region_name",
                value: name.clone(),
                reason: format!(
                    "Region name too long: {} bytes (max {})",
                    name.len(),
                    MAX_REGION_NAME_LEN
                ),
            });
        }

        if name.contains('/') || name.contains('\0') {
            return Err(HardValidationError::InvalidFieldValue {
                field: "region_name",
                value: name,
                reason: "Region name must not contain '/' or NUL".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get the bare name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name as passed to `shm_open`, with the leading slash.
    pub fn os_name(&self) -> String {
        format!("/{}", self.0)
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RegionName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionName> for String {
    fn from(name: RegionName) -> Self {
        name.0
    }
}

/// Byte pattern searched for in a process command line.
///
/// Non-empty and NUL-free: the command line itself is NUL-separated, so a
/// pattern holding NUL would straddle arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessPattern(String);

impl ProcessPattern {
    /// Create a new ProcessPattern with validation.
    pub fn new(pattern: impl Into<String>) -> Result<Self, HardValidationError> {
        let pattern = pattern.into();

        if pattern.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_name",
                value: pattern,
                reason: "Process name cannot be empty".to_string(),
            });
        }

        if pattern.contains('\0') {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_name",
                value: pattern.replace('\0', "\\0"),
                reason: "Process name must not contain NUL".to_string(),
            });
        }

        Ok(Self(pattern))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// True if the pattern occurs anywhere in `haystack`, NULs included.
    pub fn matches(&self, haystack: &[u8]) -> bool {
        let needle = self.as_bytes();
        haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
    }
}

impl fmt::Display for ProcessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ProcessPattern {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProcessPattern> for String {
    fn from(pattern: ProcessPattern) -> Self {
        pattern.0
    }
}

/// Validated capacity cap for the image region, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct RegionCapacity(u64);

impl RegionCapacity {
    /// Create a new RegionCapacity with bounds validation.
    pub fn new(bytes: u64) -> Result<Self, HardValidationError> {
        if !(MIN_REGION_CAPACITY..=MAX_REGION_CAPACITY).contains(&bytes) {
            return Err(HardValidationError::CapacityOutOfBounds {
                bytes,
                min: MIN_REGION_CAPACITY,
                max: MAX_REGION_CAPACITY,
            });
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegionCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % (1024 * 1024) == 0 {
            write!(f, "{}MB", self.0 / (1024 * 1024))
        } else {
            write!(f, "{}B", self.0)
        }
    }
}

impl TryFrom<u64> for RegionCapacity {
    type Error = HardValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionCapacity> for u64 {
    fn from(capacity: RegionCapacity) -> Self {
        capacity.0
    }
}

/// Validated process ID.
/// Must be positive: 0 and negatives address process groups in `kill(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Create a new ProcessId with validation.
    pub fn new(pid: u32) -> Result<Self, HardValidationError> {
        if pid == 0 || pid > i32::MAX as u32 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_id",
                value: pid.to_string(),
                reason: "Process ID must be in 1..=i32::MAX".to_string(),
            });
        }
        Ok(Self(pid))
    }

    /// Get the inner PID value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// PID as understood by nix signal delivery.
    pub fn as_pid(&self) -> Pid {
        Pid::from_raw(self.0 as i32)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ProcessId> for u32 {
    fn from(pid: ProcessId) -> Self {
        pid.0
    }
}

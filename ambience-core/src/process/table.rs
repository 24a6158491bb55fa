//! Process table access.
//!
//! [`ProcessTable`] is the seam between process scanning and the OS. [`ProcFs`]
//! reads `/proc` and delivers signals with `kill(2)`.

use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};

use crate::error::NotifyError;
use crate::types::ProcessId;

/// Enumerates processes, reads their command lines and signals them.
pub trait ProcessTable {
    /// Live process ids other than the caller's own, in ascending order.
    fn pids(&self) -> Result<Vec<ProcessId>, NotifyError>;

    /// Raw command line, arguments separated by NUL. `None` if the process
    /// is gone or unreadable.
    fn cmdline(&self, pid: ProcessId) -> Option<Vec<u8>>;

    /// Deliver `signal` to `pid`. `Errno::ESRCH` means no such process.
    fn signal(&self, pid: ProcessId, signal: Signal) -> Result<(), Errno>;
}

/// `/proc` backed process table.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read process entries from another procfs mount.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn pids(&self) -> Result<Vec<ProcessId>, NotifyError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| NotifyError::ProcTable {
            reason: format!("{}: {}", self.root.display(), e),
        })?;

        let own_pid = std::process::id();
        let mut pids: Vec<ProcessId> = entries
            .flatten()
            .filter_map(|entry| {
                // Only numeric directories are processes (skips cpuinfo, self, ...)
                let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
                ProcessId::new(pid).ok()
            })
            .filter(|pid| pid.value() != own_pid)
            .collect();

        pids.sort_unstable_by_key(|pid| pid.value());
        Ok(pids)
    }

    fn cmdline(&self, pid: ProcessId) -> Option<Vec<u8>> {
        // Process might have terminated since the directory listing
        std::fs::read(self.root.join(pid.to_string()).join("cmdline")).ok()
    }

    fn signal(&self, pid: ProcessId, sig: Signal) -> Result<(), Errno> {
        signal::kill(pid.as_pid(), sig)
    }
}

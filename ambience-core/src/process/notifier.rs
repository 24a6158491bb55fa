// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Render process notification with stale pid recovery.
//!
//! The render process is addressed by a command-line pattern. Its pid is
//! cached between notifications and re-resolved at most once per call when
//! the cached process is gone.

use nix::errno::Errno;
use nix::sys::signal::Signal;

use crate::error::NotifyError;
use crate::process::{scan, ProcFs, ProcessTable};
use crate::types::{ProcessId, ProcessPattern};

/// Re-scans allowed per notification after a "no such process" delivery.
pub const MAX_STALE_RETRIES: usize = 1;

/// Signal the process matching `pattern`, starting from `cached` if known.
///
/// Returns the pid actually signalled. A delivery hitting `ESRCH` drops the
/// candidate and rescans; after [`MAX_STALE_RETRIES`] rescans the next
/// `ESRCH` is final. Any other delivery error is returned immediately.
pub fn signal_single<T: ProcessTable + ?Sized>(
    table: &T,
    sig: Signal,
    pattern: &ProcessPattern,
    cached: Option<ProcessId>,
) -> Result<ProcessId, NotifyError> {
    let mut candidate = cached;
    let mut retries = 0;

    loop {
        let pid = match candidate {
            Some(pid) => pid,
            None => scan(table, pattern)?,
        };

        match table.signal(pid, sig) {
            Ok(()) => {
                tracing::debug!(pid = %pid, pattern = %pattern, signal = %sig, "Signal delivered");
                return Ok(pid);
            }
            Err(Errno::ESRCH) if retries < MAX_STALE_RETRIES => {
                tracing::info!(
                    pid = %pid,
                    pattern = %pattern,
                    "Known pid is no longer valid (crashed?), searching for a new one"
                );
                retries += 1;
                candidate = None;
            }
            Err(Errno::ESRCH) => {
                tracing::warn!(
                    pid = %pid,
                    pattern = %pattern,
                    retries = retries,
                    "Signal failed after retrying, process may be crash looping"
                );
                return Err(NotifyError::StaleAfterRetry {
                    pattern: pattern.to_string(),
                    pid,
                });
            }
            Err(errno) => {
                return Err(NotifyError::DeliveryFailed {
                    pattern: pattern.to_string(),
                    pid,
                    errno,
                });
            }
        }
    }
}

/// Notifies the render process, caching its pid between calls.
pub struct ProcessNotifier<T: ProcessTable = ProcFs> {
    table: T,
    pattern: ProcessPattern,
    signal: Signal,
    cached: Option<ProcessId>,
}

impl ProcessNotifier<ProcFs> {
    /// Notifier over the live `/proc` table.
    pub fn new(pattern: ProcessPattern, signal: Signal) -> Self {
        Self::with_table(ProcFs::new(), pattern, signal)
    }
}

impl<T: ProcessTable> ProcessNotifier<T> {
    pub fn with_table(table: T, pattern: ProcessPattern, signal: Signal) -> Self {
        Self {
            table,
            pattern,
            signal,
            cached: None,
        }
    }

    pub fn pattern(&self) -> &ProcessPattern {
        &self.pattern
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn cached_pid(&self) -> Option<ProcessId> {
        self.cached
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Send the configured signal to the render process.
    ///
    /// Success caches the signalled pid. Not-found and stale outcomes clear
    /// the cache; other delivery failures keep it, the process still exists.
    pub fn notify(&mut self) -> Result<ProcessId, NotifyError> {
        match signal_single(&self.table, self.signal, &self.pattern, self.cached) {
            Ok(pid) => {
                self.cached = Some(pid);
                Ok(pid)
            }
            Err(e @ NotifyError::DeliveryFailed { .. }) => Err(e),
            Err(e) => {
                self.cached = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeTable;

    fn pid(value: u32) -> ProcessId {
        ProcessId::new(value).unwrap()
    }

    fn notifier(table: FakeTable) -> ProcessNotifier<FakeTable> {
        ProcessNotifier::with_table(table, ProcessPattern::new("render").unwrap(), Signal::SIGUSR1)
    }

    #[test]
    fn test_single_match_is_signalled_and_cached() {
        let mut n = notifier(FakeTable::new(&[(10, "bash\0"), (42, "render\0")]));
        assert_eq!(n.notify().unwrap(), pid(42));
        assert_eq!(n.cached_pid(), Some(pid(42)));
        assert_eq!(n.table().scans(), 1);
        assert_eq!(n.table().deliveries(), vec![(42, Signal::SIGUSR1)]);
    }

    #[test]
    fn test_cached_pid_skips_scan() {
        let mut n = notifier(FakeTable::new(&[(42, "render\0")]));
        n.notify().unwrap();
        n.notify().unwrap();
        assert_eq!(n.table().scans(), 1);
        assert_eq!(n.table().attempts(), 2);
    }

    #[test]
    fn test_no_match_sends_nothing() {
        let mut n = notifier(FakeTable::new(&[(10, "bash\0")]));
        assert!(matches!(n.notify(), Err(NotifyError::NotFound { .. })));
        assert_eq!(n.table().attempts(), 0);
        assert_eq!(n.cached_pid(), None);
    }

    #[test]
    fn test_stale_cache_rescans_once_and_finds_new_pid() {
        let table = FakeTable::new(&[(42, "render\0")]);
        let mut n = notifier(table);
        n.notify().unwrap();

        // Render process restarted under a new pid
        n.table().kill_process(42);
        n.table().add_process(77, "render\0");

        assert_eq!(n.notify().unwrap(), pid(77));
        assert_eq!(n.cached_pid(), Some(pid(77)));
        assert_eq!(n.table().scans(), 2);
    }

    #[test]
    fn test_stale_cache_without_replacement_fails_not_found() {
        let table = FakeTable::new(&[]);
        let result = signal_single(&table, Signal::SIGUSR1, &ProcessPattern::new("render").unwrap(), Some(pid(42)));
        assert!(matches!(result, Err(NotifyError::NotFound { .. })));
        assert_eq!(table.scans(), 1);
        assert_eq!(table.attempts(), 1);
    }

    #[test]
    fn test_stale_twice_gives_up_after_exactly_one_retry() {
        // Listed in the table but already exited: every delivery hits ESRCH
        let table = FakeTable::new(&[(50, "render\0")]);
        table.fail_with(50, Errno::ESRCH);

        let result = signal_single(&table, Signal::SIGUSR1, &ProcessPattern::new("render").unwrap(), Some(pid(42)));
        match result {
            Err(NotifyError::StaleAfterRetry { pid: stale, .. }) => assert_eq!(stale, pid(50)),
            other => panic!("expected StaleAfterRetry, got {:?}", other),
        }
        assert_eq!(table.scans(), MAX_STALE_RETRIES);
        assert_eq!(table.attempts(), 1 + MAX_STALE_RETRIES);
    }

    #[test]
    fn test_stale_after_fresh_scan_also_retries_once() {
        let table = FakeTable::new(&[(50, "render\0")]);
        table.fail_with(50, Errno::ESRCH);

        let result = signal_single(&table, Signal::SIGUSR1, &ProcessPattern::new("render").unwrap(), None);
        assert!(matches!(result, Err(NotifyError::StaleAfterRetry { .. })));
        assert_eq!(table.scans(), 2);
        assert_eq!(table.attempts(), 2);
    }

    #[test]
    fn test_permission_error_is_not_retried() {
        let mut n = notifier(FakeTable::new(&[(42, "render\0")]));
        n.notify().unwrap();
        n.table().fail_with(42, Errno::EPERM);

        match n.notify() {
            Err(NotifyError::DeliveryFailed { pid: p, errno, .. }) => {
                assert_eq!(p, pid(42));
                assert_eq!(errno, Errno::EPERM);
            }
            other => panic!("expected DeliveryFailed, got {:?}", other),
        }
        assert_eq!(n.table().scans(), 1);
        assert_eq!(n.table().attempts(), 2);
        assert_eq!(n.cached_pid(), Some(pid(42)));
    }

    #[test]
    fn test_failed_notify_clears_cache() {
        let mut n = notifier(FakeTable::new(&[(42, "render\0")]));
        n.notify().unwrap();
        n.table().kill_process(42);
        assert!(n.notify().is_err());
        assert_eq!(n.cached_pid(), None);
    }

    #[test]
    fn test_duplicates_converge_before_signal() {
        let mut n = notifier(FakeTable::new(&[(10, "render\0"), (11, "render\0")]));
        assert_eq!(n.notify().unwrap(), pid(11));
        assert_eq!(
            n.table().deliveries(),
            vec![(10, Signal::SIGKILL), (11, Signal::SIGUSR1)]
        );
    }
}

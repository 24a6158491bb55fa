//! Command-line scan for the render process.

use nix::sys::signal::Signal;

use crate::error::NotifyError;
use crate::process::ProcessTable;
use crate::types::{ProcessId, ProcessPattern};

/// Find the process whose command line contains `pattern`.
///
/// Command lines are matched as raw bytes, NUL separators included. When
/// several processes match, each earlier match is SIGKILLed as a newer one is
/// found and the last match is returned, so there is at most one survivor.
pub fn scan<T: ProcessTable + ?Sized>(
    table: &T,
    pattern: &ProcessPattern,
) -> Result<ProcessId, NotifyError> {
    let mut found: Option<ProcessId> = None;

    for pid in table.pids()? {
        let Some(cmdline) = table.cmdline(pid) else {
            continue;
        };
        if !pattern.matches(&cmdline) {
            continue;
        }

        tracing::debug!(pid = %pid, pattern = %pattern, "Process matches");

        if let Some(previous) = found {
            tracing::warn!(
                kept = %pid,
                killed = %previous,
                pattern = %pattern,
                "Multiple processes match, killing the older one"
            );
            if let Err(errno) = table.signal(previous, Signal::SIGKILL) {
                tracing::warn!(pid = %previous, error = %errno, "Can't kill duplicate process");
            }
        }

        found = Some(pid);
    }

    found.ok_or_else(|| NotifyError::NotFound {
        pattern: pattern.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeTable;

    fn pattern(s: &str) -> ProcessPattern {
        ProcessPattern::new(s).unwrap()
    }

    #[test]
    fn test_single_match() {
        let table = FakeTable::new(&[(10, "bash\0"), (20, "/opt/ambience-render\0--fb0\0")]);
        assert_eq!(scan(&table, &pattern("ambience-render")).unwrap().value(), 20);
        assert!(table.deliveries().is_empty());
    }

    #[test]
    fn test_match_inside_later_argument() {
        let table = FakeTable::new(&[(5, "python3\0-u\0/srv/render.py\0")]);
        assert_eq!(scan(&table, &pattern("render.py")).unwrap().value(), 5);
    }

    #[test]
    fn test_no_match() {
        let table = FakeTable::new(&[(10, "bash\0"), (11, "")]);
        assert!(matches!(
            scan(&table, &pattern("render")),
            Err(NotifyError::NotFound { .. })
        ));
        assert!(table.deliveries().is_empty());
    }

    #[test]
    fn test_duplicate_keeps_latest_and_kills_older() {
        let table = FakeTable::new(&[(10, "render\0"), (30, "render\0"), (20, "vim\0")]);
        let pid = scan(&table, &pattern("render")).unwrap();
        assert_eq!(pid.value(), 30);
        assert_eq!(table.deliveries(), vec![(10, Signal::SIGKILL)]);
        assert!(!table.is_alive(10));
        assert!(table.is_alive(30));
    }

    #[test]
    fn test_triplicate_converges_to_one() {
        let table = FakeTable::new(&[(1, "render\0"), (2, "render\0"), (3, "render\0")]);
        let pid = scan(&table, &pattern("render")).unwrap();
        assert_eq!(pid.value(), 3);
        assert_eq!(
            table.deliveries(),
            vec![(1, Signal::SIGKILL), (2, Signal::SIGKILL)]
        );
    }

    #[test]
    fn test_vanished_entry_skipped() {
        let table = FakeTable::new(&[(10, "render\0")]);
        table.hide_cmdline(10);
        assert!(scan(&table, &pattern("render")).is_err());
    }
}

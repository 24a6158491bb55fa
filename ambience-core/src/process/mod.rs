// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Render process discovery and signalling.
//!
//! Finds the render process by command-line substring in the process table,
//! converges duplicates to a single instance and signals it, re-resolving a
//! stale pid at most once.

mod notifier;
mod scan;
mod table;

pub use notifier::{signal_single, ProcessNotifier, MAX_STALE_RETRIES};
pub use scan::scan;
pub use table::{ProcFs, ProcessTable};

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared memory image hand-off.
//!
//! The daemon owns one named POSIX shared memory object holding the latest
//! image; the render process maps the same name after being signalled.

mod region;
mod store;

pub use region::SharedRegion;
pub use store::ImageStore;

// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! ImageStore - size-elastic latest-image buffer in shared memory.
//!
//! Writes grow the region on demand up to a capacity cap and never shrink it.
//! A smaller image after a larger one leaves the tail of the previous image in
//! place; readers find the end of the image from its own format.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::SharedMemoryError;
use crate::shm::SharedRegion;
use crate::types::RegionName;

/// Latest-image store backed by a named [`SharedRegion`].
pub struct ImageStore {
    region: SharedRegion,
    /// Writes larger than this are rejected without touching the region.
    capacity: usize,
    /// Length of the last successful write in this session.
    content_len: usize,
}

impl ImageStore {
    /// Create or take over the named region with a 1-byte mapping.
    ///
    /// # Errors
    /// Returns a resource error if the object cannot be created, sized or
    /// mapped. Nothing is left open on failure.
    pub fn open(name: &RegionName, max_bytes: usize) -> Result<Self, SharedMemoryError> {
        if max_bytes < SharedRegion::MIN_SIZE {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: "Capacity must be at least 1 byte".to_string(),
            });
        }

        let region = SharedRegion::create(name, SharedRegion::MIN_SIZE)?;

        tracing::info!(name = %name, capacity = max_bytes, "Opened image store");

        Ok(Self {
            region,
            capacity: max_bytes,
            content_len: 0,
        })
    }

    /// Attach read-only to a region some other process created (or leaked).
    ///
    /// Capacity and content length are both the current region size.
    pub fn attach(name: &RegionName) -> Result<Self, SharedMemoryError> {
        let region = SharedRegion::open_existing(name)?;
        let size = region.size();
        Ok(Self {
            region,
            capacity: size,
            content_len: size,
        })
    }

    /// Replace the stored image with `bytes`.
    ///
    /// Grows the region first when needed; the copy only happens once the
    /// region is large enough, so a failure leaves the old contents intact.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SharedMemoryError> {
        if bytes.len() > self.capacity {
            tracing::warn!(
                name = %self.region.name(),
                size = bytes.len(),
                capacity = self.capacity,
                "Rejected image larger than region capacity"
            );
            return Err(SharedMemoryError::CapacityExceeded {
                size: bytes.len(),
                max: self.capacity,
            });
        }

        self.ensure_size(bytes.len())?;
        self.region.write_at_start(bytes)?;
        self.content_len = bytes.len();

        tracing::debug!(
            name = %self.region.name(),
            len = bytes.len(),
            size = self.region.size(),
            "Stored image"
        );
        Ok(())
    }

    /// Copy the contents of the file at `path` into the region.
    ///
    /// Returns the number of bytes copied.
    pub fn write_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize, SharedMemoryError> {
        let path = path.as_ref();

        let mut file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SharedMemoryError::SourceNotFound {
                path: path.to_path_buf(),
            },
            _ => SharedMemoryError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let metadata = file.metadata().map_err(|e| SharedMemoryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        if !metadata.is_file() {
            return Err(SharedMemoryError::NotARegularFile {
                path: path.to_path_buf(),
            });
        }

        if metadata.len() == 0 {
            return Err(SharedMemoryError::EmptySource {
                path: path.to_path_buf(),
            });
        }

        let len = usize::try_from(metadata.len())
            .ok()
            .filter(|len| *len <= self.capacity)
            .ok_or(SharedMemoryError::CapacityExceeded {
                size: metadata.len() as usize,
                max: self.capacity,
            })?;

        self.fill_from(&mut file, len, path)?;
        tracing::debug!(name = %self.region.name(), path = %path.display(), len = len, "Stored image from file");
        Ok(len)
    }

    /// Read exactly `len` bytes from `reader` straight into the region.
    ///
    /// A failed or short read leaves the region partly overwritten, so the
    /// stored image is dropped (`content_len` becomes 0).
    fn fill_from(&mut self, reader: &mut impl Read, len: usize, path: &Path) -> Result<(), SharedMemoryError> {
        self.ensure_size(len)?;

        // SAFETY: the region is writable (ensure_size succeeded) and is at
        // least `len` bytes; readers only look after being notified.
        let dest = unsafe { &mut self.region.as_mut_slice()[..len] };
        let result = match read_full(reader, dest) {
            Ok(read) if read == len => Ok(()),
            Ok(read) => Err(SharedMemoryError::ShortRead {
                path: path.to_path_buf(),
                expected: len,
                actual: read,
            }),
            Err(e) => Err(SharedMemoryError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        };

        match result {
            Ok(()) => self.content_len = len,
            Err(_) => {
                tracing::warn!(name = %self.region.name(), path = %path.display(), "Partial copy, region contents undefined");
                self.content_len = 0;
            }
        }
        result
    }

    /// Unmap and release the region.
    ///
    /// Without `leak` the name is removed and later attaches fail; processes
    /// already mapping it keep their view. With `leak` the name and its last
    /// contents outlive this process.
    pub fn close(self, leak: bool) {
        tracing::info!(
            name = %self.region.name(),
            size = self.region.size(),
            leak = leak,
            "Closing image store"
        );
        self.region.close(leak);
    }

    pub fn name(&self) -> &RegionName {
        self.region.name()
    }

    /// Current mapped size. Never below 1, never above the capacity.
    pub fn size(&self) -> usize {
        self.region.size()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the image stored last; bytes past it are stale.
    pub fn content_len(&self) -> usize {
        self.content_len
    }

    /// Copy of the whole mapped region, stale tail included.
    pub fn read_all(&self) -> Vec<u8> {
        // SAFETY: single-threaded access within this process
        unsafe { self.region.as_slice() }.to_vec()
    }

    /// Copy of the last stored image.
    pub fn read_latest(&self) -> Vec<u8> {
        // SAFETY: single-threaded access within this process
        unsafe { &self.region.as_slice()[..self.content_len] }.to_vec()
    }

    fn ensure_size(&mut self, len: usize) -> Result<(), SharedMemoryError> {
        let required = len.max(SharedRegion::MIN_SIZE);
        if self.region.size() < required {
            self.region.grow(required)?;
        }
        Ok(())
    }
}

/// Read until `buf` is full or EOF, retrying interrupted reads.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

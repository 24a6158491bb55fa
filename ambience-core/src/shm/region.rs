//! SharedRegion - growable POSIX shared memory wrapper.
//!
//! Wraps `shm_open`, `ftruncate`, `mmap` and `mremap`. All unsafe operations
//! are encapsulated here with bounds checking; callers see sizes and slices.

use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::SharedMemoryError;
use crate::types::RegionName;

/// Permissions of a freshly created object: owner writes, render process reads.
const REGION_MODE: libc::mode_t = 0o644;

/// A mapped shared memory object.
///
/// The mapping always covers the whole object. The creator unlinks the name
/// on drop unless told to leak it; an attacher never unlinks.
pub struct SharedRegion {
    /// Region name, without the leading slash.
    name: RegionName,
    /// Base of the mapping. Valid for as long as `self` lives.
    ptr: NonNull<u8>,
    /// Size of the mapping and of the backing object, in bytes.
    size: usize,
    /// Open descriptor of the shm object, closed on drop.
    fd: i32,
    /// Mapped read-write (creator) or read-only (attacher).
    writable: bool,
    /// Unlink the name on drop.
    unlink_on_drop: bool,
}

// SAFETY: SharedRegion owns its mapping and descriptor; nothing is tied to the
// creating thread.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Smallest mapping: `mmap` rejects zero-length maps.
    pub const MIN_SIZE: usize = 1;

    /// Create (or take over) a named region and size it to `size` bytes.
    ///
    /// An object left behind under the same name is reused and truncated to
    /// `size`. On any failure the descriptor is closed and the name unlinked,
    /// so nothing stays open.
    pub fn create(name: &RegionName, size: usize) -> Result<Self, SharedMemoryError> {
        let size = size.max(Self::MIN_SIZE);
        let c_name = c_name(name)?;

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, REGION_MODE) };
        if fd < 0 {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match map(fd, size, true) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
            writable: true,
            unlink_on_drop: true,
        })
    }

    /// Attach read-only to an existing region, mapping its current size.
    ///
    /// Fails with [`SharedMemoryError::NotFound`] if the name does not resolve.
    pub fn open_existing(name: &RegionName) -> Result<Self, SharedMemoryError> {
        let c_name = c_name(name)?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::ENOENT) {
                return Err(SharedMemoryError::NotFound {
                    name: name.to_string(),
                });
            }
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", errno),
            });
        }

        let size = match object_size(fd) {
            Ok(size) if size >= Self::MIN_SIZE => size,
            Ok(_) => {
                unsafe { libc::close(fd) };
                return Err(SharedMemoryError::MapFailed {
                    reason: format!("region {} has zero length", name),
                });
            }
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(SharedMemoryError::MapFailed {
                    reason: format!("fstat failed: {}", e),
                });
            }
        };

        let ptr = match map(fd, size, false) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Attached to shared memory region");

        Ok(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
            writable: false,
            unlink_on_drop: false,
        })
    }

    /// Remove a region name without mapping it. Missing names are not an error.
    pub fn unlink(name: &RegionName) -> Result<(), SharedMemoryError> {
        let c_name = c_name(name)?;
        // SAFETY: c_name is a valid CString
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() != Some(libc::ENOENT) {
                return Err(SharedMemoryError::CreateFailed {
                    name: name.to_string(),
                    reason: format!("shm_unlink failed: {}", errno),
                });
            }
        }
        Ok(())
    }

    /// Region name as configured.
    pub fn name(&self) -> &RegionName {
        &self.name
    }

    /// Mapped length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Grow the backing object and the mapping to `new_size` bytes.
    ///
    /// Never shrinks: a `new_size` at or below the current size is a no-op.
    /// The base address may move. On failure the object is truncated back to
    /// the last good size and the old mapping stays valid.
    pub fn grow(&mut self, new_size: usize) -> Result<(), SharedMemoryError> {
        if new_size <= self.size {
            return Ok(());
        }
        if !self.writable {
            return Err(SharedMemoryError::ReadOnly {
                name: self.name.to_string(),
            });
        }

        // SAFETY: fd is a valid file descriptor
        if unsafe { libc::ftruncate(self.fd, new_size as libc::off_t) } < 0 {
            return Err(SharedMemoryError::ResizeFailed {
                name: self.name.to_string(),
                requested: new_size,
                reason: format!("ftruncate failed: {}", std::io::Error::last_os_error()),
            });
        }

        // SAFETY: ptr/size describe our current mapping; MREMAP_MAYMOVE keeps
        // the old mapping intact when the call fails.
        let ptr = unsafe {
            libc::mremap(
                self.ptr.as_ptr() as *mut libc::c_void,
                self.size,
                new_size,
                libc::MREMAP_MAYMOVE,
            )
        };

        if ptr == libc::MAP_FAILED {
            let errno = std::io::Error::last_os_error();
            // SAFETY: fd is valid; restores the size the live mapping covers
            if unsafe { libc::ftruncate(self.fd, self.size as libc::off_t) } < 0 {
                tracing::error!(
                    name = %self.name,
                    size = self.size,
                    error = %std::io::Error::last_os_error(),
                    "Failed to restore region size after remap failure"
                );
            }
            return Err(SharedMemoryError::ResizeFailed {
                name: self.name.to_string(),
                requested: new_size,
                reason: format!("mremap failed: {}", errno),
            });
        }

        let Some(ptr) = NonNull::new(ptr as *mut u8) else {
            // The old mapping is gone and a null base cannot be kept; map the
            // object afresh at the new size instead.
            // SAFETY: ptr/new_size describe the mapping mremap just returned
            unsafe { libc::munmap(ptr, new_size) };
            match map(self.fd, new_size, true) {
                Ok(remapped) => {
                    self.ptr = remapped;
                    self.size = new_size;
                    return Ok(());
                }
                Err(e) => {
                    // Nothing is mapped now: an empty read-only region that
                    // drop will not unmap
                    self.size = 0;
                    self.writable = false;
                    return Err(e);
                }
            }
        };

        tracing::debug!(name = %self.name, from = self.size, to = new_size, "Grew shared memory region");

        self.ptr = ptr;
        self.size = new_size;
        Ok(())
    }

    /// Copy `data` to the start of the region.
    pub fn write_at_start(&mut self, data: &[u8]) -> Result<(), SharedMemoryError> {
        if !self.writable {
            return Err(SharedMemoryError::ReadOnly {
                name: self.name.to_string(),
            });
        }
        if data.len() > self.size {
            return Err(SharedMemoryError::CapacityExceeded {
                size: data.len(),
                max: self.size,
            });
        }
        // SAFETY: bounds checked above; source and mapping cannot overlap
        // because `data` is borrowed immutably while we hold `&mut self`.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr(), data.len());
        }
        Ok(())
    }

    /// Whole mapping as a byte slice.
    ///
    /// # Safety
    /// Another process may write the region concurrently; caller must ensure
    /// it does not (the notify signal is the only handshake).
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.size)
    }

    /// Whole mapping as a mutable byte slice.
    ///
    /// # Safety
    /// Region must be writable and no other process may access it meanwhile.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size)
    }

    /// Unmap and close. With `leak` the name survives this process.
    pub fn close(mut self, leak: bool) {
        if leak {
            self.unlink_on_drop = false;
            tracing::debug!(name = %self.name, size = self.size, "Leaking shared memory region");
        }
        drop(self);
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size describe the live mapping, if any
        let result = match self.size {
            0 => 0,
            size => unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, size) },
        };
        if result < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }

        // SAFETY: fd was opened during creation
        unsafe { libc::close(self.fd) };

        if self.unlink_on_drop {
            if let Ok(c_name) = CString::new(self.name.os_name()) {
                // SAFETY: c_name is a valid CString
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                tracing::debug!(name = %self.name, "Unlinked shared memory region");
            }
        }
    }
}

fn c_name(name: &RegionName) -> Result<CString, SharedMemoryError> {
    CString::new(name.os_name()).map_err(|e| SharedMemoryError::CreateFailed {
        name: name.to_string(),
        reason: format!("Invalid name: {}", e),
    })
}

fn map(fd: i32, size: usize, writable: bool) -> Result<NonNull<u8>, SharedMemoryError> {
    let prot = if writable {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_READ
    };

    // SAFETY: fd is valid, size is non-zero, offset 0 is valid
    let ptr = unsafe { libc::mmap(std::ptr::null_mut(), size, prot, libc::MAP_SHARED, fd, 0) };

    if ptr == libc::MAP_FAILED {
        return Err(SharedMemoryError::MapFailed {
            reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
        });
    }

    NonNull::new(ptr as *mut u8).ok_or_else(|| SharedMemoryError::MapFailed {
        reason: "mmap returned null".to_string(),
    })
}

fn object_size(fd: i32) -> std::io::Result<usize> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    // SAFETY: fd is valid and stat points to writable storage
    if unsafe { libc::fstat(fd, stat.as_mut_ptr()) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: fstat succeeded, so the struct is initialised
    let stat = unsafe { stat.assume_init() };
    Ok(stat.st_size as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(tag: &str) -> RegionName {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        RegionName::new(format!("ambience_region_{}_{}_{}", tag, std::process::id(), n)).unwrap()
    }

    #[test]
    fn test_create_has_min_size() {
        let name = unique_name("min");
        let region = SharedRegion::create(&name, 0).unwrap();
        assert_eq!(region.size(), SharedRegion::MIN_SIZE);
        assert!(region.is_writable());
    }

    #[test]
    fn test_grow_keeps_contents() {
        let name = unique_name("grow");
        let mut region = SharedRegion::create(&name, 4).unwrap();
        region.write_at_start(b"abcd").unwrap();

        region.grow(64 * 1024).unwrap();
        assert_eq!(region.size(), 64 * 1024);
        let head = unsafe { &region.as_slice()[..4] };
        assert_eq!(head, b"abcd");
    }

    #[test]
    fn test_grow_never_shrinks() {
        let name = unique_name("shrink");
        let mut region = SharedRegion::create(&name, 128).unwrap();
        region.grow(16).unwrap();
        assert_eq!(region.size(), 128);
    }

    #[test]
    fn test_write_beyond_size_rejected() {
        let name = unique_name("bounds");
        let mut region = SharedRegion::create(&name, 2).unwrap();
        assert!(matches!(
            region.write_at_start(b"abc"),
            Err(SharedMemoryError::CapacityExceeded { size: 3, max: 2 })
        ));
    }

    #[test]
    fn test_open_existing_missing() {
        let name = unique_name("missing");
        assert!(matches!(
            SharedRegion::open_existing(&name),
            Err(SharedMemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_attached_region_is_read_only() {
        let name = unique_name("ro");
        let mut owner = SharedRegion::create(&name, 8).unwrap();
        owner.write_at_start(b"hello").unwrap();

        let mut reader = SharedRegion::open_existing(&name).unwrap();
        assert_eq!(reader.size(), 8);
        assert_eq!(unsafe { &reader.as_slice()[..5] }, b"hello");
        assert!(matches!(
            reader.write_at_start(b"x"),
            Err(SharedMemoryError::ReadOnly { .. })
        ));
        assert!(matches!(
            reader.grow(16),
            Err(SharedMemoryError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_drop_unlinks_unless_leaked() {
        let dropped = unique_name("dropped");
        drop(SharedRegion::create(&dropped, 8).unwrap());
        assert!(SharedRegion::open_existing(&dropped).is_err());

        let leaked = unique_name("leaked");
        SharedRegion::create(&leaked, 8).unwrap().close(true);
        assert!(SharedRegion::open_existing(&leaked).is_ok());
        SharedRegion::unlink(&leaked).unwrap();
        assert!(SharedRegion::open_existing(&leaked).is_err());
    }
}

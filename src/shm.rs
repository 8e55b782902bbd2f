//! Low-level POSIX shared memory operations

use crate::error::{Result, ShmJsonError};
use rustix::fd::OwnedFd;
use rustix::fs::{fstat, ftruncate};
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::io;
use std::ptr::NonNull;

const SHM_PREFIX: &str = "/";

/// Prefix of the paired lock name, which is the longer of the two
pub(crate) const LOCK_PREFIX: &str = "/sem_";

/// Longest region name whose lock name still fits NAME_MAX (sem_open reserves 4 bytes)
pub const MAX_NAME_LEN: usize = 251 - (LOCK_PREFIX.len() - 1);

/// Which side of a region a handle is
///
/// Only the owner removes the named objects on teardown; attachers only unmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created the region and its lock
    Owner,
    /// Opened a region someone else created
    Attacher,
}

impl Role {
    #[inline(always)]
    pub fn is_owner(self) -> bool {
        self == Role::Owner
    }
}

/// Check that `name` can be published as both `/<name>` and `/sem_<name>`
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name cannot be empty"
    } else if name.contains('/') {
        "name cannot contain '/'"
    } else if name.contains('\0') {
        "name cannot contain NUL"
    } else if name.len() > MAX_NAME_LEN {
        "name too long"
    } else {
        return Ok(());
    };

    Err(ShmJsonError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Handle to a mapped shared memory region
pub struct SharedRegion {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: String,
    role: Role,
}

// SAFETY: the mapping lives as long as the handle; access to its bytes is
// serialized by the region's named lock
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create a region as its owner
    ///
    /// Any stale object left under the same name is unlinked first. The new
    /// object is sized to `size` bytes, mapped and zeroed.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        validate_name(name)?;
        let shm_name = format!("{}{}", SHM_PREFIX, name);
        let creation_failure = |source: io::Error| ShmJsonError::CreationFailure {
            name: name.to_string(),
            source,
        };

        match shm_unlink(shm_name.as_str()) {
            Ok(()) => tracing::debug!(name = %name, "Removed stale shared memory object"),
            Err(Errno::NOENT) => {}
            // A stale object we cannot remove makes the exclusive create below fail
            Err(e) => tracing::warn!(
                name = %name,
                error = %e,
                "Failed to remove stale shared memory object"
            ),
        }

        let fd = shm_open(
            shm_name.as_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH | Mode::WOTH,
        )
        .map_err(|e| creation_failure(e.into()))?;

        let mapped = ftruncate(&fd, size as u64)
            .map_err(io::Error::from)
            .and_then(|()| map_shared(&fd, size));

        let addr = match mapped {
            Ok(addr) => addr,
            Err(e) => {
                let _ = shm_unlink(shm_name.as_str());
                return Err(creation_failure(e));
            }
        };

        // Zero initialize
        unsafe {
            std::ptr::write_bytes(addr.as_ptr(), 0, size);
        }

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            role: Role::Owner,
        })
    }

    /// Open an existing region as an attacher
    ///
    /// `size` must match the owner's. The object size is compared but a
    /// mismatch is only logged.
    pub fn open(name: &str, size: usize) -> Result<Self> {
        validate_name(name)?;
        let shm_name = format!("{}{}", SHM_PREFIX, name);
        let open_failure = |source: io::Error| ShmJsonError::OpenFailure {
            name: name.to_string(),
            source,
        };

        let fd = shm_open(shm_name.as_str(), ShmOFlags::RDWR, Mode::empty())
            .map_err(|e| open_failure(e.into()))?;

        let stat = fstat(&fd).map_err(|e| open_failure(e.into()))?;
        let actual = stat.st_size as u64;
        if actual != size as u64 {
            tracing::warn!(
                name = %name,
                expected = size,
                actual = actual,
                "Shared memory object size differs from requested mapping size"
            );
        }

        let addr = map_shared(&fd, size).map_err(open_failure)?;

        tracing::debug!(name = %name, size = size, "Opened shared memory region");

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            role: Role::Attacher,
        })
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the region
    ///
    /// # Safety
    /// The caller must hold the region's lock so no other participant is
    /// writing the same bytes.
    #[inline]
    pub unsafe fn read_at(&self, offset: usize, buf: &mut [u8]) {
        assert!(
            offset.checked_add(buf.len()).is_some_and(|end| end <= self.size),
            "read outside shared memory region"
        );
        std::ptr::copy_nonoverlapping(self.addr.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
    }

    /// Copy `data` into the region starting at `offset`
    ///
    /// # Safety
    /// The caller must hold the region's lock.
    #[inline]
    pub unsafe fn write_at(&self, offset: usize, data: &[u8]) {
        assert!(
            offset.checked_add(data.len()).is_some_and(|end| end <= self.size),
            "write outside shared memory region"
        );
        std::ptr::copy_nonoverlapping(data.as_ptr(), self.addr.as_ptr().add(offset), data.len());
    }

    /// Get size of the mapping
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the name of the region
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Unmap, and unlink the name if this handle is the owner
    pub fn close(self) {
        drop(self);
    }
}

fn map_shared(fd: &OwnedFd, size: usize) -> io::Result<NonNull<u8>> {
    let addr = unsafe {
        mmap(
            std::ptr::null_mut(),
            size,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::SHARED,
            fd,
            0,
        )?
    };

    NonNull::new(addr.cast::<u8>())
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // Unmap memory
        if let Err(e) = unsafe { munmap(self.addr.as_ptr().cast(), self.size) } {
            tracing::warn!(name = %self.name, error = %e, "Failed to unmap shared memory");
        }

        // If owner, unlink the shared memory
        if self.role.is_owner() {
            let shm_name = format!("{}{}", SHM_PREFIX, self.name);
            match shm_unlink(shm_name.as_str()) {
                Ok(()) => tracing::debug!(name = %self.name, "Unlinked shared memory region"),
                Err(Errno::NOENT) => {}
                Err(e) => {
                    tracing::warn!(name = %self.name, error = %e, "Failed to unlink shared memory")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        format!("shmjson_region_{}_{}", tag, std::process::id())
    }

    #[test]
    fn test_create_and_open() {
        let name = unique("create_open");
        let size = 4096;

        let owner = SharedRegion::create(&name, size).unwrap();
        assert_eq!(owner.role(), Role::Owner);
        assert_eq!(owner.size(), size);

        unsafe { owner.write_at(100, b"hello") };

        // Open from another "process"
        let attacher = SharedRegion::open(&name, size).unwrap();
        assert_eq!(attacher.role(), Role::Attacher);

        let mut buf = [0u8; 5];
        unsafe { attacher.read_at(100, &mut buf) };
        assert_eq!(&buf, b"hello");

        drop(attacher);
        drop(owner);
    }

    #[test]
    fn test_create_replaces_stale_object() {
        let name = unique("stale");
        let stale = SharedRegion::create(&name, 4096).unwrap();
        unsafe { stale.write_at(0, &[0xAB; 16]) };
        // Leak without unlinking, as a crashed owner would
        std::mem::forget(stale);

        let region = SharedRegion::create(&name, 4096).unwrap();
        let mut buf = [0xFFu8; 16];
        unsafe { region.read_at(0, &mut buf) };
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_create_zeroes_memory() {
        let name = unique("zeroed");
        let region = SharedRegion::create(&name, 1024).unwrap();

        let mut buf = [0xFFu8; 1024];
        unsafe { region.read_at(0, &mut buf) };
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_open_missing_fails() {
        let err = SharedRegion::open(&unique("missing"), 4096).err().unwrap();
        assert!(matches!(err, ShmJsonError::OpenFailure { .. }));
    }

    #[test]
    fn test_owner_close_unlinks() {
        let name = unique("unlink");
        let owner = SharedRegion::create(&name, 4096).unwrap();
        let attacher = SharedRegion::open(&name, 4096).unwrap();

        owner.close();
        assert!(SharedRegion::open(&name, 4096).is_err());

        // Existing mapping stays usable
        unsafe { attacher.write_at(0, &[7]) };
        let mut buf = [0u8; 1];
        unsafe { attacher.read_at(0, &mut buf) };
        assert_eq!(buf[0], 7);
    }

    #[test]
    fn test_attacher_close_keeps_name() {
        let name = unique("attacher_close");
        let _owner = SharedRegion::create(&name, 4096).unwrap();
        SharedRegion::open(&name, 4096).unwrap().close();
        assert!(SharedRegion::open(&name, 4096).is_ok());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("status").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("nul\0byte").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(matches!(
            SharedRegion::create("", 4096),
            Err(ShmJsonError::InvalidName { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_out_of_bounds_write_panics() {
        let region = SharedRegion::create(&unique("bounds"), 64).unwrap();
        unsafe { region.write_at(60, &[0u8; 8]) };
    }
}

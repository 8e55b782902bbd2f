//! Named cross-process lock
//!
//! A POSIX named semaphore with an initial count of one, paired 1:1 with a
//! shared region. Every participant that touches the region's header or
//! payload does so while holding a [`LockGuard`].
//!
//! There is no acquire timeout and no recovery of a lock whose holder died.

use crate::error::{Result, ShmJsonError};
use crate::shm::{validate_name, Role, LOCK_PREFIX};
use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

/// Handle to the named semaphore guarding one region
pub struct NamedLock {
    sem: NonNull<libc::sem_t>,
    name: String,
    role: Role,
}

// SAFETY: sem_t handles returned by sem_open are process-wide and the
// semaphore calls are thread-safe
unsafe impl Send for NamedLock {}
unsafe impl Sync for NamedLock {}

impl NamedLock {
    /// Create the lock as the region owner, replacing any stale one
    pub fn create(name: &str) -> Result<Self> {
        let c_name = lock_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated string
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            tracing::debug!(name = %name, "Removed stale lock");
        } else {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                // The exclusive create below reports the real failure
                tracing::warn!(name = %name, error = %err, "Failed to remove stale lock");
            }
        }

        // SAFETY: O_CREAT requires the mode and initial value varargs
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o666 as libc::c_uint,
                1 as libc::c_uint,
            )
        };

        let sem = checked(sem).map_err(|source| ShmJsonError::CreationFailure {
            name: name.to_string(),
            source,
        })?;

        tracing::debug!(name = %name, "Created named lock");

        Ok(Self {
            sem,
            name: name.to_string(),
            role: Role::Owner,
        })
    }

    /// Open the lock of an existing region
    pub fn open(name: &str) -> Result<Self> {
        let c_name = lock_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated string
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };

        let sem = checked(sem).map_err(|source| ShmJsonError::OpenFailure {
            name: name.to_string(),
            source,
        })?;

        tracing::debug!(name = %name, "Opened named lock");

        Ok(Self {
            sem,
            name: name.to_string(),
            role: Role::Attacher,
        })
    }

    /// Block until exclusive access is obtained
    ///
    /// Waits interrupted by signals are restarted.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        loop {
            // SAFETY: sem is a live handle from sem_open
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(LockGuard { lock: self });
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ShmJsonError::Lock {
                    name: self.name.clone(),
                    source: err,
                });
            }
        }
    }

    fn release(&self) {
        // SAFETY: only called from a guard created by a successful sem_wait
        if unsafe { libc::sem_post(self.sem.as_ptr()) } != 0 {
            tracing::warn!(
                name = %self.name,
                error = %io::Error::last_os_error(),
                "Failed to release named lock"
            );
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        // SAFETY: sem came from sem_open and is closed exactly once
        unsafe { libc::sem_close(self.sem.as_ptr()) };

        if self.role.is_owner() {
            if let Ok(c_name) = lock_name(&self.name) {
                // SAFETY: c_name is a valid NUL-terminated string
                if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
                    tracing::debug!(name = %self.name, "Unlinked named lock");
                }
            }
        }
    }
}

/// Exclusive access to a region; releases the lock when dropped
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a NamedLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

fn lock_name(name: &str) -> Result<CString> {
    validate_name(name)?;
    CString::new(format!("{}{}", LOCK_PREFIX, name)).map_err(|_| ShmJsonError::InvalidName {
        name: name.to_string(),
        reason: "name cannot contain NUL",
    })
}

fn checked(sem: *mut libc::sem_t) -> io::Result<NonNull<libc::sem_t>> {
    if sem == libc::SEM_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(sem).ok_or_else(|| io::Error::new(io::ErrorKind::Other, "sem_open returned null"))
}

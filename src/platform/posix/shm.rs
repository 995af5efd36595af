// ── POSIX shared memory ──────────────────────────────────────────────────────

#![allow(unsafe_code)]

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use super::{errno, object_name};
use crate::error::{IpcError, Result};
use crate::platform::view::View;

// ── SharedMemory ──────────────────────────────────────────────────────────────

/// A `shm_open` region mapped `MAP_SHARED` into this process.
///
/// Dropping unmaps the region but leaves the name in place; removing it is
/// up to the last participant (see `Membership`).
pub(crate) struct SharedMemory {
    view: View,
    fd: OwnedFd,
}

impl SharedMemory {
    /// Create the region exclusively, or attach if another process already
    /// did.  Returns the mapping and whether this call created it.
    ///
    /// A created region is `size` bytes and zero-filled.  An attached region
    /// is mapped at whatever size its creator has given it so far; the
    /// caller checks, and may [`refresh`](Self::refresh) while it waits.
    pub(crate) fn create_or_open(name: &str, size: usize) -> Result<(Self, bool)> {
        let c_name = object_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated string for the call.
        let raw = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::mode_t,
            )
        };
        if raw >= 0 {
            // SAFETY: shm_open returned a fresh descriptor we now own.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };
            return match Self::create_mapping(fd, size) {
                Ok(shm) => Ok((shm, true)),
                Err(e) => {
                    // SAFETY: c_name names the object this call just created.
                    unsafe { libc::shm_unlink(c_name.as_ptr()) };
                    Err(e)
                }
            };
        }

        let code = errno();
        if code != libc::EEXIST {
            return Err(IpcError::Os {
                function: "shm_open",
                code,
            });
        }

        // SAFETY: as above; no O_CREAT, so mode is ignored.
        let raw = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if raw < 0 {
            return Err(IpcError::last_os("shm_open"));
        }
        // SAFETY: shm_open returned a fresh descriptor we now own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let len = object_len(&fd)?;
        let view = map(&fd, len)?;
        Ok((Self { view, fd }, false))
    }

    fn create_mapping(fd: OwnedFd, size: usize) -> Result<Self> {
        truncate(&fd, size)?;
        let view = map(&fd, size)?;
        Ok(Self { view, fd })
    }

    /// Remove the name.  Mappings already made stay valid.
    pub(crate) fn unlink(name: &str) {
        if let Ok(c_name) = object_name(name) {
            // SAFETY: c_name is NUL-terminated.  ENOENT just means there was
            // nothing to remove.
            unsafe {
                libc::shm_unlink(c_name.as_ptr());
            }
        }
    }

    /// Re-read the object's size and remap if another process resized it.
    pub(crate) fn refresh(&mut self) -> Result<()> {
        let len = object_len(&self.fd)?;
        if len != self.view.len() {
            let view = map(&self.fd, len)?;
            unmap(&self.view);
            self.view = view;
        }
        Ok(())
    }

    /// Resize the object and this mapping, as a creator still mid-setup would.
    #[cfg(test)]
    pub(crate) fn grow(&mut self, size: usize) -> Result<()> {
        truncate(&self.fd, size)?;
        self.refresh()
    }

    pub(crate) fn view(&self) -> &View {
        &self.view
    }

    pub(crate) fn len(&self) -> usize {
        self.view.len()
    }
}

fn truncate(fd: &OwnedFd, size: usize) -> Result<()> {
    let len = libc::off_t::try_from(size).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "region size exceeds off_t")
    })?;
    // SAFETY: fd is an open shm descriptor with write access.
    if unsafe { libc::ftruncate(fd.as_raw_fd(), len) } != 0 {
        return Err(IpcError::last_os("ftruncate"));
    }
    Ok(())
}

fn object_len(fd: &OwnedFd) -> Result<usize> {
    // SAFETY: zeroed `stat` is a valid out-parameter; fd is open.
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd.as_raw_fd(), &mut st) } != 0 {
        return Err(IpcError::last_os("fstat"));
    }
    Ok(usize::try_from(st.st_size).unwrap_or(0))
}

fn map(fd: &OwnedFd, len: usize) -> Result<View> {
    if len == 0 {
        // Nothing to map yet (the creator has not sized the object); report
        // it as an empty view and let the caller decide.
        // SAFETY: a zero-length view is never dereferenced.
        return Ok(unsafe { View::new(std::ptr::null_mut(), 0) });
    }
    // SAFETY: fd is open read/write and at least `len` bytes long.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(IpcError::last_os("mmap"));
    }
    // SAFETY: mmap succeeded for `len` bytes; the mapping lives until
    // `unmap` is called on this view.
    Ok(unsafe { View::new(ptr.cast(), len) })
}

fn unmap(view: &View) {
    if view.len() > 0 {
        // SAFETY: the view was produced by `map` with exactly this length,
        // and every caller drops or replaces it right after.
        unsafe {
            libc::munmap(view.as_ptr().cast(), view.len());
        }
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        unmap(&self.view);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

// ── Mapped view ───────────────────────────────────────────────────────────────
//
// Bounds-checked byte access to a mapping owned by one of the back-ends.
// Callers never receive a Rust reference into shared memory: other processes
// write the same bytes, so every access is a copy in or out.

#![allow(unsafe_code)]

use std::io;

use crate::error::Result;

/// Base pointer and length of a live mapping.
pub(crate) struct View {
    ptr: *mut u8,
    len: usize,
}

impl View {
    /// # Safety
    ///
    /// `ptr` must point to `len` readable and writable bytes that stay mapped
    /// until the owning back-end drops this view.  `len == 0` permits a null
    /// pointer.
    pub(crate) unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    fn check(&self, offset: usize, n: usize) -> Result<()> {
        match offset.checked_add(n) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("access {offset}+{n} outside {}-byte mapping", self.len),
            )
            .into()),
        }
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the mapping.
    pub(crate) fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check(offset, buf.len())?;
        // SAFETY: the range was bounds-checked against the live mapping and
        // `buf` is a distinct local allocation, so the regions cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy `bytes` into the mapping at `offset`.
    pub(crate) fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check(offset, bytes.len())?;
        // SAFETY: as in `read_at`; the mapping is writable for its full length.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
        }
        Ok(())
    }

    /// Zero the whole mapping.
    pub(crate) fn zero(&self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: `ptr..ptr+len` is the live, writable mapping.
        unsafe { std::ptr::write_bytes(self.ptr, 0, self.len) };
    }
}

// SAFETY: the view is plain memory shared with other processes anyway; the
// channel serialises every access through the region lock.
unsafe impl Send for View {}
unsafe impl Sync for View {}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_is_bounds_checked() {
        let mut backing = vec![0u8; 16];
        // SAFETY: `backing` outlives `view` and is 16 bytes long.
        let view = unsafe { View::new(backing.as_mut_ptr(), backing.len()) };

        view.write_at(12, &[1, 2, 3, 4]).expect("in bounds");
        assert!(view.write_at(13, &[1, 2, 3, 4]).is_err());
        assert!(view.read_at(usize::MAX, &mut [0u8; 2]).is_err());

        let mut out = [0u8; 4];
        view.read_at(12, &mut out).expect("in bounds");
        assert_eq!(out, [1, 2, 3, 4]);

        view.zero();
        view.read_at(12, &mut out).expect("in bounds");
        assert_eq!(out, [0; 4]);
        drop(view);
        drop(backing);
    }
}

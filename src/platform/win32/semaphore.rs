// ── Win32 named semaphores ────────────────────────────────────────────────────

#![allow(unsafe_code)]

use std::time::Duration;

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{WAIT_OBJECT_0, WAIT_TIMEOUT},
        System::Threading::{CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject, INFINITE},
    },
};

use super::{wide, OwnedHandle};
use crate::error::{IpcError, Result};

/// A named counting semaphore.
pub(crate) struct Semaphore {
    handle: OwnedHandle,
}

impl Semaphore {
    /// Open the named semaphore, creating it with `initial` permits and a
    /// ceiling of `max_count` if absent.  An existing semaphore keeps its
    /// count.
    pub(crate) fn open(name: &str, initial: u32, max_count: u32) -> Result<Self> {
        let name_wide = wide(name);
        let max = i32::try_from(max_count).unwrap_or(i32::MAX).max(1);
        let initial = i32::try_from(initial).unwrap_or(i32::MAX).min(max);
        // SAFETY: name_wide is a valid null-terminated UTF-16 string.
        let handle = unsafe { CreateSemaphoreW(None, initial, max, PCWSTR(name_wide.as_ptr())) }
            .map_err(|_| IpcError::last_os("CreateSemaphoreW"))?;
        Ok(Self {
            handle: OwnedHandle(handle),
        })
    }

    /// Named kernel objects vanish with their last handle; nothing to remove.
    pub(crate) fn unlink(_name: &str) {}

    /// Take one permit.  `None` blocks indefinitely; `Some(t)` gives up
    /// after `t` and returns `Ok(false)`.
    pub(crate) fn acquire(&self, timeout: Option<Duration>) -> Result<bool> {
        let millis = match timeout {
            None => INFINITE,
            // Clamp below INFINITE so a huge timeout never means "forever".
            Some(t) => u32::try_from(t.as_millis()).unwrap_or(INFINITE - 1).min(INFINITE - 1),
        };
        // SAFETY: self.handle is a live semaphore handle.
        let rc = unsafe { WaitForSingleObject(self.handle.0, millis) };
        if rc == WAIT_OBJECT_0 {
            Ok(true)
        } else if rc == WAIT_TIMEOUT {
            Ok(false)
        } else {
            Err(IpcError::last_os("WaitForSingleObject"))
        }
    }

    /// Add `count` permits.
    pub(crate) fn release(&self, count: u32) -> Result<()> {
        let count = i32::try_from(count).unwrap_or(i32::MAX);
        // SAFETY: self.handle is a live semaphore handle; the previous count
        // is not needed.
        unsafe { ReleaseSemaphore(self.handle.0, count, None) }
            .map_err(|_| IpcError::last_os("ReleaseSemaphore"))
    }
}

// ── POSIX platform implementation ─────────────────────────────────────────────
//
// `shm_open` + `mmap` for the region, named `sem_open` semaphores for flow
// control and as the region lock.  Every `unsafe` block MUST carry a
// `// SAFETY:` comment.
//
// Named POSIX objects survive the processes that created them; `membership`
// tracks who is attached so the last one out can remove them.

#![allow(unsafe_code)]

mod membership;
mod semaphore;
mod shm;

use std::ffi::CString;

pub(crate) use membership::Membership;
pub(crate) use semaphore::{RegionLock, Semaphore};
pub(crate) use shm::SharedMemory;

use crate::error::{IpcError, Result};
use crate::hash;

/// Longest portable object name, including the leading `/`.  Linux keeps
/// named semaphores as `sem.<name>` files, which costs four bytes of NAME_MAX.
#[cfg(target_os = "macos")]
const MAX_NAME_LEN: usize = 31;
#[cfg(not(target_os = "macos"))]
const MAX_NAME_LEN: usize = 251;

/// POSIX form of an identity name: `/`-prefixed, hashed when too long for
/// the platform limit.
pub(crate) fn object_name(name: &str) -> Result<CString> {
    let full = if name.len() < MAX_NAME_LEN {
        format!("/{name}")
    } else {
        let digest = hash::sha1_hex(name.as_bytes());
        format!("/{}", &digest[..digest.len().min(MAX_NAME_LEN - 1)])
    };
    CString::new(full).map_err(|_| IpcError::InvalidIdentity("name contains a NUL byte"))
}

/// Current `errno` as a raw code.
pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

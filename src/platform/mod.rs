// ── Platform abstraction layer ────────────────────────────────────────────────
//
// This module defines the interface that the rest of the codebase uses to
// talk to the OS.  No `unsafe` lives here; all FFI is confined to the `win32`
// and `posix` back-ends (plus the shared `view` helper) and never leaks
// outward.  Both back-ends export the same four types:
//
//   • `SharedMemory` – named region, created or attached by name.
//   • `Semaphore`    – named counting semaphore with optional timeout.
//   • `RegionLock`   – cross-process mutual exclusion over one region,
//                      handed out as a scoped `RegionGuard`.
//   • `Membership`   – who is attached, so names are removed only once the
//                      last participant leaves.

pub(crate) mod view;

#[cfg(unix)]
pub(crate) mod posix;
#[cfg(windows)]
pub(crate) mod win32;

#[cfg(unix)]
pub(crate) use posix::{Membership, RegionLock, Semaphore, SharedMemory};
#[cfg(windows)]
pub(crate) use win32::{Membership, RegionLock, Semaphore, SharedMemory};

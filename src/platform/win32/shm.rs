// ── Win32 shared memory & region lock ────────────────────────────────────────

#![allow(unsafe_code)]

use parking_lot::{Mutex, MutexGuard};
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{
            GetLastError, BOOL, ERROR_ALREADY_EXISTS, HANDLE, INVALID_HANDLE_VALUE,
            WAIT_ABANDONED, WAIT_OBJECT_0,
        },
        System::{
            Memory::{
                CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, VirtualQuery,
                FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS,
                PAGE_READWRITE,
            },
            Threading::{CreateMutexW, ReleaseMutex, WaitForSingleObject, INFINITE},
        },
    },
};

use super::{wide, OwnedHandle};
use crate::error::{IpcError, Result};
use crate::platform::view::View;

// ── SharedMemory ──────────────────────────────────────────────────────────────

/// A pagefile-backed named file mapping.
///
/// Windows destroys the mapping when its last handle closes, so there is no
/// unlink step and no stale state across runs.
pub(crate) struct SharedMemory {
    view: View,
    base: MEMORY_MAPPED_VIEW_ADDRESS,
    _mapping: OwnedHandle,
}

impl SharedMemory {
    /// Create the named mapping, or open it if it already exists.  Returns the
    /// mapping and whether this call created it.
    ///
    /// A created mapping is `size` bytes and zero-filled by the system.  An
    /// existing one keeps its creator's size; the caller checks it.
    pub(crate) fn create_or_open(name: &str, size: usize) -> Result<(Self, bool)> {
        let name_wide = wide(name);
        let size64 = size as u64;

        // SAFETY: INVALID_HANDLE_VALUE requests a pagefile-backed section;
        // name_wide is a valid null-terminated UTF-16 string for the call.
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                (size64 >> 32) as u32,
                size64 as u32,
                PCWSTR(name_wide.as_ptr()),
            )
        }
        .map_err(|_| IpcError::last_os("CreateFileMappingW"))?;

        // SAFETY: reads the thread-local error left by the successful call
        // above, which sets ERROR_ALREADY_EXISTS when it opened an existing
        // section.
        let created = unsafe { GetLastError() } != ERROR_ALREADY_EXISTS;
        let mapping = OwnedHandle(mapping);

        // SAFETY: mapping is a live section handle; 0 bytes maps all of it.
        let base = unsafe { MapViewOfFile(mapping.0, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if base.Value.is_null() {
            return Err(IpcError::last_os("MapViewOfFile"));
        }

        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: base.Value is the start of the view just mapped; info is a
        // correctly sized out-parameter.
        let written = unsafe {
            VirtualQuery(
                Some(base.Value as *const _),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        let len = if written == 0 { 0 } else { info.RegionSize };

        // SAFETY: the view stays mapped until Drop calls UnmapViewOfFile.
        let view = unsafe { View::new(base.Value.cast(), len) };
        Ok((
            Self {
                view,
                base,
                _mapping: mapping,
            },
            created,
        ))
    }

    /// Sections vanish with their last handle; nothing to remove.
    pub(crate) fn unlink(_name: &str) {}

    /// A section's size is fixed when it is created, so there is nothing to
    /// pick up.
    pub(crate) fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn view(&self) -> &View {
        &self.view
    }

    pub(crate) fn len(&self) -> usize {
        self.view.len()
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        // SAFETY: base was returned by MapViewOfFile and is unmapped once.
        // The section handle closes afterwards when `_mapping` drops.
        unsafe {
            let _ = UnmapViewOfFile(self.base);
        }
    }
}

// SAFETY: the base address is only used to unmap; all access goes through
// the bounds-checked View.
unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

// ── RegionLock ────────────────────────────────────────────────────────────────

/// Named mutex guarding one region.
///
/// Win32 mutexes are re-entrant per thread, so an in-process mutex is taken
/// first to keep two threads of this process from interleaving.
pub(crate) struct RegionLock {
    mutex: OwnedHandle,
    local: Mutex<()>,
}

/// Holds the region lock; releases it on drop.
pub(crate) struct RegionGuard<'a> {
    mutex: HANDLE,
    _local: MutexGuard<'a, ()>,
}

impl RegionLock {
    pub(crate) fn open(name: &str) -> Result<Self> {
        let name_wide = wide(name);
        // SAFETY: name_wide is a valid null-terminated UTF-16 string; the
        // mutex is created unowned.
        let mutex = unsafe { CreateMutexW(None, BOOL(0), PCWSTR(name_wide.as_ptr())) }
            .map_err(|_| IpcError::last_os("CreateMutexW"))?;
        Ok(Self {
            mutex: OwnedHandle(mutex),
            local: Mutex::new(()),
        })
    }

    /// Mutexes vanish with their last handle; nothing to remove.
    pub(crate) fn unlink(_name: &str) {}

    pub(crate) fn lock(&self) -> Result<RegionGuard<'_>> {
        let local = self.local.lock();
        // SAFETY: self.mutex is a live mutex handle.
        let rc = unsafe { WaitForSingleObject(self.mutex.0, INFINITE) };
        // An abandoned mutex is still acquired; the holder died mid-update
        // and the checksums decide whether the region is usable.
        if rc == WAIT_OBJECT_0 || rc == WAIT_ABANDONED {
            Ok(RegionGuard {
                mutex: self.mutex.0,
                _local: local,
            })
        } else {
            Err(IpcError::last_os("WaitForSingleObject"))
        }
    }
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this thread owns the mutex (acquired in `lock`), and the
        // handle is kept alive by the RegionLock this guard borrows.
        unsafe {
            let _ = ReleaseMutex(self.mutex);
        }
    }
}


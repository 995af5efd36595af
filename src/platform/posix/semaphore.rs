// ── POSIX named semaphores ────────────────────────────────────────────────────

#![allow(unsafe_code)]

use std::time::Duration;

use super::{errno, object_name};
use crate::error::{IpcError, Result};

/// A `sem_open` counting semaphore.
pub(crate) struct Semaphore {
    sem: *mut libc::sem_t,
}

impl Semaphore {
    /// Open the named semaphore, creating it with `initial` permits if
    /// absent.  An existing semaphore keeps its count.
    ///
    /// `_max_count` is advisory here; POSIX semaphores are bounded only by
    /// `SEM_VALUE_MAX`.
    pub(crate) fn open(name: &str, initial: u32, _max_count: u32) -> Result<Self> {
        let c_name = object_name(name)?;
        // SAFETY: c_name is NUL-terminated; the variadic mode and value
        // arguments are passed as the promoted `unsigned int` sem_open reads.
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o600 as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(IpcError::last_os("sem_open"));
        }
        Ok(Self { sem })
    }

    /// Remove the name so the next `open` starts from a fresh count.
    /// Handles already open keep working.
    pub(crate) fn unlink(name: &str) {
        if let Ok(c_name) = object_name(name) {
            // SAFETY: c_name is NUL-terminated.  ENOENT is the expected
            // outcome when nothing stale is left behind.
            unsafe {
                libc::sem_unlink(c_name.as_ptr());
            }
        }
    }

    /// Take one permit.  `None` blocks indefinitely; `Some(t)` gives up
    /// after `t` and returns `Ok(false)`.
    pub(crate) fn acquire(&self, timeout: Option<Duration>) -> Result<bool> {
        match timeout {
            None => loop {
                // SAFETY: self.sem is a live handle from sem_open.
                if unsafe { libc::sem_wait(self.sem) } == 0 {
                    return Ok(true);
                }
                let code = errno();
                if code != libc::EINTR {
                    return Err(IpcError::Os {
                        function: "sem_wait",
                        code,
                    });
                }
            },
            Some(limit) => self.acquire_timed(limit),
        }
    }

    #[cfg(target_os = "linux")]
    fn acquire_timed(&self, limit: Duration) -> Result<bool> {
        // sem_timedwait takes an absolute CLOCK_REALTIME deadline.
        // SAFETY: zeroed timespec is valid; clock_gettime fills it.
        let mut now: libc::timespec = unsafe { std::mem::zeroed() };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
            return Err(IpcError::last_os("clock_gettime"));
        }
        let nanos = now.tv_nsec as i64 + i64::from(limit.subsec_nanos());
        let mut deadline = now;
        deadline.tv_sec += (limit.as_secs() as libc::time_t) + (nanos / 1_000_000_000) as libc::time_t;
        deadline.tv_nsec = (nanos % 1_000_000_000) as _;

        loop {
            // SAFETY: self.sem is live; deadline is a valid timespec.
            if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::EINTR => continue,
                libc::ETIMEDOUT => return Ok(false),
                code => {
                    return Err(IpcError::Os {
                        function: "sem_timedwait",
                        code,
                    })
                }
            }
        }
    }

    // No sem_timedwait outside Linux: poll with sem_trywait.
    #[cfg(not(target_os = "linux"))]
    fn acquire_timed(&self, limit: Duration) -> Result<bool> {
        let deadline = std::time::Instant::now() + limit;
        loop {
            // SAFETY: self.sem is a live handle from sem_open.
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::EINTR => continue,
                libc::EAGAIN => {
                    if std::time::Instant::now() >= deadline {
                        return Ok(false);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                code => {
                    return Err(IpcError::Os {
                        function: "sem_trywait",
                        code,
                    })
                }
            }
        }
    }

    /// Add `count` permits.
    pub(crate) fn release(&self, count: u32) -> Result<()> {
        for _ in 0..count {
            // SAFETY: self.sem is a live handle from sem_open.
            if unsafe { libc::sem_post(self.sem) } != 0 {
                return Err(IpcError::last_os("sem_post"));
            }
        }
        Ok(())
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: self.sem came from sem_open and is closed exactly once.
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

// SAFETY: POSIX semaphore operations are thread-safe on a shared handle.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

// ── RegionLock ────────────────────────────────────────────────────────────────

/// Named binary semaphore guarding one region.
///
/// Created holding a single permit, so whichever process creates the name
/// also makes it available.  Excludes threads of this process as well as
/// other processes.  A participant that dies inside the critical section
/// leaves the permit taken.
pub(crate) struct RegionLock {
    sem: Semaphore,
}

/// Holds the region lock; releases it on drop.
pub(crate) struct RegionGuard<'a> {
    sem: &'a Semaphore,
}

impl RegionLock {
    pub(crate) fn open(name: &str) -> Result<Self> {
        Ok(Self {
            sem: Semaphore::open(name, 1, 1)?,
        })
    }

    pub(crate) fn unlink(name: &str) {
        Semaphore::unlink(name);
    }

    pub(crate) fn lock(&self) -> Result<RegionGuard<'_>> {
        self.sem.acquire(None)?;
        Ok(RegionGuard { sem: &self.sem })
    }
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.release(1) {
            tracing::error!(error = %e, "failed to release region lock");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        format!("tether.test.{}.{tag}", std::process::id())
    }

    #[test]
    fn release_then_acquire() {
        let name = unique("sem_basic");
        Semaphore::unlink(&name);
        let sem = Semaphore::open(&name, 0, 4).expect("open");
        sem.release(2).expect("release");
        assert!(sem.acquire(Some(Duration::from_millis(10))).expect("first"));
        assert!(sem.acquire(None).expect("second"));
        assert!(!sem.acquire(Some(Duration::from_millis(20))).expect("empty"));
        Semaphore::unlink(&name);
    }

    #[test]
    fn two_handles_share_the_count() {
        let name = unique("sem_shared");
        Semaphore::unlink(&name);
        let a = Semaphore::open(&name, 0, 1).expect("open a");
        let b = Semaphore::open(&name, 0, 1).expect("open b");
        a.release(1).expect("release");
        assert!(b.acquire(Some(Duration::from_millis(10))).expect("acquire via b"));
        Semaphore::unlink(&name);
    }

    #[test]
    fn unlink_resets_the_next_open() {
        let name = unique("sem_reset");
        Semaphore::unlink(&name);
        let stale = Semaphore::open(&name, 0, 8).expect("open");
        stale.release(3).expect("release");
        Semaphore::unlink(&name);
        let fresh = Semaphore::open(&name, 0, 8).expect("reopen");
        assert!(!fresh.acquire(Some(Duration::ZERO)).expect("fresh is empty"));
        Semaphore::unlink(&name);
    }

    #[test]
    fn initial_count_applies_only_on_creation() {
        let name = unique("sem_initial");
        Semaphore::unlink(&name);
        let first = Semaphore::open(&name, 1, 1).expect("create");
        assert!(first.acquire(Some(Duration::ZERO)).expect("created with a permit"));
        let second = Semaphore::open(&name, 1, 1).expect("attach");
        assert!(!second.acquire(Some(Duration::ZERO)).expect("count kept"));
        Semaphore::unlink(&name);
    }

    #[test]
    fn region_lock_excludes_a_second_handle_until_released() {
        let name = unique("region_lock");
        RegionLock::unlink(&name);
        let a = RegionLock::open(&name).expect("open a");
        let b = RegionLock::open(&name).expect("open b");

        let guard = a.lock().expect("acquire a");
        assert!(!b.sem.acquire(Some(Duration::from_millis(20))).expect("probe"));
        drop(guard);
        drop(b.lock().expect("acquire b after release"));
        drop(a.lock().expect("acquire a again"));
        RegionLock::unlink(&name);
    }
}

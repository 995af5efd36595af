// ── POSIX participant registry ───────────────────────────────────────────────
//
// Named POSIX objects outlive the processes that use them, so somebody has to
// remove them, and only once nobody is attached.  Two lock files per channel
// decide who:
//
//   <name>.gate   – exclusive `flock`, held while joining or leaving
//   <name>.users  – shared `flock`, held by every participant for its lifetime
//
// A joiner that can take `.users` exclusively is alone: anything left under
// the channel's names belongs to participants that died and is stale.  A
// leaver that can take it exclusively is the last one out and removes the
// names.  `flock` is released by the kernel when a process dies, so a crash
// never leaves a phantom participant behind.  The files themselves stay.

#![allow(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use super::{errno, object_name};
use crate::error::{IpcError, Result};

/// This process's registration as a participant of one channel.
pub(crate) struct Membership {
    gate: File,
    users: File,
}

/// Holds the join/leave gate; releases it on drop.
pub(crate) struct GateGuard<'a> {
    gate: &'a File,
}

impl Membership {
    /// Open (creating if needed) the lock files for the object `name`.
    /// Takes no locks.
    pub(crate) fn open(name: &str) -> Result<Self> {
        let dir = lock_dir();
        fs::create_dir_all(&dir)?;
        let c_name = object_name(name)?;
        let stem = c_name.to_string_lossy();
        let stem = stem.trim_start_matches('/');
        Ok(Self {
            gate: open_lock_file(dir.join(format!("{stem}.gate")))?,
            users: open_lock_file(dir.join(format!("{stem}.users")))?,
        })
    }

    /// Block until no other process is joining or leaving.
    pub(crate) fn gate(&self) -> Result<GateGuard<'_>> {
        flock(&self.gate, libc::LOCK_EX)?;
        Ok(GateGuard { gate: &self.gate })
    }

    /// Register as a participant.  Returns `true` when no other participant
    /// is registered.
    pub(crate) fn register(&self, _gate: &GateGuard<'_>) -> Result<bool> {
        let alone = flock(&self.users, libc::LOCK_EX | libc::LOCK_NB)?;
        // Under the gate nobody else can slip in between the two calls.
        flock(&self.users, libc::LOCK_SH)?;
        Ok(alone)
    }

    /// Drop the registration.  Returns `true` when this was the last one.
    pub(crate) fn leave(&self, _gate: &GateGuard<'_>) -> bool {
        let last = matches!(flock(&self.users, libc::LOCK_EX | libc::LOCK_NB), Ok(true));
        if let Err(e) = flock(&self.users, libc::LOCK_UN) {
            tracing::warn!(error = %e, "failed to drop channel registration");
        }
        last
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = flock(self.gate, libc::LOCK_UN) {
            tracing::warn!(error = %e, "failed to release channel gate");
        }
    }
}

fn lock_dir() -> PathBuf {
    std::env::temp_dir().join("tether-ipc")
}

fn open_lock_file(path: PathBuf) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)?)
}

/// `flock` retried on EINTR.  `Ok(false)` when a `LOCK_NB` request would
/// block.
fn flock(file: &File, op: libc::c_int) -> Result<bool> {
    loop {
        // SAFETY: the descriptor belongs to `file`, which is open for the
        // duration of the call.
        if unsafe { libc::flock(file.as_raw_fd(), op) } == 0 {
            return Ok(true);
        }
        match errno() {
            libc::EINTR => continue,
            libc::EWOULDBLOCK => return Ok(false),
            code => {
                return Err(IpcError::Os {
                    function: "flock",
                    code,
                })
            }
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

    fn join(name: &str) -> (Membership, bool) {
        let members = Membership::open(name).expect("open");
        let alone = {
            let gate = members.gate().expect("gate");
            members.register(&gate).expect("register")
        };
        (members, alone)
    }

    fn leave(members: &Membership) -> bool {
        let gate = members.gate().expect("gate");
        members.leave(&gate)
    }

    #[test]
    fn first_joiner_is_alone_and_last_leaver_is_last() {
        let name = unique("members");
        let (a, a_alone) = join(&name);
        let (b, b_alone) = join(&name);
        assert!(a_alone);
        assert!(!b_alone);

        assert!(!leave(&a), "b is still registered");
        assert!(leave(&b));
    }

    #[test]
    fn a_dropped_member_is_no_longer_counted() {
        let name = unique("members-drop");
        let (a, _) = join(&name);
        drop(a);
        let (b, alone) = join(&name);
        assert!(alone, "closing the files releases the registration");
        assert!(leave(&b));
    }

    #[test]
    fn gate_excludes_a_second_joiner() {
        let name = unique("members-gate");
        let a = Membership::open(&name).expect("open a");
        let b = Membership::open(&name).expect("open b");
        let guard = a.gate().expect("gate a");
        assert!(!flock(&b.gate, libc::LOCK_EX | libc::LOCK_NB).expect("probe"));
        drop(guard);
        drop(b.gate().expect("gate b after release"));
    }
}

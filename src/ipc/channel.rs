// ── IPC channel ───────────────────────────────────────────────────────────────
//
// A fixed-capacity ring of message slots in named shared memory.
//
//   write semaphore  – permits = free slots    (creator deposits SLOT_COUNT)
//   read semaphore   – permits = filled slots
//   region lock      – held only while status + one slot are read/written
//
// Senders take a write permit, write under the lock, then post a read permit;
// readers mirror that.  Status and slot records carry checksums and are never
// trusted without verifying them.  No `unsafe` here; all OS access goes
// through `crate::platform`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use super::layout::{
    self, Status, HEADER_LEN, MAX_PARAMS, REGION_LEN, SLOT_COUNT, SLOT_LEN, STATUS_LEN,
    STATUS_OFFSET,
};
use super::naming::{ChannelIdentity, ResourceRole};
use crate::error::{IpcError, Result};
use crate::platform::{Membership, RegionLock, Semaphore, SharedMemory};

/// How long an attaching process waits for a creator that is mid-setup.
const HEADER_WAIT_ATTEMPTS: u32 = 50;
const HEADER_WAIT_STEP: Duration = Duration::from_millis(2);

// ── Public types ──────────────────────────────────────────────────────────────

/// Tuning knobs that do not affect the shared layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// How long `send` waits for a free slot; `None` waits forever.
    pub send_timeout: Option<Duration>,
    /// How long `read` waits for a message; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Accept a message whose checksum fails when its timestamp is older
    /// than the status counter.  Off by default: with it on, a damaged slot
    /// is indistinguishable from a torn one.
    pub tolerate_torn_reads: bool,
}

/// Result of [`Channel::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// This process created and initialised the region.
    CreatedAsMaster,
    /// The region already existed and was verified.
    AttachedAsSlave,
    /// `initialize` already succeeded on this object; nothing was done.
    AlreadyInitialized,
    /// Resource creation or verification failed; the error was logged.
    Failed,
}

/// Creation-order role of this participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

/// One message as delivered by [`Channel::read`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub command: u32,
    pub flags: u32,
    /// At most [`MAX_PARAMS`] entries, whitespace-trimmed.
    pub params: Vec<String>,
}

// ── Resources ─────────────────────────────────────────────────────────────────

/// OS object names derived from one identity.
struct Names {
    shm: String,
    read_sem: String,
    write_sem: String,
    lock: String,
}

impl Names {
    fn new(id: &ChannelIdentity) -> Self {
        Self {
            shm: id.resource_name(ResourceRole::SharedMemory),
            read_sem: id.resource_name(ResourceRole::ReadSemaphore),
            write_sem: id.resource_name(ResourceRole::WriteSemaphore),
            lock: id.resource_name(ResourceRole::RegionLock),
        }
    }

    /// Remove every name.  Open handles keep working.
    fn unlink_all(&self) {
        SharedMemory::unlink(&self.shm);
        Semaphore::unlink(&self.read_sem);
        Semaphore::unlink(&self.write_sem);
        RegionLock::unlink(&self.lock);
    }
}

/// OS objects held once `initialize` succeeds.
struct Resources {
    lock: RegionLock,
    read_sem: Semaphore,
    write_sem: Semaphore,
    shm: SharedMemory,
    members: Membership,
    names: Names,
    role: Role,
}

impl Drop for Resources {
    fn drop(&mut self) {
        match self.members.gate() {
            Ok(gate) => {
                if self.members.leave(&gate) {
                    tracing::debug!(channel = %self.names.shm, "last participant left");
                    self.names.unlink_all();
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not deregister from channel"),
        }
    }
}

// ── Channel ───────────────────────────────────────────────────────────────────

/// One participant's handle on a named channel.
///
/// Hold at most one live `Channel` per identity in a process; share it between
/// threads by reference.
pub struct Channel {
    identity: ChannelIdentity,
    fingerprint: [u8; HEADER_LEN],
    options: ChannelOptions,
    initialized: AtomicBool,
    state: RwLock<Option<Resources>>,
}

impl Channel {
    /// Build an uninitialised channel with default options.
    ///
    /// # Panics
    ///
    /// If the header fingerprint does not have the fixed header length.
    pub fn new(app_id: &str, version: u32, channel_id: &str) -> Result<Self> {
        let identity = ChannelIdentity::new(app_id, version, channel_id)?;
        Ok(Self::with_options(identity, ChannelOptions::default()))
    }

    /// Build an uninitialised channel for `identity`.
    pub fn with_options(identity: ChannelIdentity, options: ChannelOptions) -> Self {
        let fingerprint = identity.header_fingerprint();
        Self {
            identity,
            fingerprint,
            options,
            initialized: AtomicBool::new(false),
            state: RwLock::new(None),
        }
    }

    pub fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// `None` until `initialize` succeeds.
    pub fn role(&self) -> Option<Role> {
        self.state.read().as_ref().map(|r| r.role)
    }

    // ── Initialisation ────────────────────────────────────────────────────────

    /// Create or attach to the shared region and both semaphores.
    ///
    /// Only the first successful call does anything; later calls return
    /// [`InitOutcome::AlreadyInitialized`] without touching shared state.
    /// Failures are logged and reported as [`InitOutcome::Failed`].
    pub fn initialize(&self) -> InitOutcome {
        match self.try_initialize() {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    channel = %self.identity.resource_name(ResourceRole::SharedMemory),
                    error = %e,
                    "channel initialization failed"
                );
                InitOutcome::Failed
            }
        }
    }

    /// [`Channel::initialize`] with the failure reason.  Never returns
    /// [`InitOutcome::Failed`].
    pub fn try_initialize(&self) -> Result<InitOutcome> {
        if self.is_initialized() {
            return Ok(InitOutcome::AlreadyInitialized);
        }
        let mut state = self.state.write();
        if state.is_some() {
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let res = self.open_resources()?;
        let outcome = match res.role {
            Role::Master => InitOutcome::CreatedAsMaster,
            Role::Slave => InitOutcome::AttachedAsSlave,
        };
        tracing::debug!(
            channel = %self.identity.resource_name(ResourceRole::SharedMemory),
            role = ?res.role,
            "channel initialized"
        );
        *state = Some(res);
        self.initialized.store(true, Ordering::Release);
        Ok(outcome)
    }

    fn open_resources(&self) -> Result<Resources> {
        let names = Names::new(&self.identity);
        let members = Membership::open(&names.shm)?;

        let (shm, read_sem, write_sem, lock, role) = {
            // Joins and leaves of this identity are serialised from here on.
            let gate = members.gate()?;
            if members.register(&gate)? {
                // Nobody is attached: whatever the names still point at was
                // left behind by participants that died.
                names.unlink_all();
            }

            let (mut shm, created) = SharedMemory::create_or_open(&names.shm, REGION_LEN)?;
            if !created {
                self.verify_region(&mut shm)?;
            }

            let read_sem = Semaphore::open(&names.read_sem, 0, SLOT_COUNT as u32)?;
            let write_sem = Semaphore::open(&names.write_sem, 0, SLOT_COUNT as u32)?;
            let lock = RegionLock::open(&names.lock)?;

            let role = if created {
                {
                    let _guard = lock.lock()?;
                    let view = shm.view();
                    view.zero();
                    view.write_at(0, &self.fingerprint)?;
                    view.write_at(STATUS_OFFSET, &Status::default().encode())?;
                }
                write_sem.release(SLOT_COUNT as u32)?;
                Role::Master
            } else {
                Role::Slave
            };
            (shm, read_sem, write_sem, lock, role)
        };

        Ok(Resources {
            lock,
            read_sem,
            write_sem,
            shm,
            members,
            names,
            role,
        })
    }

    /// An attached region must be large enough and carry our fingerprint.
    ///
    /// A creator that is still setting up may not have sized or stamped the
    /// region yet, so both are polled for a short while before judging.
    fn verify_region(&self, shm: &mut SharedMemory) -> Result<()> {
        let mut header = [0u8; HEADER_LEN];
        for _ in 0..HEADER_WAIT_ATTEMPTS {
            if shm.len() < REGION_LEN {
                shm.refresh()?;
            }
            if shm.len() >= REGION_LEN {
                shm.view().read_at(0, &mut header)?;
                if header.iter().any(|&b| b != 0) {
                    break;
                }
            }
            std::thread::sleep(HEADER_WAIT_STEP);
        }
        if shm.len() < REGION_LEN {
            return Err(IpcError::RegionTooSmall {
                actual: shm.len(),
                required: REGION_LEN,
            });
        }
        if header != self.fingerprint {
            return Err(IpcError::HeaderMismatch);
        }
        Ok(())
    }

    /// Resources of an initialised channel.
    ///
    /// # Panics
    ///
    /// If `initialize` has not succeeded: that is a caller bug, not a
    /// runtime condition.
    fn resources<'a>(&self, state: &'a Option<Resources>) -> &'a Resources {
        match state {
            Some(res) => res,
            None => panic!(
                "channel {} used before initialize()",
                self.identity.resource_name(ResourceRole::SharedMemory)
            ),
        }
    }

    // ── Send ──────────────────────────────────────────────────────────────────

    /// Send one message, blocking while every slot is full.
    ///
    /// Returns `true` only if the message was written.  Failures are logged.
    ///
    /// # Panics
    ///
    /// If called before a successful [`Channel::initialize`].
    pub fn send<S: AsRef<str>>(&self, command: u32, flags: u32, params: &[S]) -> bool {
        match self.try_send(command, flags, params) {
            Ok(()) => true,
            Err(e) => {
                self.log_failure("send", &e);
                false
            }
        }
    }

    /// [`Channel::send`] with the failure reason.
    ///
    /// More than [`MAX_PARAMS`] parameters: the extras are dropped.  Each
    /// parameter is truncated to [`layout::MAX_PARAM_LEN`] bytes.
    pub fn try_send<S: AsRef<str>>(&self, command: u32, flags: u32, params: &[S]) -> Result<()> {
        let state = self.state.read();
        let res = self.resources(&state);

        if params.len() > MAX_PARAMS {
            tracing::warn!(
                given = params.len(),
                kept = MAX_PARAMS,
                command,
                "dropping extra message parameters"
            );
        }
        let params: Vec<&str> = params.iter().take(MAX_PARAMS).map(AsRef::as_ref).collect();

        if !res.write_sem.acquire(self.options.send_timeout)? {
            return Err(IpcError::Timeout);
        }

        match write_slot(res, command, flags, &params) {
            Ok(slot) => {
                tracing::trace!(slot, command, "message written");
                res.read_sem.release(1)
            }
            Err(e) => {
                // Nothing was written, so the slot is still free.
                if let Err(release) = res.write_sem.release(1) {
                    tracing::error!(error = %release, "failed to return write permit");
                }
                Err(e)
            }
        }
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    /// Read the next message, blocking until one is available.
    ///
    /// Returns `None` on any failure, including a discarded corrupt message
    /// (whose slot is consumed, not retried).  Failures are logged.
    ///
    /// # Panics
    ///
    /// If called before a successful [`Channel::initialize`].
    pub fn read(&self) -> Option<Message> {
        match self.try_read() {
            Ok(message) => Some(message),
            Err(e) => {
                self.log_failure("read", &e);
                None
            }
        }
    }

    /// [`Channel::read`] with the failure reason.
    pub fn try_read(&self) -> Result<Message> {
        let state = self.state.read();
        let res = self.resources(&state);

        if !res.read_sem.acquire(self.options.read_timeout)? {
            return Err(IpcError::Timeout);
        }

        // A corrupt status leaves the slot where it is; the read permit stays
        // consumed.
        let (slot, record, counter) = take_slot(res)?;

        let valid = record.checksum_ok
            || (self.options.tolerate_torn_reads && record.timestamp < counter);

        // The slot was consumed either way; hand it back to writers.
        res.write_sem.release(1)?;

        if !valid {
            return Err(IpcError::MessageCorrupted { slot });
        }
        if !record.checksum_ok {
            tracing::debug!(slot, timestamp = record.timestamp, counter, "accepted torn message");
        }

        Ok(Message {
            command: record.command,
            flags: record.flags,
            params: record.params,
        })
    }

    fn log_failure(&self, op: &'static str, e: &IpcError) {
        let channel = self.identity.channel_id();
        match e {
            IpcError::Timeout => tracing::debug!(channel, op, "channel timed out"),
            IpcError::StatusCorrupted | IpcError::MessageCorrupted { .. } => {
                tracing::warn!(channel, op, error = %e, "discarding corrupted channel data")
            }
            _ => tracing::error!(channel, op, error = %e, "channel operation failed"),
        }
    }
}

// ── Critical sections ─────────────────────────────────────────────────────────

/// Write one message at `write_index` under the region lock.  Returns the slot.
fn write_slot(res: &Resources, command: u32, flags: u32, params: &[&str]) -> Result<u32> {
    let _guard = res.lock.lock()?;
    let view = res.shm.view();

    let mut raw = [0u8; STATUS_LEN];
    view.read_at(STATUS_OFFSET, &mut raw)?;
    let mut status = Status::decode(&raw).ok_or(IpcError::StatusCorrupted)?;

    let slot = status.write_index;
    let image = layout::encode_slot(command, flags, params, status.counter);
    view.write_at(layout::slot_offset(slot), &image)?;

    status.counter = status.counter.wrapping_add(1);
    status.advance_write();
    view.write_at(STATUS_OFFSET, &status.encode())?;
    Ok(slot)
}

/// Copy out the slot at `read_index` and advance past it under the region
/// lock.  Returns the slot index, its undecided record, and the counter.
fn take_slot(res: &Resources) -> Result<(u32, layout::SlotRecord, u64)> {
    let _guard = res.lock.lock()?;
    let view = res.shm.view();

    let mut raw = [0u8; STATUS_LEN];
    view.read_at(STATUS_OFFSET, &mut raw)?;
    let mut status = Status::decode(&raw).ok_or(IpcError::StatusCorrupted)?;

    let slot = status.read_index;
    let mut image = vec![0u8; SLOT_LEN];
    view.read_at(layout::slot_offset(slot), &mut image)?;

    status.advance_read();
    view.write_at(STATUS_OFFSET, &status.encode())?;
    Ok((slot, layout::decode_slot(&image), status.counter))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

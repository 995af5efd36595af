// ── Single-instance signaling ─────────────────────────────────────────────────
//
// The first process of an application owns the "instance" channel; every
// later launch attaches, forwards its command line, and exits.  Pure Rust on
// top of `ipc::Channel`.

use std::time::Duration;

use crate::error::Result;
use crate::ipc::{Channel, ChannelIdentity, ChannelOptions, InitOutcome, Role, MAX_PARAMS};

/// Channel id reserved for instance signaling.
pub const INSTANCE_CHANNEL: &str = "instance";

/// Command id of a forwarded launch.
pub const CMD_ACTIVATE: u32 = 1;

/// How long a secondary instance waits for room in a busy primary's queue.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// A launch forwarded by a secondary instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// The first [`MAX_PARAMS`] arguments of the secondary's command line.
    pub args: Vec<String>,
    /// Arguments that did not fit in one message.
    pub dropped: usize,
}

/// This process's claim on an application's instance channel.
pub struct SingleInstance {
    channel: Channel,
}

impl SingleInstance {
    /// Join the instance channel of (`app_id`, `version`).
    pub fn acquire(app_id: &str, version: u32) -> Result<Self> {
        let identity = ChannelIdentity::new(app_id, version, INSTANCE_CHANNEL)?;
        Self::with_options(
            identity,
            ChannelOptions {
                send_timeout: Some(FORWARD_TIMEOUT),
                ..ChannelOptions::default()
            },
        )
    }

    /// Join with explicit options.  The identity's channel id is replaced by
    /// [`INSTANCE_CHANNEL`].
    pub fn with_options(identity: ChannelIdentity, options: ChannelOptions) -> Result<Self> {
        let identity = identity.with_channel(INSTANCE_CHANNEL)?;
        let channel = Channel::with_options(identity, options);
        let outcome = channel.try_initialize()?;
        tracing::debug!(?outcome, "instance channel joined");
        debug_assert_ne!(outcome, InitOutcome::Failed);
        Ok(Self { channel })
    }

    /// `true` for the process that created the channel.
    pub fn is_primary(&self) -> bool {
        self.channel.role() == Some(Role::Master)
    }

    /// Hand this launch's arguments to the primary instance.
    pub fn forward_args<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        let total = u32::try_from(args.len()).unwrap_or(u32::MAX);
        let kept = &args[..args.len().min(MAX_PARAMS)];
        self.channel.try_send(CMD_ACTIVATE, total, kept)
    }

    /// Wait for the next forwarded launch.
    ///
    /// Messages with other command ids are skipped.  `None` when the
    /// channel's read timeout expires or a read fails.
    pub fn next_activation(&self) -> Option<Activation> {
        loop {
            let msg = self.channel.read()?;
            if msg.command != CMD_ACTIVATE {
                tracing::debug!(command = msg.command, "ignoring non-activation message");
                continue;
            }
            let dropped = (msg.flags as usize).saturating_sub(msg.params.len());
            return Some(Activation {
                args: msg.params,
                dropped,
            });
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

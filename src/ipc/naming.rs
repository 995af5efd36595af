// ── Channel identity & resource naming ───────────────────────────────────────
//
// Every process that wants to meet on a channel must derive byte-identical
// names from the same three inputs, so the format here is a wire contract:
//
//   <namespace>.ipc.<app-id>.r<VERSION-HEX>.<channel-id>.<role>
//
// No OS calls; the platform back-ends adapt these names (e.g. a leading `/`
// on POSIX) at the point of use.

use crate::error::{IpcError, Result};
use crate::hash;

use super::layout::HEADER_LEN;

/// Fixed prefix shared by every resource this library names.
pub const NAMESPACE: &str = "tether";

// ── Roles ─────────────────────────────────────────────────────────────────────

/// Which cross-process object a derived name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRole {
    /// Input to the header fingerprint; never opened as an object.
    Header,
    SharedMemory,
    ReadSemaphore,
    WriteSemaphore,
    /// Named mutex guarding the region where the OS has no handle-based lock.
    RegionLock,
}

impl ResourceRole {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::SharedMemory => "sharedmem",
            Self::ReadSemaphore => "semaph_rd",
            Self::WriteSemaphore => "semaph_wr",
            Self::RegionLock => "sharedmem_lock",
        }
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// The (application id, version, channel id) triple that names a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    app_id: String,
    version: u32,
    channel_id: String,
}

impl ChannelIdentity {
    /// Both ids must be non-empty; they may contain any characters.
    pub fn new(app_id: &str, version: u32, channel_id: &str) -> Result<Self> {
        if app_id.is_empty() {
            return Err(IpcError::InvalidIdentity("application id is empty"));
        }
        if channel_id.is_empty() {
            return Err(IpcError::InvalidIdentity("channel id is empty"));
        }
        Ok(Self {
            app_id: app_id.to_owned(),
            version,
            channel_id: channel_id.to_owned(),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Same application and version, different channel.
    pub fn with_channel(&self, channel_id: &str) -> Result<Self> {
        Self::new(&self.app_id, self.version, channel_id)
    }

    /// Full cross-process name for `role`.
    pub fn resource_name(&self, role: ResourceRole) -> String {
        format!(
            "{NAMESPACE}.ipc.{}.r{:X}.{}.{}",
            sanitize(&self.app_id),
            self.version,
            sanitize(&self.channel_id),
            role.tag()
        )
    }

    /// Hex digest of the header-role name, stored at the start of the region.
    ///
    /// # Panics
    ///
    /// If the digest length ever differs from [`HEADER_LEN`].  The header
    /// field is fixed-size shared layout; truncating or padding would let two
    /// builds disagree silently.
    pub fn header_fingerprint(&self) -> [u8; HEADER_LEN] {
        let digest = hash::sha1_hex(self.resource_name(ResourceRole::Header).as_bytes());
        assert_eq!(
            digest.len(),
            HEADER_LEN,
            "header fingerprint must be exactly {HEADER_LEN} bytes"
        );
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(digest.as_bytes());
        out
    }
}

/// Lowercase ASCII alphanumerics, `_` and `-`; every other character
/// (including each non-ASCII scalar) becomes `_`.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

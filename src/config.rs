// ── Channel configuration file ───────────────────────────────────────────────
//
// Reads and writes a small JSON description of a channel so that cooperating
// processes can be pointed at the same identity without recompiling.
// No `unsafe`; pure safe Rust + serde_json.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{IpcError, Result};
use crate::ipc::{ChannelIdentity, ChannelOptions};

// ── Format version ────────────────────────────────────────────────────────────

const CONFIG_VERSION: u32 = 1;

// ── On-disk type ──────────────────────────────────────────────────────────────

/// Root of the JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub version: u32,
    pub app_id: String,
    pub app_version: u32,
    pub channel_id: String,
    /// Milliseconds; absent means block indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
    /// Milliseconds; absent means block indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub tolerate_torn_reads: bool,
}

impl ChannelConfig {
    /// A config with no timeouts.
    pub fn new(app_id: &str, app_version: u32, channel_id: &str) -> Self {
        Self {
            version: CONFIG_VERSION,
            app_id: app_id.to_owned(),
            app_version,
            channel_id: channel_id.to_owned(),
            send_timeout_ms: None,
            read_timeout_ms: None,
            tolerate_torn_reads: false,
        }
    }

    /// Read and parse `path`.  Unknown format versions are rejected.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_json(&data)
    }

    fn from_json(data: &[u8]) -> Result<Self> {
        let cfg: Self = serde_json::from_slice(data)?;
        if cfg.version != CONFIG_VERSION {
            return Err(IpcError::UnsupportedConfigVersion(cfg.version));
        }
        Ok(cfg)
    }

    /// Write pretty-printed JSON to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn identity(&self) -> Result<ChannelIdentity> {
        ChannelIdentity::new(&self.app_id, self.app_version, &self.channel_id)
    }

    pub fn options(&self) -> ChannelOptions {
        ChannelOptions {
            send_timeout: self.send_timeout_ms.map(Duration::from_millis),
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            tolerate_torn_reads: self.tolerate_torn_reads,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("channel.json");

        let mut cfg = ChannelConfig::new("Relay", 3, "commands");
        cfg.read_timeout_ms = Some(250);
        cfg.save(&path).expect("save");

        let loaded = ChannelConfig::load(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.options().read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(loaded.options().send_timeout, None);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = br#"{"version":1,"app_id":"a","app_version":2,"channel_id":"c"}"#;
        let cfg = ChannelConfig::from_json(json).expect("parse");
        assert_eq!(cfg.options(), ChannelOptions::default());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let json = br#"{"version":9,"app_id":"a","app_version":2,"channel_id":"c"}"#;
        assert!(matches!(
            ChannelConfig::from_json(json),
            Err(IpcError::UnsupportedConfigVersion(9))
        ));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(
            ChannelConfig::from_json(b"{not json"),
            Err(IpcError::Json(_))
        ));
    }

    #[test]
    fn identity_requires_non_empty_ids() {
        let cfg = ChannelConfig::new("", 1, "c");
        assert!(matches!(cfg.identity(), Err(IpcError::InvalidIdentity(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            ChannelConfig::load(&dir.path().join("absent.json")),
            Err(IpcError::Io(_))
        ));
    }
}

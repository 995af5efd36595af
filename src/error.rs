// ── Central error type ────────────────────────────────────────────────────────
//
// All fallible operations in tether return `error::Result<T>`.  The public
// channel API folds these into `bool` / `Option` results after logging them;
// the `try_*` variants surface them unchanged.

/// Every error that tether can produce.
#[derive(Debug)]
pub enum IpcError {
    /// An OS API call returned a failure code.
    Os {
        /// The name of the failing function, for display purposes.
        function: &'static str,
        /// The raw OS error code (`errno` or `GetLastError()` value).
        code: i32,
    },

    /// A standard I/O error (config file open, read, write, …).
    Io(std::io::Error),

    /// A config file could not be parsed or serialised.
    Json(serde_json::Error),

    /// One of the channel identity inputs was unusable.
    InvalidIdentity(&'static str),

    /// An existing shared-memory region is smaller than the channel layout.
    RegionTooSmall { actual: usize, required: usize },

    /// An existing shared-memory region carries a foreign header fingerprint.
    HeaderMismatch,

    /// The status record failed checksum verification.
    StatusCorrupted,

    /// A message slot failed validation and was discarded.
    MessageCorrupted { slot: u32 },

    /// A blocking acquire ran past its configured timeout.
    Timeout,

    /// A config file declared a format version this build does not know.
    UnsupportedConfigVersion(u32),
}

impl IpcError {
    /// Capture the calling thread's last OS error for `function`.
    ///
    /// Call immediately after the failing API: the error slot is thread-local
    /// state that any later call can overwrite.
    pub(crate) fn last_os(function: &'static str) -> Self {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self::Os { function, code }
    }
}

impl std::fmt::Display for IpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Os { function, code } => {
                let text = std::io::Error::from_raw_os_error(*code);
                write!(f, "{function} failed (error {code:#x}): {text}")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Json(e) => write!(f, "config error: {e}"),
            Self::InvalidIdentity(what) => write!(f, "invalid channel identity: {what}"),
            Self::RegionTooSmall { actual, required } => {
                write!(f, "shared memory is {actual} bytes, channel needs {required}")
            }
            Self::HeaderMismatch => f.write_str("shared memory header belongs to another channel"),
            Self::StatusCorrupted => f.write_str("channel status failed checksum verification"),
            Self::MessageCorrupted { slot } => write!(f, "message in slot {slot} is corrupted"),
            Self::Timeout => f.write_str("timed out waiting for the channel"),
            Self::UnsupportedConfigVersion(v) => write!(f, "unsupported config version {v}"),
        }
    }
}

impl std::error::Error for IpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IpcError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

// Convert a windows-crate error (HRESULT) directly into an IpcError so that
// `?` can be used on `windows::core::Result<T>` throughout the win32 back-end.
#[cfg(windows)]
impl From<windows::core::Error> for IpcError {
    fn from(e: windows::core::Error) -> Self {
        // Win32 errors appear as 0x8007xxxx HRESULTs; the low word is the
        // GetLastError() code that `from_raw_os_error` knows how to render.
        let hr = e.code().0 as u32;
        let code = if hr & 0xFFFF_0000 == 0x8007_0000 { hr & 0xFFFF } else { hr };
        Self::Os {
            function: "windows",
            code: code as i32,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IpcError>;

// ── Tests ─────────────────────────────────────────────────────────────────────

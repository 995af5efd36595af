// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except:
//   • `platform::posix`  – shm_open / sem_open / mmap FFI
//   • `platform::win32`  – file mapping / semaphore / mutex FFI
//   • `platform::view`   – raw access to the mapped region
// Each unsafe block in those modules MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

//! Cross-process command channels over named shared memory.
//!
//! A [`Channel`] is a bounded ring of 128 fixed-size slots shared by every
//! process that names the same (application, version, channel) triple.
//! The first process to initialize becomes the master and owns the region;
//! later ones attach as slaves.  Any participant may send or read.

pub mod config;
pub mod error;
pub mod hash;
pub mod instance;
pub mod ipc;
pub(crate) mod platform;
pub mod text;

pub use config::ChannelConfig;
pub use error::{IpcError, Result};
pub use instance::{Activation, SingleInstance};
pub use ipc::{Channel, ChannelIdentity, ChannelOptions, InitOutcome, Message, Role};

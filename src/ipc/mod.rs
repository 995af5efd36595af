// ── Inter-process channel ─────────────────────────────────────────────────────
//
// Named, checksum-verified message ring shared between cooperating
// processes.  `naming` derives the cross-process names, `layout` owns the
// byte format, `channel` runs the protocol over `crate::platform`.

mod channel;
pub mod layout;
pub mod naming;

pub use channel::{Channel, ChannelOptions, InitOutcome, Message, Role};
pub use naming::{ChannelIdentity, ResourceRole};
pub use layout::{HEADER_LEN, MAX_PARAMS, MAX_PARAM_LEN, SLOT_COUNT};

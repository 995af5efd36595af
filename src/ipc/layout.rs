// ── Shared-memory layout ──────────────────────────────────────────────────────
//
// Explicit byte-level encoding of the region.  Nothing here overlays a Rust
// struct on shared memory: every field is a fixed-width little-endian integer
// at a fixed offset, so any compiler or language can read the same bytes.
//
//   offset 0            header      HEADER_LEN bytes (fingerprint, ASCII hex)
//   offset 40           status      counter u64 | write_index u32 | read_index u32
//                                   | checksum u64
//   offset 64 + i*SLOT  slot[i]     command u32 | flags u32 | values[4][4096]
//                                   | count u32 | timestamp u64 | checksum u64
//
// Checksums cover the payload bytes that precede them within the record.

use crate::hash;

/// Length of the header fingerprint field.
pub const HEADER_LEN: usize = 40;
/// Number of message slots in the ring.
pub const SLOT_COUNT: usize = 128;
/// Parameters carried by one message.
pub const MAX_PARAMS: usize = 4;
/// Bytes reserved for each parameter; longer values are truncated.
pub const MAX_PARAM_LEN: usize = 4096;

const CHECKSUM_LEN: usize = 8;

pub(crate) const STATUS_OFFSET: usize = HEADER_LEN;
const STATUS_PAYLOAD_LEN: usize = 8 + 4 + 4;
pub(crate) const STATUS_LEN: usize = STATUS_PAYLOAD_LEN + CHECKSUM_LEN;

pub(crate) const SLOTS_OFFSET: usize = STATUS_OFFSET + STATUS_LEN;
const PARAMS_OFFSET: usize = 8;
const COUNT_OFFSET: usize = PARAMS_OFFSET + MAX_PARAMS * MAX_PARAM_LEN;
const TIMESTAMP_OFFSET: usize = COUNT_OFFSET + 4;
const SLOT_PAYLOAD_LEN: usize = TIMESTAMP_OFFSET + 8;
pub(crate) const SLOT_LEN: usize = SLOT_PAYLOAD_LEN + CHECKSUM_LEN;

/// Minimum size of a region that can hold a channel.
pub const REGION_LEN: usize = SLOTS_OFFSET + SLOT_COUNT * SLOT_LEN;

/// Byte offset of slot `index` (taken modulo [`SLOT_COUNT`]).
pub(crate) fn slot_offset(index: u32) -> usize {
    SLOTS_OFFSET + (index as usize % SLOT_COUNT) * SLOT_LEN
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Ring bookkeeping shared by every participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Status {
    /// Messages ever sent on this region; never reset.
    pub(crate) counter: u64,
    pub(crate) write_index: u32,
    pub(crate) read_index: u32,
}

impl Status {
    /// Payload followed by its checksum.
    pub(crate) fn encode(&self) -> [u8; STATUS_LEN] {
        let mut out = [0u8; STATUS_LEN];
        out[0..8].copy_from_slice(&self.counter.to_le_bytes());
        out[8..12].copy_from_slice(&self.write_index.to_le_bytes());
        out[12..16].copy_from_slice(&self.read_index.to_le_bytes());
        let sum = hash::checksum(&out[..STATUS_PAYLOAD_LEN]);
        out[STATUS_PAYLOAD_LEN..].copy_from_slice(&sum.to_le_bytes());
        out
    }

    /// `None` when the stored checksum does not match the payload.
    pub(crate) fn decode(buf: &[u8; STATUS_LEN]) -> Option<Self> {
        let stored = le_u64(buf, STATUS_PAYLOAD_LEN);
        if stored != hash::checksum(&buf[..STATUS_PAYLOAD_LEN]) {
            return None;
        }
        Some(Self {
            counter: le_u64(buf, 0),
            write_index: le_u32(buf, 8),
            read_index: le_u32(buf, 12),
        })
    }

    pub(crate) fn advance_write(&mut self) {
        self.write_index = (self.write_index + 1) % SLOT_COUNT as u32;
    }

    pub(crate) fn advance_read(&mut self) {
        self.read_index = (self.read_index + 1) % SLOT_COUNT as u32;
    }
}

// ── Slots ─────────────────────────────────────────────────────────────────────

/// Longest prefix of `value` that fits a parameter field without splitting a
/// UTF-8 sequence.  ASCII input is cut at exactly [`MAX_PARAM_LEN`] bytes.
pub(crate) fn truncate_param(value: &str) -> &str {
    if value.len() <= MAX_PARAM_LEN {
        return value;
    }
    let mut end = MAX_PARAM_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Encode a message record into a full slot image, checksum included.
///
/// At most [`MAX_PARAMS`] parameters are stored; the caller has already
/// decided what to do about extras.
pub(crate) fn encode_slot(command: u32, flags: u32, params: &[&str], timestamp: u64) -> Vec<u8> {
    let mut out = vec![0u8; SLOT_LEN];
    out[0..4].copy_from_slice(&command.to_le_bytes());
    out[4..8].copy_from_slice(&flags.to_le_bytes());

    let params = &params[..params.len().min(MAX_PARAMS)];
    for (i, value) in params.iter().enumerate() {
        let bytes = truncate_param(value).as_bytes();
        let at = PARAMS_OFFSET + i * MAX_PARAM_LEN;
        out[at..at + bytes.len()].copy_from_slice(bytes);
    }

    out[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&(params.len() as u32).to_le_bytes());
    out[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&timestamp.to_le_bytes());
    let sum = hash::checksum(&out[..SLOT_PAYLOAD_LEN]);
    out[SLOT_PAYLOAD_LEN..].copy_from_slice(&sum.to_le_bytes());
    out
}

/// A slot image decoded without trusting it yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlotRecord {
    pub(crate) command: u32,
    pub(crate) flags: u32,
    pub(crate) params: Vec<String>,
    pub(crate) timestamp: u64,
    /// Whether the trailing checksum matched the payload.
    pub(crate) checksum_ok: bool,
}

/// Decode a slot image.  `buf` must be exactly [`SLOT_LEN`] bytes.
///
/// Parameters end at the first NUL in their field and are trimmed of
/// surrounding whitespace; only `count` of them are returned.
pub(crate) fn decode_slot(buf: &[u8]) -> SlotRecord {
    debug_assert_eq!(buf.len(), SLOT_LEN);
    let checksum_ok = le_u64(buf, SLOT_PAYLOAD_LEN) == hash::checksum(&buf[..SLOT_PAYLOAD_LEN]);

    // A damaged count is clamped rather than trusted.
    let count = (le_u32(buf, COUNT_OFFSET) as usize).min(MAX_PARAMS);
    let params = (0..count)
        .map(|i| {
            let at = PARAMS_OFFSET + i * MAX_PARAM_LEN;
            let field = &buf[at..at + MAX_PARAM_LEN];
            let len = field.iter().position(|&b| b == 0).unwrap_or(MAX_PARAM_LEN);
            String::from_utf8_lossy(&field[..len]).trim().to_owned()
        })
        .collect();

    SlotRecord {
        command: le_u32(buf, 0),
        flags: le_u32(buf, 4),
        params,
        timestamp: le_u64(buf, TIMESTAMP_OFFSET),
        checksum_ok,
    }
}

/// Byte offset of the checksum inside a slot image.
#[cfg(test)]
pub(crate) const SLOT_CHECKSUM_OFFSET: usize = SLOT_PAYLOAD_LEN;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn layout_constants() {
        assert_eq!(SLOTS_OFFSET, 64);
        assert_eq!(SLOT_LEN, 4 + 4 + 4 * 4096 + 4 + 8 + 8);
        assert_eq!(REGION_LEN, 64 + 128 * SLOT_LEN);
        assert_eq!(slot_offset(0), 64);
        assert_eq!(slot_offset(SLOT_COUNT as u32), slot_offset(0));
    }

    #[test]
    fn status_checksum_guards_payload() {
        let status = Status {
            counter: 41,
            write_index: 3,
            read_index: 2,
        };
        let mut bytes = status.encode();
        assert_eq!(Status::decode(&bytes), Some(status));
        bytes[9] ^= 0x80;
        assert_eq!(Status::decode(&bytes), None);
    }

    #[test]
    fn zeroed_status_is_not_trusted() {
        // A freshly zeroed region has no valid checksum until the creator
        // writes one.
        assert_eq!(Status::decode(&[0u8; STATUS_LEN]), None);
    }

    #[test]
    fn indices_wrap() {
        let mut s = Status {
            counter: 0,
            write_index: SLOT_COUNT as u32 - 1,
            read_index: SLOT_COUNT as u32 - 1,
        };
        s.advance_write();
        s.advance_read();
        assert_eq!((s.write_index, s.read_index), (0, 0));
    }

    #[test]
    fn slot_keeps_only_count_params_and_trims() {
        let image = encode_slot(7, 0xF0, &["  hello ", "world"], 12);
        let rec = decode_slot(&image);
        assert!(rec.checksum_ok);
        assert_eq!(rec.command, 7);
        assert_eq!(rec.flags, 0xF0);
        assert_eq!(rec.params, ["hello", "world"]);
        assert_eq!(rec.timestamp, 12);
    }

    #[test]
    fn extra_params_are_not_encoded() {
        let image = encode_slot(1, 0, &["a", "b", "c", "d", "e"], 0);
        assert_eq!(decode_slot(&image).params, ["a", "b", "c", "d"]);
    }

    #[test]
    fn flipped_payload_fails_checksum() {
        let mut image = encode_slot(1, 2, &["x"], 3);
        image[PARAMS_OFFSET] = b'y';
        assert!(!decode_slot(&image).checksum_ok);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = format!("{}é", "a".repeat(MAX_PARAM_LEN - 1));
        assert_eq!(truncate_param(&s).len(), MAX_PARAM_LEN - 1);
    }

    /// Up to 32 scalars, no NUL, no whitespace at either end.
    const TRIMMED_PARAM: &str = "([^\\s\\x00]([^\\x00]{0,30}[^\\s\\x00])?)?";

    proptest! {
        #[test]
        fn slot_round_trips(
            command in any::<u32>(),
            flags in any::<u32>(),
            timestamp in any::<u64>(),
            params in prop::collection::vec(TRIMMED_PARAM, 0..=MAX_PARAMS),
        ) {
            let refs: Vec<&str> = params.iter().map(String::as_str).collect();
            let rec = decode_slot(&encode_slot(command, flags, &refs, timestamp));
            prop_assert!(rec.checksum_ok);
            prop_assert_eq!(rec.command, command);
            prop_assert_eq!(rec.flags, flags);
            prop_assert_eq!(rec.timestamp, timestamp);
            prop_assert_eq!(rec.params, params);
        }

        #[test]
        fn ascii_params_truncate_to_field_width(len in 0usize..(2 * MAX_PARAM_LEN)) {
            let value = "x".repeat(len);
            let rec = decode_slot(&encode_slot(0, 0, &[value.as_str()], 0));
            prop_assert_eq!(rec.params[0].len(), len.min(MAX_PARAM_LEN));
        }
    }
}

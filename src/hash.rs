// ── Hash dispatch ─────────────────────────────────────────────────────────────
//
// Two hashes with two jobs: a cryptographic digest for names that other
// processes must reproduce exactly, and a fast non-cryptographic checksum for
// the records in shared memory.

use sha1::{Digest, Sha1};

/// Length of a [`sha1_hex`] string.
pub const SHA1_HEX_LEN: usize = 40;

/// Hex-encoded SHA-1 digest of `bytes`, lowercase.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Checksum trailing every status and slot record (xxh3, 64-bit).
#[inline]
pub fn checksum(bytes: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha1_hex_has_fixed_length() {
        assert_eq!(sha1_hex(b"").len(), SHA1_HEX_LEN);
        assert_eq!(sha1_hex(&[0u8; 10_000]).len(), SHA1_HEX_LEN);
    }

    #[test]
    fn checksum_detects_single_bit_flip() {
        let mut data = vec![7u8; 256];
        let before = checksum(&data);
        data[100] ^= 0x01;
        assert_ne!(before, checksum(&data));
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! FNV-1a 64-bit hashing used for node and pathway identities.

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Hash a byte slice with FNV-1a (64 bit).
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Chain two hashes: FNV-1a over their little-endian encodings.
///
/// This is how a checkpoint binds the node that created it to its parent.
pub fn chain(node_hash: u64, parent_hash: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&node_hash.to_le_bytes());
    bytes[8..].copy_from_slice(&parent_hash.to_le_bytes());
    fnv1a_64(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_empty_is_offset_basis() {
        assert_eq!(fnv1a_64(b""), FNV_OFFSET_BASIS);
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        // Published FNV-1a test vectors
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_chain_order_matters() {
        assert_ne!(chain(1, 2), chain(2, 1));
        assert_eq!(chain(42, 7), chain(42, 7));
    }
}

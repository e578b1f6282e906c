// SPDX-License-Identifier: AGPL-3.0

//! Cache keys: xxh3 for source texts and composite inputs, keccak256 for deployed code

use sha3::{Digest, Keccak256};
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Key of per-source caches
pub fn content_hash(text: &str) -> u64 {
    xxh3_64(text.as_bytes())
}

/// Hash of several byte strings. Each part is length-prefixed so `["ab", "c"]` and
/// `["a", "bc"]` differ.
pub fn composite_hash(parts: &[&[u8]]) -> u64 {
    let mut hasher = Xxh3::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.digest()
}

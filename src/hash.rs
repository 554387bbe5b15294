use sha2::{Digest, Sha256};

use crate::constants::hash::FALLBACK_ID_HEX_LEN;

/// SHA-256 based hashing so values are stable across runs, platforms and toolchains.
pub fn stable_hash_with(f: impl FnOnce(&mut Sha256)) -> u64 {
    let mut hasher = Sha256::new();
    f(&mut hasher);
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

pub fn stable_hash_str(seed: u64, value: &str) -> u64 {
    stable_hash_with(|hasher| {
        hasher.update(seed.to_le_bytes());
        hasher.update(value.as_bytes());
    })
}

/// Leading lower-case hex digits of `SHA-256(value)`.
pub fn stable_hex_digest(value: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(value.as_bytes()));
    digest[..FALLBACK_ID_HEX_LEN].to_string()
}

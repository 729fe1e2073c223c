//! Program digests (versioned).
//!
//! Requests carry ad hoc rule text, so log lines need a short, stable handle
//! for "the same program" across retries and replicas. We use a simple,
//! deterministic, non-cryptographic digest:
//!
//! - algorithm: **FNV-1a 64-bit**
//! - input: the UTF-8 bytes of the program text as received
//! - output: `"fnv1a64:<16 lowercase hex digits>"`
//!
//! This digest is **not** a security primitive.

/// Prefix used in serialized digests.
pub const PROGRAM_DIGEST_V1_PREFIX: &str = "fnv1a64:";

/// Compute a v1 digest (FNV-1a 64-bit) over arbitrary bytes.
pub fn fnv1a64_digest_bytes(bytes: &[u8]) -> String {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    format!("{PROGRAM_DIGEST_V1_PREFIX}{hash:016x}")
}

/// Compute the v1 digest for program text.
pub fn program_digest_v1(text: &str) -> String {
    fnv1a64_digest_bytes(text.as_bytes())
}

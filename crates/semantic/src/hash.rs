//! Digest-derived fallback embeddings.
//!
//! The vector is produced by chaining SHA-256 blocks over the text and a
//! little-endian block counter, reinterpreting every four digest bytes as an
//! `f32`. Non-finite values become `0.0` and everything is clipped to
//! `[-1, 1]`. Output is exactly `dim` wide, so it never needs padding, and is
//! identical across calls and processes.

use sha2::{Digest, Sha256};

pub const HASH_MODEL_NAME: &str = "hash-sha256";

const FLOATS_PER_BLOCK: usize = 32 / 4;

pub fn hash_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dim);
    let mut counter: u32 = 0;
    while out.len() < dim {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();

        for bytes in block.chunks_exact(4).take(FLOATS_PER_BLOCK) {
            if out.len() == dim {
                break;
            }
            let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            out.push(if value.is_finite() {
                value.clamp(-1.0, 1.0)
            } else {
                0.0
            });
        }
        counter = counter.wrapping_add(1);
    }
    out
}

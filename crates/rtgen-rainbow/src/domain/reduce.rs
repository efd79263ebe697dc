//! Reduction function
//!
//! Maps a digest back into the plaintext space. Each output position folds
//! two adjacent (wrapping) digest bytes, offset by the chain index, together
//! with a position score into the 62-symbol alphabet.

use crate::constants::{ALPHABET, ALPHABET_LEN, REDUCE_PRIME};

/// Reduce `hash` into `out`, filling every byte of `out`
///
/// Deterministic for a given `(hash, chain_index, seed_score, out.len())`.
/// Arithmetic wraps on overflow. An empty hash reduces as if all bytes were 0.
#[inline]
pub fn reduce_into(hash: &[u8], chain_index: u64, seed_score: u64, out: &mut [u8]) {
    let len = hash.len() as u64;
    let base = chain_index
        .wrapping_mul(seed_score)
        .wrapping_add(chain_index)
        .wrapping_add(seed_score);
    let offset = if len == 0 { 0 } else { chain_index % len };

    for (i, slot) in out.iter_mut().enumerate() {
        let combined = if len == 0 {
            0
        } else {
            let pos = (offset + i as u64) % len;
            let a = hash[pos as usize] as u64;
            let b = hash[((pos + 1) % len) as usize] as u64;
            (a << 8) | b
        };
        let score = base.wrapping_add(i as u64);
        let index = (combined.wrapping_add(score) % REDUCE_PRIME) % ALPHABET_LEN;
        *slot = ALPHABET[index as usize];
    }
}

/// Reduce `hash` into a new plaintext of `out_len` bytes
pub fn reduce(hash: &[u8], chain_index: u64, seed_score: u64, out_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_len];
    reduce_into(hash, chain_index, seed_score, &mut out);
    out
}

//! Chain construction
//!
//! A chain starts at a random plaintext seed and alternates hashing and
//! reduction `chain_length` times. Only the seed and the last reduced
//! plaintext (the terminal) are kept.

use rand::Rng;

use crate::config::RainbowConfig;
use crate::constants::ALPHABET;
use crate::domain::encoder::{Encoder, encoder_for};
use crate::domain::reduce::reduce_into;
use crate::error::Result;

/// Generated chain endpoints
///
/// `terminal.len() == seed.len()` always holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    /// Starting plaintext of the chain
    pub seed: Vec<u8>,
    /// Last reduced plaintext of the chain
    pub terminal: Vec<u8>,
}

impl Chain {
    /// Password length of this chain
    pub fn len(&self) -> usize {
        self.seed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seed.is_empty()
    }
}

/// Generate a random plaintext seed
///
/// Length is uniform in `[min_len, max_len]`, each byte uniform over the alphabet.
pub fn random_plaintext<R: Rng + ?Sized>(rng: &mut R, min_len: usize, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(min_len..=max_len);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

/// Builds chains with one encoder, reusing its digest buffer across chains
pub struct ChainBuilder {
    encoder: Box<dyn Encoder>,
    chain_length: u64,
    seed_score: u64,
    hash: Vec<u8>,
}

impl ChainBuilder {
    pub fn new(encoder: Box<dyn Encoder>, chain_length: u64, seed_score: u64) -> Self {
        let hash = Vec::with_capacity(encoder.digest_len());
        Self {
            encoder,
            chain_length,
            seed_score,
            hash,
        }
    }

    /// Create a builder with a fresh encoder for the configured algorithm
    pub fn from_config(config: &RainbowConfig) -> Result<Self> {
        let encoder = encoder_for(&config.hash_algorithm)?;
        Ok(Self::new(encoder, config.chain_length, config.seed_score))
    }

    /// Compute the chain starting at `seed`
    ///
    /// With a chain length of 0 the terminal equals the seed.
    pub fn build(&mut self, seed: Vec<u8>) -> Chain {
        let mut terminal = seed.clone();
        self.encoder.encode_into(&seed, &mut self.hash);

        for j in 0..self.chain_length {
            reduce_into(&self.hash, j, self.seed_score, &mut terminal);
            self.encoder.encode_into(&terminal, &mut self.hash);
        }

        Chain { seed, terminal }
    }

    /// Draw a random seed and compute its chain
    pub fn build_random<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        min_len: usize,
        max_len: usize,
    ) -> Chain {
        let seed = random_plaintext(rng, min_len, max_len);
        self.build(seed)
    }
}

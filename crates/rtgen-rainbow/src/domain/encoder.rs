//! Hash encoders
//!
//! Each algorithm name maps to a constructor in a fixed registry. Encoders
//! carry digest state, so every worker builds its own instance.

use sha1::Sha1;
use sha2::digest::{Digest, FixedOutputReset};
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// Uniform "hash bytes" capability
pub trait Encoder: Send {
    /// Digest size in bytes
    fn digest_len(&self) -> usize;

    /// Hash `input`, overwriting `out` with the digest
    ///
    /// Digest state is reset afterwards so the encoder can be reused.
    fn encode_into(&mut self, input: &[u8], out: &mut Vec<u8>);

    /// Hash `input` into a fresh buffer
    fn encode(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.digest_len());
        self.encode_into(input, &mut out);
        out
    }
}

/// Encoder backed by any RustCrypto fixed-output digest
#[derive(Default)]
pub struct DigestEncoder<D> {
    digest: D,
}

impl<D> Encoder for DigestEncoder<D>
where
    D: Digest + FixedOutputReset + Send,
{
    fn digest_len(&self) -> usize {
        <D as Digest>::output_size()
    }

    fn encode_into(&mut self, input: &[u8], out: &mut Vec<u8>) {
        Digest::update(&mut self.digest, input);
        out.clear();
        out.extend_from_slice(&self.digest.finalize_reset());
    }
}

type EncoderCtor = fn() -> Box<dyn Encoder>;

fn make<D>() -> Box<dyn Encoder>
where
    D: Digest + FixedOutputReset + Default + Send + 'static,
{
    Box::new(DigestEncoder::<D>::default())
}

/// Registered algorithms, keyed by normalized name
const ENCODERS: &[(&str, EncoderCtor)] = &[
    ("sha1", make::<Sha1>),
    ("sha224", make::<Sha224>),
    ("sha256", make::<Sha256>),
    ("sha384", make::<Sha384>),
    ("sha512", make::<Sha512>),
];

/// Lowercase and drop `-`/`_` so "SHA-256", "sha_256" and "sha256" agree
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Build a new encoder for a case-insensitive algorithm name
pub fn encoder_for(name: &str) -> Result<Box<dyn Encoder>> {
    let key = normalize(name);
    ENCODERS
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, ctor)| ctor())
        .ok_or_else(|| Error::UnsupportedAlgorithm(name.to_string()))
}

/// Names accepted by [`encoder_for`]
pub fn supported_algorithms() -> impl Iterator<Item = &'static str> {
    ENCODERS.iter().map(|(n, _)| *n)
}

//! Digests and entropy.

use fuzzyhash::FuzzyHash;
use md5::Md5;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

const CHUNK_SIZE: usize = 8192;

/// Hex digests of one buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
}

impl Digests {
    /// Compute every digest in a single pass.
    pub fn compute(data: &[u8]) -> Self {
        let mut md5 = Md5::new();
        let mut sha1 = Sha1::new();
        let mut sha256 = Sha256::new();
        let mut sha512 = Sha512::new();

        for chunk in data.chunks(CHUNK_SIZE) {
            md5.update(chunk);
            sha1.update(chunk);
            sha256.update(chunk);
            sha512.update(chunk);
        }

        Self {
            md5: hex::encode(md5.finalize()),
            sha1: hex::encode(sha1.finalize()),
            sha256: hex::encode(sha256.finalize()),
            sha512: hex::encode(sha512.finalize()),
        }
    }
}

/// Context triggered piecewise hash in the `blocksize:hash:hash` form.
pub fn ssdeep(data: &[u8]) -> String {
    FuzzyHash::new(data).to_string()
}

/// Shannon entropy in bits per byte (0.0 ..= 8.0).
pub fn entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut frequency = [0u64; 256];
    for &byte in data {
        frequency[byte as usize] += 1;
    }

    let len = data.len() as f64;
    frequency
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

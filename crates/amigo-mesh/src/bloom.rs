//! Bloom filter.
//!
//! Space-efficient set membership with no false negatives and a
//! controlled false-positive rate. Gossip serializes one of these into
//! every `RequestSync`; the dedup layer wraps one with a TTL side table.
//!
//! Sizing uses the standard optima: `m = ceil(-n * ln p / ln^2 2)` bits
//! and `k = round((m / n) * ln 2)` hash functions. Indexing uses double
//! hashing over a BLAKE3 digest of the element.

use amigo_crypto::blake3::{self, contexts};
use serde::{Deserialize, Serialize};

use crate::{MeshError, Result};

/// Minimum bit-vector size.
const MIN_BITS: u64 = 64;

/// Maximum hash function count.
const MAX_HASHES: u32 = 32;

/// A bloom filter over byte-string elements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Number of hash functions.
    k: u32,
    /// Bit-vector size in bits.
    m: u64,
    /// The bit vector, byte-packed.
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Create a filter sized for `expected` elements at the target
    /// false-positive rate.
    pub fn optimal(expected: usize, false_positive_rate: f64) -> Self {
        let n = expected.max(1) as f64;
        let p = false_positive_rate.clamp(0.000_01, 0.999_99);
        let m = ((-n * p.ln()) / (2.0_f64.ln().powi(2))).ceil().max(MIN_BITS as f64) as u64;
        let k = (((m as f64 / n) * 2.0_f64.ln()).round() as u32).clamp(1, MAX_HASHES);

        Self {
            k,
            m,
            bits: vec![0u8; m.div_ceil(8) as usize],
        }
    }

    /// Insert an element. Idempotent.
    pub fn insert(&mut self, element: &[u8]) {
        let (h1, h2) = element_hashes(element);
        for i in 0..self.k as u64 {
            let bit = index_at(h1, h2, i, self.m);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// Membership test: `false` means definitely absent.
    pub fn contains(&self, element: &[u8]) -> bool {
        let (h1, h2) = element_hashes(element);
        (0..self.k as u64).all(|i| {
            let bit = index_at(h1, h2, i, self.m);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Wire serialization: `k (1) || m (u32 BE) || bits`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.bits.len());
        out.push(self.k as u8);
        out.extend_from_slice(&(self.m as u32).to_be_bytes());
        out.extend_from_slice(&self.bits);
        out
    }

    /// Parse the wire serialization.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(MeshError::Snapshot("bloom filter too short".into()));
        }
        let k = data[0] as u32;
        let m = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as u64;
        let bits = &data[5..];
        if k == 0 || k > MAX_HASHES || m < MIN_BITS {
            return Err(MeshError::Snapshot(format!(
                "bloom parameters out of range: k={k}, m={m}"
            )));
        }
        if bits.len() as u64 != m.div_ceil(8) {
            return Err(MeshError::Snapshot(format!(
                "bloom bit vector length {} disagrees with m={m}",
                bits.len()
            )));
        }
        Ok(Self {
            k,
            m,
            bits: bits.to_vec(),
        })
    }
}

/// Two independent 64-bit hashes of an element.
fn element_hashes(element: &[u8]) -> (u64, u64) {
    let digest = blake3::derive_key(contexts::BLOOM_INDEX, element);
    let mut a = [0u8; 8];
    let mut b = [0u8; 8];
    a.copy_from_slice(&digest[..8]);
    b.copy_from_slice(&digest[8..16]);
    // Force the step odd so the probe sequence covers the table.
    (u64::from_le_bytes(a), u64::from_le_bytes(b) | 1)
}

fn index_at(h1: u64, h2: u64, i: u64, m: u64) -> u64 {
    h1.wrapping_add(i.wrapping_mul(h2)) % m
}

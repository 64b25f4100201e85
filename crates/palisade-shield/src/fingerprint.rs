//! # Fingerprint Engine
//!
//! Similarity descriptors computed per payload, used to recognise mutated
//! replays of known-bad prompts:
//!
//! - 64-bit **simhash** over 3-character shingles,
//! - 16-lane **minhash** for Jaccard estimation,
//! - the 32 smallest **shingle hashes** for direct overlap,
//! - a 256-bin **byte histogram** for cosine distance,
//! - Shannon entropy and original length.
//!
//! Similarity between two fingerprints is the weighted sum
//! `0.4·simhash + 0.3·minhash + 0.2·shingles + 0.1·histogram`, each term
//! in [0, 1]. The index stores (id, fingerprint) pairs and returns all
//! matches above a threshold, best first.

use crate::entropy::{fnv1a_32, murmur3_32, shannon_entropy};

/// Shingle window in bytes.
const SHINGLE_LEN: usize = 3;

/// Number of minhash lanes.
pub const MINHASH_LANES: usize = 16;

/// Number of stored shingle hashes.
pub const SHINGLE_SLOTS: usize = 32;

/// A payload fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub simhash: u64,
    pub minhash: [u32; MINHASH_LANES],
    pub shingles: [u32; SHINGLE_SLOTS],
    pub histogram: [u32; 256],
    pub entropy: f64,
    pub len: usize,
}

impl Fingerprint {
    /// Compute the fingerprint of a payload.
    pub fn of(text: &str) -> Self {
        let bytes = text.as_bytes();

        let mut histogram = [0u32; 256];
        for &b in bytes {
            histogram[b as usize] += 1;
        }

        let shingle_hashes: Vec<u32> = if bytes.len() >= SHINGLE_LEN {
            bytes
                .windows(SHINGLE_LEN)
                .map(fnv1a_32)
                .collect()
        } else if bytes.is_empty() {
            Vec::new()
        } else {
            vec![fnv1a_32(bytes)]
        };

        // Simhash: sum signed bit votes of every shingle hash widened to 64
        // bits by hashing twice with different seeds.
        let mut votes = [0i64; 64];
        for &sh in &shingle_hashes {
            let wide = ((murmur3_32(&sh.to_le_bytes(), 0x9747_b28c) as u64) << 32)
                | murmur3_32(&sh.to_le_bytes(), 0x85eb_ca6b) as u64;
            for (bit, vote) in votes.iter_mut().enumerate() {
                if wide >> bit & 1 == 1 {
                    *vote += 1;
                } else {
                    *vote -= 1;
                }
            }
        }
        let mut simhash = 0u64;
        for (bit, &vote) in votes.iter().enumerate() {
            if vote > 0 {
                simhash |= 1 << bit;
            }
        }

        // Minhash: per-lane minimum of seeded hashes over the shingles.
        let mut minhash = [u32::MAX; MINHASH_LANES];
        for &sh in &shingle_hashes {
            for (lane, slot) in minhash.iter_mut().enumerate() {
                let h = murmur3_32(&sh.to_le_bytes(), lane as u32);
                if h < *slot {
                    *slot = h;
                }
            }
        }

        // The smallest distinct shingle hashes, for direct overlap.
        let mut sorted = shingle_hashes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        let mut shingles = [0u32; SHINGLE_SLOTS];
        for (slot, &h) in shingles.iter_mut().zip(sorted.iter()) {
            *slot = h;
        }

        Self {
            simhash,
            minhash,
            shingles,
            histogram,
            entropy: shannon_entropy(bytes),
            len: bytes.len(),
        }
    }
}

/// Weighted similarity between two fingerprints, in [0, 1].
///
/// Symmetric, and `similarity(f, f) == 1.0` for any non-degenerate
/// fingerprint.
pub fn similarity(a: &Fingerprint, b: &Fingerprint) -> f64 {
    let simhash_sim = 1.0 - (a.simhash ^ b.simhash).count_ones() as f64 / 64.0;

    let jaccard = {
        let equal = a
            .minhash
            .iter()
            .zip(b.minhash.iter())
            .filter(|(x, y)| x == y)
            .count();
        equal as f64 / MINHASH_LANES as f64
    };

    let shingle_overlap = {
        let a_set: Vec<u32> = a.shingles.iter().copied().filter(|&h| h != 0).collect();
        let b_set: Vec<u32> = b.shingles.iter().copied().filter(|&h| h != 0).collect();
        if a_set.is_empty() && b_set.is_empty() {
            1.0
        } else if a_set.is_empty() || b_set.is_empty() {
            0.0
        } else {
            let shared = a_set.iter().filter(|h| b_set.contains(h)).count();
            shared as f64 / a_set.len().max(b_set.len()) as f64
        }
    };

    let cosine = {
        let dot: f64 = a
            .histogram
            .iter()
            .zip(b.histogram.iter())
            .map(|(&x, &y)| x as f64 * y as f64)
            .sum();
        let norm_a: f64 = a.histogram.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt();
        let norm_b: f64 = b.histogram.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt();
        if norm_a == 0.0 && norm_b == 0.0 {
            1.0
        } else if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    };

    0.4 * simhash_sim + 0.3 * jaccard + 0.2 * shingle_overlap + 0.1 * cosine
}

/// One match from an index search.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintMatch {
    pub id: String,
    pub similarity: f64,
}

/// An in-memory (id, fingerprint) index.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    entries: Vec<(String, Fingerprint)>,
    threshold: f64,
}

impl FingerprintIndex {
    pub fn new(threshold: f64) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
        }
    }

    pub fn add(&mut self, id: &str, fp: Fingerprint) {
        self.entries.push((id.to_string(), fp));
    }

    /// All entries at or above the index threshold, sorted by similarity
    /// descending (ties by id for determinism).
    pub fn search(&self, fp: &Fingerprint) -> Vec<FingerprintMatch> {
        let mut matches: Vec<FingerprintMatch> = self
            .entries
            .iter()
            .map(|(id, candidate)| FingerprintMatch {
                id: id.clone(),
                similarity: similarity(fp, candidate),
            })
            .filter(|m| m.similarity >= self.threshold)
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Rolling content digests
//!
//! A digest is fed chunk by chunk as chunks are acknowledged, so a resumed
//! transfer never hashes the same bytes twice. The finished value is
//! rendered in the encoding the backend reports: lowercase hex for SHA-256,
//! base64 for quickXorHash.

use base64::Engine;
use cloudmirror_core::ports::DigestAlgorithm;
use sha2::{Digest, Sha256};

// ============================================================================
// QuickXorHash implementation
// ============================================================================

/// OneDrive-compatible quickXorHash algorithm.
///
/// The algorithm works on a 160-bit (20-byte) hash state. For each input
/// byte, it is XOR-ed into the state at the current *bit* position and the
/// position advances by 11 bits (mod 160). After processing all input bytes
/// the total length (as a little-endian `u64`) is XOR-ed into the last
/// 8 bytes of the state.
#[derive(Debug, Clone)]
pub struct QuickXorHash {
    data: [u8; 20],
    shift: usize,
    length: u64,
}

impl QuickXorHash {
    /// Width of the hash in bits.
    const WIDTH_BITS: usize = 160;

    /// Number of bits the position advances per input byte.
    const SHIFT_STEP: usize = 11;

    pub fn new() -> Self {
        Self {
            data: [0u8; 20],
            shift: 0,
            length: 0,
        }
    }

    pub fn update(&mut self, input: &[u8]) {
        for &byte in input {
            let byte_pos = self.shift / 8;
            let bit_offset = self.shift % 8;

            self.data[byte_pos % 20] ^= byte << bit_offset;
            if bit_offset > 0 {
                self.data[(byte_pos + 1) % 20] ^= byte >> (8 - bit_offset);
            }

            self.shift = (self.shift + Self::SHIFT_STEP) % Self::WIDTH_BITS;
        }
        self.length += input.len() as u64;
    }

    pub fn finalize(mut self) -> [u8; 20] {
        let length_bytes = self.length.to_le_bytes();
        let tail = self.data.len() - length_bytes.len();
        for (i, &lb) in length_bytes.iter().enumerate() {
            self.data[tail + i] ^= lb;
        }
        self.data
    }
}

impl Default for QuickXorHash {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RollingDigest
// ============================================================================

/// Incremental digest in one of the supported algorithms
#[derive(Debug, Clone)]
pub enum RollingDigest {
    Sha256(Sha256),
    QuickXor(QuickXorHash),
}

impl RollingDigest {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => RollingDigest::Sha256(Sha256::new()),
            DigestAlgorithm::QuickXor => RollingDigest::QuickXor(QuickXorHash::new()),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            RollingDigest::Sha256(_) => DigestAlgorithm::Sha256,
            RollingDigest::QuickXor(_) => DigestAlgorithm::QuickXor,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            RollingDigest::Sha256(h) => h.update(data),
            RollingDigest::QuickXor(h) => h.update(data),
        }
    }

    /// Consumes the digest and renders it in the backend encoding
    pub fn finalize(self) -> String {
        match self {
            RollingDigest::Sha256(h) => format!("{:x}", h.finalize()),
            RollingDigest::QuickXor(h) => {
                base64::engine::general_purpose::STANDARD.encode(h.finalize())
            }
        }
    }

    /// Digest of `data` with the final chunk appended, leaving `self` untouched
    pub fn peek_with(&self, data: &[u8]) -> String {
        let mut copy = self.clone();
        copy.update(data);
        copy.finalize()
    }
}

/// One-shot digest of an in-memory buffer
pub fn digest_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut digest = RollingDigest::new(algorithm);
    digest.update(data);
    digest.finalize()
}

// src/siphash.rs - SipHash-2-4 edge generation keyed by a header digest

//! SipHash-2-4 implementation keying the pseudo-random bipartite graph.
//!
//! A job header of arbitrary length is digested with BLAKE2b-256 and the
//! 32-byte digest is split into four little-endian 64-bit keys k0..k3.
//! Edge `i` then has endpoints `sipnode(i, 0)` and `sipnode(i, 1)`, each a
//! node id of `edge_bits` significant bits.

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// The four SipHash keys derived from a job header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SipKeys {
    /// Key word 0.
    pub k0: u64,
    /// Key word 1.
    pub k1: u64,
    /// Key word 2.
    pub k2: u64,
    /// Key word 3.
    pub k3: u64,
}

impl SipKeys {
    /// Derive keys from a header: BLAKE2b-256 digest read as four LE words.
    pub fn from_header(header: &[u8]) -> Self {
        let mut hasher = Blake2bVar::new(32).expect("32 is a valid blake2b output size");
        hasher.update(header);
        let mut digest = [0u8; 32];
        hasher
            .finalize_variable(&mut digest)
            .expect("output buffer matches digest size");

        let mut cursor = Cursor::new(&digest[..]);
        SipKeys {
            k0: cursor.read_u64::<LittleEndian>().expect("digest has 32 bytes"),
            k1: cursor.read_u64::<LittleEndian>().expect("digest has 32 bytes"),
            k2: cursor.read_u64::<LittleEndian>().expect("digest has 32 bytes"),
            k3: cursor.read_u64::<LittleEndian>().expect("digest has 32 bytes"),
        }
    }

    /// SipHash-2-4 of one 64-bit word, state seeded directly from k0..k3.
    pub fn siphash24(&self, nonce: u64) -> u64 {
        let mut v0 = self.k0;
        let mut v1 = self.k1;
        let mut v2 = self.k2;
        let mut v3 = self.k3 ^ nonce;

        sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        sipround(&mut v0, &mut v1, &mut v2, &mut v3);

        v0 ^= nonce;
        v2 ^= 0xff;

        for _ in 0..4 {
            sipround(&mut v0, &mut v1, &mut v2, &mut v3);
        }

        v0 ^ v1 ^ v2 ^ v3
    }

    /// Endpoint of edge `edge` on side `side` (0 = U, 1 = V), masked to
    /// `edge_bits` significant bits.
    #[inline]
    pub fn sipnode(&self, edge: u64, side: u64, edge_mask: u64) -> u32 {
        (self.siphash24(2 * edge + side) & edge_mask) as u32
    }
}

/// One round of the SipHash mixing function.
#[inline]
fn sipround(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);

    *v2 = v2.wrapping_add(*v3);
    *v3 = v3.rotate_left(16);
    *v3 ^= *v2;

    *v0 = v0.wrapping_add(*v3);
    *v3 = v3.rotate_left(21);
    *v3 ^= *v0;

    *v2 = v2.wrapping_add(*v1);
    *v1 = v1.rotate_left(17);
    *v1 ^= *v2;
    *v2 = v2.rotate_left(32);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Classic SipHash-2-4 test vector, translated to the pre-mixed 4-key
    // state this implementation is seeded with.
    #[test]
    fn test_siphash_vector() {
        let k0 = 0x0706050403020100u64;
        let k1 = 0x0f0e0d0c0b0a0908u64;
        let keys = SipKeys {
            k0: k0 ^ 0x736f6d6570736575,
            k1: k1 ^ 0x646f72616e646f6d,
            k2: k0 ^ 0x6c7967656e657261,
            k3: k1 ^ 0x7465646279746573,
        };
        assert_eq!(keys.siphash24(0x0706050403020100), 0xa129ca6149be45e5);
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let header = [0x42u8; 80];
        let a = SipKeys::from_header(&header);
        let b = SipKeys::from_header(&header);
        assert_eq!(a, b);

        let mut other = header;
        other[0] = 0x43;
        assert_ne!(a, SipKeys::from_header(&other));
    }

    #[test]
    fn test_sipnode_masked() {
        let keys = SipKeys::from_header(&[0u8; 32]);
        let mask = (1u64 << 11) - 1;
        for edge in 0..256u64 {
            assert!(u64::from(keys.sipnode(edge, 0, mask)) <= mask);
            assert!(u64::from(keys.sipnode(edge, 1, mask)) <= mask);
        }
    }

    #[test]
    fn test_edge_endpoints_differ_by_side() {
        let keys = SipKeys::from_header(b"meancycle test header");
        let mask = (1u64 << 29) - 1;
        // Sides hash distinct words, so collisions should be rare.
        let same = (0..1024u64)
            .filter(|&e| keys.sipnode(e, 0, mask) == keys.sipnode(e, 1, mask))
            .count();
        assert!(same < 4);
    }
}

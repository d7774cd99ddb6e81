// src/verify.rs - Proof verification and the cyclehash digest

//! Verification of 42-cycle proofs.
//!
//! A proof is 42 edge nonces, sorted ascending. Verification rehashes
//! every nonce into its endpoints and checks that the induced edges form
//! one simple cycle of the full proof length: endpoint xors must cancel
//! per partition, every node must pair up with exactly one other edge,
//! and following the pairing must return to the start only after visiting
//! all 42 edges. Each way a proof can be malformed gets its own error,
//! since callers report the reason code over the ABI.
//!
//! The cyclehash, used as the proof-of-work digest, is BLAKE2b-256 over
//! the canonical little-endian encoding of the proof.

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use thiserror::Error;

use crate::params::{Params, PROOFSIZE};
use crate::siphash::SipKeys;

/// A 42-cycle proof: the witnessing edge nonces in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proof {
    /// Sorted edge nonces.
    pub nonces: [u32; PROOFSIZE],
}

impl Proof {
    /// BLAKE2b-256 of the proof's canonical wire encoding: 42 little-endian
    /// 32-bit nonces.
    pub fn cyclehash(&self) -> [u8; 32] {
        let mut hasher = Blake2bVar::new(32).expect("32 is a valid blake2b output size");
        for nonce in &self.nonces {
            hasher.update(&nonce.to_le_bytes());
        }
        let mut digest = [0u8; 32];
        hasher
            .finalize_variable(&mut digest)
            .expect("output buffer matches digest size");
        digest
    }
}

/// Reasons a proof fails verification.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// A nonce exceeds the edge mask.
    #[error("edge too big")]
    EdgeTooBig,
    /// Nonces are not strictly ascending.
    #[error("edges not ascending")]
    NotAscending,
    /// Endpoint xors do not cancel; some node has odd degree.
    #[error("endpoints don't match up")]
    EndpointsMismatch,
    /// Three or more edges meet at one node.
    #[error("branch in cycle")]
    Branch,
    /// The pairing dead-ends before closing.
    #[error("cycle dead ends")]
    DeadEnd,
    /// The pairing closes early, so the proof splits into shorter cycles.
    #[error("cycle too short")]
    CycleTooShort,
}

/// Check that `proof` is a single 42-cycle in the graph keyed by `keys`.
pub fn verify(params: &Params, keys: &SipKeys, proof: &Proof) -> Result<(), VerifyError> {
    let mut uvs = [0u32; 2 * PROOFSIZE];
    let mut xor0 = 0u32;
    let mut xor1 = 0u32;

    for (n, &nonce) in proof.nonces.iter().enumerate() {
        if u64::from(nonce) > params.edge_mask() {
            return Err(VerifyError::EdgeTooBig);
        }
        if n > 0 && nonce <= proof.nonces[n - 1] {
            return Err(VerifyError::NotAscending);
        }
        uvs[2 * n] = keys.sipnode(u64::from(nonce), 0, params.edge_mask());
        uvs[2 * n + 1] = keys.sipnode(u64::from(nonce), 1, params.edge_mask());
        xor0 ^= uvs[2 * n];
        xor1 ^= uvs[2 * n + 1];
    }
    if xor0 | xor1 != 0 {
        return Err(VerifyError::EndpointsMismatch);
    }

    // Follow the cycle: from edge end i, find the unique other edge end j
    // sharing its node, then cross to j's partner endpoint.
    let mut n = 0;
    let mut i = 0;
    loop {
        let mut j = i;
        let mut k = j;
        loop {
            k = (k + 2) % (2 * PROOFSIZE);
            if k == i {
                break;
            }
            if uvs[k] == uvs[i] {
                if j != i {
                    return Err(VerifyError::Branch);
                }
                j = k;
            }
        }
        if j == i {
            return Err(VerifyError::DeadEnd);
        }
        i = j ^ 1;
        n += 1;
        if i == 0 {
            break;
        }
    }
    if n == PROOFSIZE {
        Ok(())
    } else {
        Err(VerifyError::CycleTooShort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::toy_params;

    fn dummy_proof() -> Proof {
        let mut nonces = [0u32; PROOFSIZE];
        for (i, n) in nonces.iter_mut().enumerate() {
            *n = i as u32;
        }
        Proof { nonces }
    }

    #[test]
    fn test_rejects_unsorted() {
        let params = toy_params();
        let keys = SipKeys::from_header(&[0u8; 80]);
        let mut proof = dummy_proof();
        proof.nonces.swap(3, 4);
        assert_eq!(verify(&params, &keys, &proof), Err(VerifyError::NotAscending));
    }

    #[test]
    fn test_rejects_oversized_nonce() {
        let params = toy_params();
        let keys = SipKeys::from_header(&[0u8; 80]);
        let mut proof = dummy_proof();
        proof.nonces[PROOFSIZE - 1] = 1 << 20;
        assert_eq!(verify(&params, &keys, &proof), Err(VerifyError::EdgeTooBig));
    }

    #[test]
    fn test_rejects_random_nonces() {
        // Consecutive nonces almost never pair their endpoints up.
        let params = toy_params();
        let keys = SipKeys::from_header(b"not a solution");
        assert!(verify(&params, &keys, &dummy_proof()).is_err());
    }

    #[test]
    fn test_cyclehash_stable_and_sensitive() {
        let proof = dummy_proof();
        let h1 = proof.cyclehash();
        let h2 = proof.cyclehash();
        assert_eq!(h1, h2);

        let mut other = proof;
        other.nonces[0] ^= 1;
        assert_ne!(h1, other.cyclehash());
    }
}

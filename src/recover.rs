// src/recover.rs - Map a compressed cycle back to its edge nonces

//! Solution recovery.
//!
//! The cycle finder works on twice-renamed node ids, so a found cycle
//! names nodes the original graph has never heard of. Recovery walks the
//! two rename tables back to full node values, then re-enumerates the
//! nonce space: every nonce whose U endpoint lands in one of the cycle's
//! (X, Y) prefixes is hashed on both sides and matched against the 42
//! endpoint pairs. Distinct edges produce distinct pairs with
//! overwhelming probability, so every cycle edge resolves to exactly one
//! nonce; a slot left empty rejects the proof.

use hashbrown::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::graph::CycleEdge;
use crate::params::PROOFSIZE;
use crate::siphash::SipKeys;
use crate::trimmer::{TrimmedGraph, SIDE_U, SIDE_V};
use crate::verify::Proof;

/// Recovery failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoverError {
    /// A compressed id had no entry in a rename table; the ladder is
    /// corrupt.
    #[error("no rename entry for id {id:#x} on side {side} in slice {x}")]
    BadName {
        /// The id that failed to resolve.
        id: u32,
        /// Side index (0 = U, 1 = V).
        side: usize,
        /// X-slice searched.
        x: usize,
    },
    /// Re-enumeration left `missing` cycle edges without a nonce.
    #[error("recovery left {missing} of {PROOFSIZE} nonces unresolved")]
    IncompleteProof {
        /// Number of unfilled slots.
        missing: usize,
    },
}

/// Resolve a compressed id back to its full node value via the two-level
/// ladder: second-level name to first-level name to original Y·Z.
fn decompress(graph: &TrimmedGraph, side: usize, id2: u32) -> Result<u32, RecoverError> {
    let p = &graph.params;
    let x = (id2 >> p.z2_bits) as usize;
    let name2 = (id2 & ((1 << p.z2_bits) - 1)) as usize;
    let name1 = *graph.rename2[side]
        .get(x)
        .and_then(|s| s.get(name2))
        .ok_or(RecoverError::BadName { id: id2, side, x })?;
    let yz = *graph.rename1[side]
        .get(x)
        .and_then(|s| s.get(name1 as usize))
        .ok_or(RecoverError::BadName { id: name1, side, x })?;
    Ok(((x as u32) << p.yz_bits) | yz)
}

/// Recover the sorted edge nonces witnessing `cycle`.
pub fn recover(
    graph: &TrimmedGraph,
    keys: &SipKeys,
    cycle: &[CycleEdge],
) -> Result<Proof, RecoverError> {
    let p = &graph.params;

    // Decompress every endpoint and index the pairs by slot.
    let mut pair_slots: HashMap<(u32, u32), usize> = HashMap::with_capacity(PROOFSIZE);
    let mut xy_seen = vec![false; p.nx * p.nx];
    for (i, edge) in cycle.iter().enumerate() {
        let u = decompress(graph, SIDE_U, edge.u)?;
        let v = decompress(graph, SIDE_V, edge.v)?;
        pair_slots.insert((u, v), i);
        xy_seen[p.node_x(u) * p.nx + p.node_y(u)] = true;
    }

    // One sweep over the nonce space fills the slots.
    let mut slots: [Option<u32>; PROOFSIZE] = [None; PROOFSIZE];
    for nonce in 0..p.num_edges {
        let u = keys.sipnode(nonce, 0, p.edge_mask());
        if !xy_seen[p.node_x(u) * p.nx + p.node_y(u)] {
            continue;
        }
        let v = keys.sipnode(nonce, 1, p.edge_mask());
        if let Some(&slot) = pair_slots.get(&(u, v)) {
            if slots[slot].is_none() {
                slots[slot] = Some(nonce as u32);
            }
        }
    }

    let missing = slots.iter().filter(|s| s.is_none()).count();
    if missing > 0 {
        return Err(RecoverError::IncompleteProof { missing });
    }

    let mut nonces = [0u32; PROOFSIZE];
    for (out, slot) in nonces.iter_mut().zip(slots.iter()) {
        *out = slot.expect("all slots checked above");
    }
    nonces.sort_unstable();
    debug!(first = nonces[0], last = nonces[PROOFSIZE - 1], "cycle nonces recovered");
    Ok(Proof { nonces })
}

// src/graph.rs - Cycle detection on the trimmed edge list

//! Cycle finding over the surviving edges.
//!
//! After trimming reduces half a billion edges to a few thousand, this
//! module hunts for cycles of the proof length. The graph is tiny by now,
//! so the finder is a single-threaded forest walk: `cuckoo[u] = v` encodes
//! a partial matching as an index-to-index map over compressed node ids
//! (low bit = partition). For every edge, the paths from both endpoints
//! are followed to their roots; a shared root means the edge closes a
//! cycle, otherwise the shorter path is reversed and the trees join.
//!
//! A path longer than the hard cap indicates a corrupt table rather than
//! an unlucky graph, and aborts with a diagnostic.

use hashbrown::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use crate::params::{MAX_SOLS, PROOFSIZE};
use crate::trimmer::TrimmedGraph;

/// Sentinel for an unmatched node.
const NIL: u32 = u32::MAX;

/// One edge of a found cycle, in compressed second-level ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CycleEdge {
    /// Compressed U-side id, `x << z2_bits | name2`.
    pub u: u32,
    /// Compressed V-side id.
    pub v: u32,
}

/// Cycle finder failures. These indicate implementation bugs or memory
/// corruption, never bad luck, so they abort the solve.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A forest path outgrew the cube-root cap.
    #[error("cuckoo path grew to {len} nodes, table corrupt")]
    PathTooLong {
        /// Observed path length.
        len: usize,
    },
}

/// Search the trimmed edge list for proof-length cycles.
///
/// Returns every distinct cycle found, capped at [`MAX_SOLS`]. An empty
/// edge list is not an error; it simply yields no cycles.
pub fn find_cycles(graph: &TrimmedGraph) -> Result<Vec<Vec<CycleEdge>>, GraphError> {
    let p = &graph.params;
    if graph.edges.is_empty() {
        debug!("no edges survived trimming, skipping cycle search");
        return Ok(Vec::new());
    }

    let mut cuckoo = vec![NIL; 2 * p.nnodes2()];
    let mut us: Vec<u32> = Vec::with_capacity(64);
    let mut vs: Vec<u32> = Vec::with_capacity(64);
    let mut seen = HashSet::new();
    let mut cycles = Vec::new();

    for &rec in &graph.edges {
        let u0 = (rec >> 16) << 1;
        let v0 = ((rec & 0xffff) << 1) | 1;

        let mut nu = path(&cuckoo, u0, &mut us, p.max_path_len)?;
        let mut nv = path(&cuckoo, v0, &mut vs, p.max_path_len)?;

        if us[nu] == vs[nv] {
            // Shared root: the edge closes a cycle. Drop the common tail,
            // then measure what remains.
            let min = nu.min(nv);
            nu -= min;
            nv -= min;
            while us[nu] != vs[nv] {
                nu += 1;
                nv += 1;
            }
            let len = nu + nv + 1;
            debug!(len, "cycle closed");
            if len == PROOFSIZE {
                let cycle = collect_cycle(&us[..=nu], &vs[..=nv]);
                let mut key: Vec<u64> =
                    cycle.iter().map(|e| (u64::from(e.u) << 32) | u64::from(e.v)).collect();
                key.sort_unstable();
                if seen.insert(key) {
                    cycles.push(cycle);
                    if cycles.len() >= MAX_SOLS {
                        break;
                    }
                }
            }
        } else if nu < nv {
            // Reverse the shorter path and attach its root to the other
            // endpoint, keeping the forest invariant.
            while nu > 0 {
                cuckoo[us[nu] as usize] = us[nu - 1];
                nu -= 1;
            }
            cuckoo[u0 as usize] = v0;
        } else {
            while nv > 0 {
                cuckoo[vs[nv] as usize] = vs[nv - 1];
                nv -= 1;
            }
            cuckoo[v0 as usize] = u0;
        }
    }

    info!(cycles = cycles.len(), edges = graph.edges.len(), "cycle search complete");
    Ok(cycles)
}

/// Follow the matching from `start` to its root, recording every visited
/// node. Returns the index of the root in `buf`.
fn path(cuckoo: &[u32], start: u32, buf: &mut Vec<u32>, cap: usize) -> Result<usize, GraphError> {
    buf.clear();
    buf.push(start);
    let mut node = start;
    while cuckoo[node as usize] != NIL {
        node = cuckoo[node as usize];
        buf.push(node);
        if buf.len() > cap {
            return Err(GraphError::PathTooLong { len: buf.len() });
        }
    }
    Ok(buf.len() - 1)
}

/// Assemble the cycle edges: both path prefixes plus the closing edge.
/// Path entries alternate partitions, so consecutive entries are one edge.
fn collect_cycle(us: &[u32], vs: &[u32]) -> Vec<CycleEdge> {
    let mut cycle = Vec::with_capacity(PROOFSIZE);
    cycle.push(normalize(us[0], vs[0]));
    for w in us.windows(2) {
        cycle.push(normalize(w[0], w[1]));
    }
    for w in vs.windows(2) {
        cycle.push(normalize(w[0], w[1]));
    }
    cycle
}

/// Order an edge's endpoints as (U, V) using the partition bit and strip
/// the bit from both.
fn normalize(a: u32, b: u32) -> CycleEdge {
    if a & 1 == 0 {
        CycleEdge { u: a >> 1, v: b >> 1 }
    } else {
        CycleEdge { u: b >> 1, v: a >> 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::toy_params;
    use crate::trimmer::TrimStats;

    fn graph_with_edges(edges: Vec<u32>) -> TrimmedGraph {
        TrimmedGraph {
            params: toy_params(),
            edges,
            rename1: [Vec::new(), Vec::new()],
            rename2: [Vec::new(), Vec::new()],
            stats: TrimStats::default(),
        }
    }

    fn pack(u: u32, v: u32) -> u32 {
        (u << 16) | v
    }

    #[test]
    fn test_empty_graph_yields_nothing() {
        let cycles = find_cycles(&graph_with_edges(Vec::new())).unwrap();
        assert!(cycles.is_empty());
    }

    #[test]
    fn test_short_cycle_ignored() {
        // A 4-cycle: (0,100) (1,100) (1,101) (0,101). Closed but not the
        // proof length, so nothing is reported.
        let edges = vec![pack(0, 100), pack(1, 100), pack(1, 101), pack(0, 101)];
        let cycles = find_cycles(&graph_with_edges(edges)).unwrap();
        assert!(cycles.is_empty());
    }

    #[test]
    fn test_finds_42_cycle() {
        // 21 U nodes and 21 V nodes wired into a single 42-cycle:
        // u_i - v_i - u_{i+1} - ... - v_20 - u_0.
        let mut edges = Vec::new();
        for i in 0..21u32 {
            edges.push(pack(i, 100 + i));
            edges.push(pack((i + 1) % 21, 100 + i));
        }
        let cycles = find_cycles(&graph_with_edges(edges.clone())).unwrap();
        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.len(), PROOFSIZE);

        let expected: HashSet<CycleEdge> = edges
            .iter()
            .map(|&r| CycleEdge { u: r >> 16, v: r & 0xffff })
            .collect();
        let found: HashSet<CycleEdge> = cycle.iter().copied().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_42_cycle_with_chaff() {
        // The same 42-cycle plus a pendant chain that never closes.
        let mut edges = Vec::new();
        for i in 0..21u32 {
            edges.push(pack(i, 100 + i));
            edges.push(pack((i + 1) % 21, 100 + i));
        }
        edges.push(pack(50, 200));
        edges.push(pack(51, 200));
        edges.push(pack(51, 201));
        let cycles = find_cycles(&graph_with_edges(edges)).unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), PROOFSIZE);
    }

    #[test]
    fn test_duplicate_edges_harmless() {
        let edges = vec![pack(3, 7), pack(3, 7), pack(4, 7), pack(4, 8)];
        let cycles = find_cycles(&graph_with_edges(edges)).unwrap();
        assert!(cycles.is_empty());
    }
}

// src/solver.rs - Per-job solve pipeline

//! One solve from header to proofs.
//!
//! A [`SolverCtx`] owns the SipHash keys for a single job and drives the
//! pipeline: trim the graph, search the survivors for 42-cycles, recover
//! the witnessing nonces, and double-check each proof before reporting
//! it. All trimmer memory lives and dies inside [`SolverCtx::solve`];
//! only the proofs come back.

use thiserror::Error;
use tracing::{info, warn};

use crate::graph::{find_cycles, GraphError};
use crate::params::Params;
use crate::recover::{recover, RecoverError};
use crate::siphash::SipKeys;
use crate::trimmer::{TrimError, Trimmer};
use crate::verify::{verify, Proof};

/// Fatal solve failures. Any of these means "no solution for this job";
/// the worker logs the diagnostic and continues with the next input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// The trimming pipeline aborted.
    #[error("trimmer: {0}")]
    Trim(#[from] TrimError),
    /// The cycle finder detected corruption.
    #[error("cycle finder: {0}")]
    Graph(#[from] GraphError),
    /// The rename ladder failed to resolve a node.
    #[error("recovery: {0}")]
    Recover(#[from] RecoverError),
}

/// Solver context for one job.
pub struct SolverCtx {
    params: Params,
    keys: SipKeys,
}

impl SolverCtx {
    /// Key a context from a raw job header.
    pub fn new(params: Params, header: &[u8]) -> Self {
        let keys = SipKeys::from_header(header);
        SolverCtx { params, keys }
    }

    /// The derived SipHash keys.
    pub fn keys(&self) -> &SipKeys {
        &self.keys
    }

    /// Graph size exponent reported alongside proofs, `EDGEBITS + 1`.
    pub fn cuckoo_size(&self) -> u32 {
        self.params.edge_bits + 1
    }

    /// Run the full pipeline. Returns every verified proof found, which
    /// for most headers is none.
    pub fn solve(&self) -> Result<Vec<Proof>, SolveError> {
        info!(
            "🚀 starting solve, k0 k1 {:016x} {:016x}",
            self.keys.k0, self.keys.k1
        );

        let trimmed = Trimmer::new(self.params.clone()).trim(&self.keys)?;
        let cycles = find_cycles(&trimmed)?;

        let mut proofs = Vec::with_capacity(cycles.len());
        for cycle in &cycles {
            let proof = match recover(&trimmed, &self.keys, cycle) {
                Ok(proof) => proof,
                Err(err @ RecoverError::IncompleteProof { .. }) => {
                    // A cycle that cannot be witnessed is dropped, not fatal.
                    warn!(%err, "rejecting unrecoverable cycle");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            match verify(&self.params, &self.keys, &proof) {
                Ok(()) => proofs.push(proof),
                Err(err) => warn!(%err, "recovered proof failed verification, dropping"),
            }
        }

        info!(proofs = proofs.len(), "solve finished");
        Ok(proofs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::toy_params;
    use crate::verify;

    #[test]
    fn test_toy_solve_runs_clean() {
        // Most headers have no 42-cycle at toy size; the point is that the
        // whole pipeline runs without tripping a fatal error, and that any
        // proof it does emit survives independent verification.
        let params = toy_params();
        for seed in 0u8..6 {
            let mut header = [0u8; 80];
            header[0] = seed;
            let ctx = SolverCtx::new(params.clone(), &header);
            let proofs = ctx.solve().expect("toy solve must not abort");
            for proof in &proofs {
                verify::verify(&params, ctx.keys(), proof).expect("reported proof must verify");
                assert!(proof.nonces.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_solve_deterministic() {
        let params = toy_params();
        let header = [0x5au8; 80];
        let a = SolverCtx::new(params.clone(), &header).solve().unwrap();
        let b = SolverCtx::new(params, &header).solve().unwrap();
        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.iter().zip(b.iter()) {
            assert_eq!(pa.nonces, pb.nonces);
            assert_eq!(pa.cyclehash(), pb.cyclehash());
        }
    }

    #[test]
    fn test_keys_match_header_digest() {
        let params = toy_params();
        let header = hex::decode("a6c16443fc82250b49c7faa3876e7ab89ba687918cb00c4c10d6625e3a2e7bcc")
            .expect("valid hex");
        let ctx = SolverCtx::new(params, &header);
        let again = SipKeys::from_header(&header);
        assert_eq!(*ctx.keys(), again);
    }
}

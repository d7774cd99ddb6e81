// src/queue/mod.rs - Job queue types shared by the worker and the ABI

//! Queue plumbing between external callers and the solver worker.
//!
//! Callers push headers into a bounded input queue and poll an output
//! queue for solutions; a background worker owns the solver in between.
//! Push outcomes are reported as status codes rather than errors because
//! a full queue and a shutdown in progress are ordinary per-request
//! conditions the caller is expected to handle.

pub mod worker;

use crate::params::PROOFSIZE;

/// One job waiting to be solved.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Caller-chosen id correlating the result to this input.
    pub id: u32,
    /// Opaque 8-byte nonce echoed back with the result.
    pub nonce: [u8; 8],
    /// Header bytes hashed into the SipHash key.
    pub data: Vec<u8>,
}

/// One published solution.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Id of the input that produced this proof.
    pub id: u32,
    /// Nonce echoed from the input.
    pub nonce: [u8; 8],
    /// The 42 witnessing edge nonces, sorted ascending.
    pub nonces: [u32; PROOFSIZE],
    /// Graph size exponent the proof was found at.
    pub cuckoo_size: u32,
}

/// Outcome of a push onto the input queue. The discriminants are the ABI
/// return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PushStatus {
    /// Accepted.
    Ok = 0,
    /// Queue is at its bound.
    Full = 1,
    /// Header exceeds the size limit.
    TooLong = 2,
    /// Shutdown in progress.
    Stopped = 4,
}

// src/lib.rs - Main library file for the meancycle Cuckoo Cycle solver

//! meancycle - embedded Cuckoo Cycle mean solver
//!
//! A CPU solver for the Cuckoo Cycle memory-hard proof-of-work: a 32-byte
//! header keys a SipHash-generated bipartite graph and the solver hunts
//! for a 42-edge cycle in it. The heavy lifting is a bucketed, multi-round
//! edge-trimming pipeline that prunes leaves until only a few thousand
//! candidate edges remain, followed by a forest-walk cycle finder and a
//! nonce-recovery pass.
//!
//! The crate embeds as a shared worker: callers push headers onto a
//! bounded queue over the C ABI in [`ffi`], a background thread pulls and
//! solves them, and proofs come back on an output queue tagged with the
//! caller's job id.
//!
//! # Version History
//! - 0.1.0: Single-threaded trimmer, synchronous solves only
//! - 0.2.0: Two-stage bucketed rounds with worker blocks and rename compression
//! - 0.3.0: Job-queue worker behind the plugin ABI, property registry

#![warn(missing_docs)]
// The C ABI surface necessarily handles raw pointers.
#![allow(unsafe_code)]

/// Configuration for the solver engine.
pub mod config;
/// C ABI entry points.
pub mod ffi;
/// Cycle detection on trimmed edges.
pub mod graph;
/// Graph parameters and bit layout.
pub mod params;
/// Plugin property registry.
pub mod properties;
/// Job queue and background worker.
pub mod queue;
/// Solution recovery.
pub mod recover;
/// SipHash-2-4 edge generation.
pub mod siphash;
/// Per-job solve pipeline.
pub mod solver;
/// Edge generation and trimming engine.
pub mod trimmer;
/// Proof verification and cyclehash.
pub mod verify;

// Re-export the main types for convenience
pub use config::Settings;
pub use params::Params;
pub use queue::worker::Engine;
pub use siphash::SipKeys;
pub use solver::{SolveError, SolverCtx};
pub use verify::{Proof, VerifyError};

use thiserror::Error;

/// Main error type for meancycle
#[derive(Error, Debug)]
pub enum MeancycleError {
    /// Parameter validation errors
    #[error("parameter error: {0}")]
    Params(#[from] params::ParamsError),

    /// Solve pipeline errors
    #[error("solve error: {0}")]
    Solve(#[from] solver::SolveError),

    /// Proof verification errors
    #[error("verification error: {0}")]
    Verify(#[from] verify::VerifyError),

    /// Property registry errors
    #[error("property error: {0}")]
    Property(#[from] properties::PropertyError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO operation errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for meancycle operations
pub type Result<T> = std::result::Result<T, MeancycleError>;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Application name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging for embedding hosts that want it.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("{} v{}", NAME, VERSION);
    Ok(())
}

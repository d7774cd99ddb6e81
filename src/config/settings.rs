// src/config/settings.rs - Live solver tunables

use serde::{Deserialize, Serialize};

use crate::params::{MAX_QUEUE_SIZE, NUM_TRIMS_PARAM};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Runtime tunables applied on top of the build-time graph layout.
pub struct Settings {
    /// Trimming rounds per solve; must be even.
    pub ntrims: u32,
    /// Worker blocks the trimmer fans out over.
    pub nthreads: u32,
    /// Bound on the input queue.
    pub queue_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ntrims: NUM_TRIMS_PARAM,
            nthreads: num_cpus::get() as u32,
            queue_limit: MAX_QUEUE_SIZE,
        }
    }
}

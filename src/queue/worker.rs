// src/queue/worker.rs - Background solver worker and its engine state

//! The engine: queues, lifecycle flags and the worker loop.
//!
//! One [`Engine`] value owns everything the previous life of this code
//! kept in process-level globals: both channels, the stop flags and the
//! device bookkeeping. The worker is a dedicated OS thread that polls the
//! input queue, runs one solve at a time and publishes any proofs found.
//!
//! Shutdown protocol: `stop` raises `should_quit` (release); the worker
//! polls it between queue operations only, so an in-flight solve always
//! runs to completion. Once the loop exits it drains both queues and
//! raises `processing_finished`; `has_stopped` reports true only when the
//! loop has finished *and* no solve is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::params::{Params, MAX_DATA_LENGTH};
use crate::properties::{PropertyError, PropertyRegistry};
use crate::queue::{JobRequest, JobResult, PushStatus};
use crate::solver::SolverCtx;

/// Status record for the one CPU device this solver drives.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Device ordinal.
    pub device_id: u32,
    /// Graph size exponent, `EDGEBITS + 1`.
    pub cuckoo_size: u32,
    /// Human-readable device name.
    pub device_name: String,
    /// True while a solve is running.
    pub is_busy: bool,
    /// Epoch nanoseconds when the last solve started.
    pub last_start_time: u64,
    /// Epoch nanoseconds when the last solve ended.
    pub last_end_time: u64,
    /// Epoch nanoseconds when the last solution was found.
    pub last_solution_time: u64,
    /// Solves completed since start.
    pub iterations_completed: u32,
    /// True if any solve aborted with a fatal error.
    pub threw_error: bool,
    /// Whether the device is enabled.
    pub in_use: bool,
}

/// Engine state bridging external callers and the solver worker.
pub struct Engine {
    base: Params,
    settings: Mutex<Settings>,
    properties: PropertyRegistry,
    input_tx: Sender<JobRequest>,
    input_rx: Receiver<JobRequest>,
    output_tx: Sender<JobResult>,
    output_rx: Receiver<JobResult>,
    queue_limit: usize,
    should_quit: AtomicBool,
    processing_finished: AtomicBool,
    internal_finished: AtomicBool,
    worker_active: AtomicBool,
    device: Mutex<DeviceInfo>,
}

impl Engine {
    /// Build an engine around a base layout. Live tunables come from
    /// `settings`; everything else is fixed by `base`.
    pub fn new(base: Params, settings: Settings) -> Self {
        let queue_limit = settings.queue_limit;
        let (input_tx, input_rx) = bounded(queue_limit);
        let (output_tx, output_rx) = unbounded();
        let device = DeviceInfo {
            device_id: 0,
            cuckoo_size: base.edge_bits + 1,
            device_name: "cpu mean trimmer".to_string(),
            is_busy: false,
            last_start_time: 0,
            last_end_time: 0,
            last_solution_time: 0,
            iterations_completed: 0,
            threw_error: false,
            in_use: true,
        };
        Engine {
            base,
            settings: Mutex::new(settings),
            properties: PropertyRegistry::standard(),
            input_tx,
            input_rx,
            output_tx,
            output_rx,
            queue_limit,
            should_quit: AtomicBool::new(false),
            processing_finished: AtomicBool::new(true),
            internal_finished: AtomicBool::new(true),
            worker_active: AtomicBool::new(false),
            device: Mutex::new(device),
        }
    }

    /// Layout for the next job: the base layout with the live tunables
    /// applied. A tunable combination that fails validation falls back to
    /// the base layout rather than wedging the worker.
    pub fn job_params(&self) -> Params {
        let s = self.settings.lock().expect("settings lock");
        Params::new(
            self.base.edge_bits,
            self.base.x_bits,
            s.ntrims,
            self.base.compress_round,
            self.base.num_edges,
            s.nthreads as usize,
        )
        .unwrap_or_else(|err| {
            warn!(%err, "tunables rejected, using base layout");
            self.base.clone()
        })
    }

    /// True while the input queue has room for another job.
    pub fn is_queue_under_limit(&self) -> bool {
        if self.should_quit.load(Ordering::Relaxed) {
            return false;
        }
        self.input_tx.len() < self.queue_limit
    }

    /// Queue a job. Returns a status code, never blocks.
    pub fn push_input(&self, job: JobRequest) -> PushStatus {
        if self.should_quit.load(Ordering::Relaxed) {
            return PushStatus::Stopped;
        }
        if job.data.len() > MAX_DATA_LENGTH {
            return PushStatus::TooLong;
        }
        match self.input_tx.try_send(job) {
            Ok(()) => PushStatus::Ok,
            Err(TrySendError::Full(_)) => PushStatus::Full,
            Err(TrySendError::Disconnected(_)) => PushStatus::Stopped,
        }
    }

    /// Dequeue one result if any is waiting.
    pub fn read_output(&self) -> Option<JobResult> {
        if self.should_quit.load(Ordering::Relaxed) {
            return None;
        }
        self.output_rx.try_recv().ok()
    }

    /// Best-effort drain of both queues.
    pub fn clear_queues(&self) {
        while self.input_rx.try_recv().is_ok() {}
        while self.output_rx.try_recv().is_ok() {}
    }

    /// Launch the worker thread. Returns false if one is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .worker_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("worker already running, ignoring start");
            return false;
        }
        self.should_quit.store(false, Ordering::Release);
        self.processing_finished.store(false, Ordering::Release);
        let engine = Arc::clone(self);
        thread::Builder::new()
            .name("meancycle-worker".to_string())
            .spawn(move || engine.worker_loop())
            .map(|_| {
                info!("worker started");
                true
            })
            .unwrap_or_else(|err| {
                error!(%err, "failed to spawn worker");
                self.worker_active.store(false, Ordering::Release);
                self.processing_finished.store(true, Ordering::Release);
                false
            })
    }

    /// Request a graceful shutdown. The flag is polled at queue
    /// boundaries only; an in-flight solve runs to completion.
    pub fn stop(&self) {
        self.should_quit.store(true, Ordering::Release);
    }

    /// True once the worker loop and any in-flight solve have both
    /// finished.
    pub fn has_stopped(&self) -> bool {
        self.processing_finished.load(Ordering::Relaxed)
            && self.internal_finished.load(Ordering::Relaxed)
    }

    /// Clear the stop flag so the queues accept work again. Does not
    /// restart the worker.
    pub fn reset(&self) {
        self.should_quit.store(false, Ordering::Release);
    }

    /// Whether the back-end will accept another header right now.
    pub fn ready_for_work(&self) -> bool {
        !self.should_quit.load(Ordering::Relaxed)
    }

    /// Snapshot of the device status record.
    pub fn device_info(&self) -> DeviceInfo {
        self.device.lock().expect("device lock").clone()
    }

    /// The property registry describing the live tunables.
    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    /// Read a tunable by property name.
    pub fn get_property(&self, name: &str) -> Result<u32, PropertyError> {
        let s = self.settings.lock().expect("settings lock");
        match name {
            "NUM_THREADS_PARAM" => Ok(s.nthreads),
            "NUM_TRIMS_PARAM" => Ok(s.ntrims),
            _ => Err(PropertyError::NotFound),
        }
    }

    /// Set a tunable by property name, range-checked against the
    /// registry. Takes effect from the next solve.
    pub fn set_property(&self, name: &str, value: u32) -> Result<(), PropertyError> {
        let prop = self.properties.get(name).ok_or(PropertyError::NotFound)?;
        if value < prop.min_value || value > prop.max_value {
            return Err(PropertyError::OutsideRange);
        }
        let mut s = self.settings.lock().expect("settings lock");
        match name {
            "NUM_THREADS_PARAM" => s.nthreads = value,
            // Trim counts must stay even.
            "NUM_TRIMS_PARAM" => s.ntrims = value & !1,
            _ => return Err(PropertyError::NotFound),
        }
        Ok(())
    }

    /// The worker loop: drain inputs while ready, sleep briefly when the
    /// queue is empty, exit on the stop flag.
    fn worker_loop(self: Arc<Self>) {
        debug!("worker loop entered");
        while !self.should_quit.load(Ordering::Relaxed) {
            while self.ready_for_work() {
                match self.input_rx.try_recv() {
                    Ok(job) => self.process_job(job),
                    Err(_) => break,
                }
            }
            // Avoid a busy wait between polls.
            thread::sleep(Duration::from_micros(1));
        }
        self.clear_queues();
        self.processing_finished.store(true, Ordering::Release);
        self.worker_active.store(false, Ordering::Release);
        info!("worker stopped");
    }

    /// Run one job through the solver and publish any proof found.
    fn process_job(&self, job: JobRequest) {
        self.internal_finished.store(false, Ordering::Release);
        {
            let mut dev = self.device.lock().expect("device lock");
            dev.is_busy = true;
            dev.last_start_time = epoch_nanos();
        }

        let ctx = SolverCtx::new(self.job_params(), &job.data);
        match ctx.solve() {
            Ok(proofs) => {
                if let Some(proof) = proofs.first() {
                    let result = JobResult {
                        id: job.id,
                        nonce: job.nonce,
                        nonces: proof.nonces,
                        cuckoo_size: ctx.cuckoo_size(),
                    };
                    if self.output_tx.send(result).is_ok() {
                        let mut dev = self.device.lock().expect("device lock");
                        dev.last_solution_time = epoch_nanos();
                    }
                }
            }
            Err(err) => {
                error!(job = job.id, %err, "solve aborted");
                self.device.lock().expect("device lock").threw_error = true;
            }
        }

        {
            let mut dev = self.device.lock().expect("device lock");
            dev.is_busy = false;
            dev.last_end_time = epoch_nanos();
            dev.iterations_completed += 1;
        }
        self.internal_finished.store(true, Ordering::Release);
    }
}

fn epoch_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::toy_params;

    fn toy_engine() -> Arc<Engine> {
        let settings = Settings {
            ntrims: 12,
            nthreads: 2,
            queue_limit: 20,
        };
        Arc::new(Engine::new(toy_params(), settings))
    }

    fn job(id: u32) -> JobRequest {
        JobRequest {
            id,
            nonce: [0; 8],
            data: vec![0x4du8; 80],
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..5000 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached within timeout");
    }

    #[test]
    fn test_queue_backpressure() {
        let engine = toy_engine();
        for id in 0..20 {
            assert_eq!(engine.push_input(job(id)), PushStatus::Ok);
        }
        assert_eq!(engine.push_input(job(20)), PushStatus::Full);
        assert!(!engine.is_queue_under_limit());

        engine.clear_queues();
        assert!(engine.is_queue_under_limit());
        assert_eq!(engine.push_input(job(21)), PushStatus::Ok);
    }

    #[test]
    fn test_rejects_oversized_header() {
        let engine = toy_engine();
        let oversized = JobRequest {
            id: 0,
            nonce: [0; 8],
            data: vec![0u8; MAX_DATA_LENGTH + 1],
        };
        assert_eq!(engine.push_input(oversized), PushStatus::TooLong);
    }

    #[test]
    fn test_worker_consumes_jobs() {
        let engine = toy_engine();
        assert!(engine.start());
        for id in 0..3 {
            assert_eq!(engine.push_input(job(id)), PushStatus::Ok);
        }
        wait_for(|| engine.device_info().iterations_completed >= 3);
        engine.stop();
        wait_for(|| engine.has_stopped());
        assert!(!engine.device_info().threw_error);
    }

    #[test]
    fn test_shutdown_protocol() {
        let engine = toy_engine();
        assert!(engine.has_stopped());
        assert!(engine.start());
        assert_eq!(engine.push_input(job(0)), PushStatus::Ok);

        engine.stop();
        wait_for(|| engine.has_stopped());
        assert_eq!(engine.push_input(job(1)), PushStatus::Stopped);
        assert!(engine.read_output().is_none());

        // Reset clears the flag without restarting the worker.
        engine.reset();
        assert_eq!(engine.push_input(job(2)), PushStatus::Ok);
    }

    #[test]
    fn test_double_start_guarded() {
        let engine = toy_engine();
        assert!(engine.start());
        assert!(!engine.start());
        engine.stop();
        wait_for(|| engine.has_stopped());
    }

    #[test]
    fn test_property_roundtrip() {
        let engine = toy_engine();
        assert_eq!(engine.get_property("NUM_THREADS_PARAM"), Ok(2));
        engine.set_property("NUM_THREADS_PARAM", 4).unwrap();
        assert_eq!(engine.get_property("NUM_THREADS_PARAM"), Ok(4));

        // Trim counts are forced even.
        engine.set_property("NUM_TRIMS_PARAM", 91).unwrap();
        assert_eq!(engine.get_property("NUM_TRIMS_PARAM"), Ok(90));

        assert_eq!(
            engine.set_property("NUM_THREADS_PARAM", 10_000),
            Err(PropertyError::OutsideRange)
        );
        assert_eq!(
            engine.set_property("NO_SUCH_PARAM", 1),
            Err(PropertyError::NotFound)
        );
    }
}

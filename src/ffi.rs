// src/ffi.rs - C ABI entry points over the process-wide engine

//! The C ABI surface.
//!
//! Hosts drive the solver through these symbols. All of them resolve a
//! single process-wide [`Engine`] created on first use; the previous life
//! of this code scattered the same state across process-level globals,
//! here it is one value behind a `OnceLock`.
//!
//! `cuckoo_call` is the synchronous single-solve mode and runs on the
//! caller's thread; everything else talks to the background worker
//! through the queues and returns immediately.

use std::os::raw::{c_char, c_int};
use std::sync::{Arc, OnceLock};

use tracing::error;

use crate::config::Settings;
use crate::params::{Params, PROOFSIZE};
use crate::properties::PropertyError;
use crate::queue::worker::Engine;
use crate::queue::{JobRequest, PushStatus};
use crate::solver::SolverCtx;

static ENGINE: OnceLock<Arc<Engine>> = OnceLock::new();

/// The one-and-only engine, created on first ABI use.
fn engine() -> &'static Arc<Engine> {
    ENGINE.get_or_init(|| Arc::new(Engine::new(Params::standard(), Settings::default())))
}

/// Synchronous single solve. Writes 42 nonces through `sol_nonces` and
/// returns 1 if a cycle was found, 0 otherwise.
///
/// # Safety
///
/// `header_data` must point to `header_length` readable bytes and
/// `sol_nonces` to 42 writable u32 slots.
#[no_mangle]
pub unsafe extern "C" fn cuckoo_call(
    header_data: *const u8,
    header_length: c_int,
    sol_nonces: *mut u32,
) -> c_int {
    if header_data.is_null() || sol_nonces.is_null() || header_length < 0 {
        return 0;
    }
    let header = std::slice::from_raw_parts(header_data, header_length as usize);
    let ctx = SolverCtx::new(engine().job_params(), header);
    match ctx.solve() {
        Ok(proofs) => match proofs.first() {
            Some(proof) => {
                let out = std::slice::from_raw_parts_mut(sol_nonces, PROOFSIZE);
                out.copy_from_slice(&proof.nonces);
                1
            }
            None => 0,
        },
        Err(err) => {
            error!(%err, "synchronous solve aborted");
            0
        }
    }
}

/// Launch the background worker. Returns 0 on success, 1 on failure.
#[no_mangle]
pub extern "C" fn cuckoo_start_processing() -> c_int {
    if engine().start() {
        0
    } else {
        1
    }
}

/// Request a graceful worker shutdown. Always returns 1.
#[no_mangle]
pub extern "C" fn cuckoo_stop_processing() -> c_int {
    engine().stop();
    1
}

/// 1 once the worker loop and any in-flight solve have both finished.
#[no_mangle]
pub extern "C" fn cuckoo_has_processing_stopped() -> c_int {
    c_int::from(engine().has_stopped())
}

/// Clear the stop flag so the queues accept work again. Does not restart
/// the worker. Always returns 1.
#[no_mangle]
pub extern "C" fn cuckoo_reset_processing() -> c_int {
    engine().reset();
    1
}

/// 1 while the input queue has room for another job.
#[no_mangle]
pub extern "C" fn cuckoo_is_queue_under_limit() -> c_int {
    c_int::from(engine().is_queue_under_limit())
}

/// Queue a header for solving. Returns 0 ok, 1 queue full, 2 data too
/// long, 4 shutting down.
///
/// # Safety
///
/// `data` must point to `data_length` readable bytes and `nonce` to 8
/// readable bytes.
#[no_mangle]
pub unsafe extern "C" fn cuckoo_push_to_input_queue(
    id: u32,
    data: *const u8,
    data_length: u32,
    nonce: *const u8,
) -> c_int {
    if data.is_null() || nonce.is_null() {
        return PushStatus::TooLong as c_int;
    }
    let mut nonce_buf = [0u8; 8];
    nonce_buf.copy_from_slice(std::slice::from_raw_parts(nonce, 8));
    let job = JobRequest {
        id,
        nonce: nonce_buf,
        data: std::slice::from_raw_parts(data, data_length as usize).to_vec(),
    };
    engine().push_input(job) as c_int
}

/// Dequeue one solution. Returns 1 and fills the out-parameters on
/// success, 0 if the queue is empty.
///
/// # Safety
///
/// `id` and `cuckoo_size` must be writable, `output` must point to 42
/// writable u32 slots and `nonce` to 8 writable bytes.
#[no_mangle]
pub unsafe extern "C" fn cuckoo_read_from_output_queue(
    id: *mut u32,
    output: *mut u32,
    cuckoo_size: *mut u32,
    nonce: *mut u8,
) -> c_int {
    if id.is_null() || output.is_null() || cuckoo_size.is_null() || nonce.is_null() {
        return 0;
    }
    match engine().read_output() {
        Some(result) => {
            *id = result.id;
            *cuckoo_size = result.cuckoo_size;
            std::slice::from_raw_parts_mut(output, PROOFSIZE).copy_from_slice(&result.nonces);
            std::slice::from_raw_parts_mut(nonce, 8).copy_from_slice(&result.nonce);
            1
        }
        None => 0,
    }
}

/// Best-effort drain of both queues.
#[no_mangle]
pub extern "C" fn cuckoo_clear_queues() {
    engine().clear_queues();
}

/// Serialize the property registry into `prop_string` as a JSON array.
/// On entry `length` holds the buffer size; on success it is updated to
/// the string length (excluding the trailing NUL). Returns 0 ok or a
/// property status code.
///
/// # Safety
///
/// `prop_string` must point to `*length` writable bytes and `length`
/// must be readable and writable.
#[no_mangle]
pub unsafe extern "C" fn cuckoo_get_properties_as_json(
    prop_string: *mut c_char,
    length: *mut c_int,
) -> c_int {
    if prop_string.is_null() || length.is_null() {
        return PropertyError::BufferTooSmall.code();
    }
    let json = match engine().properties().to_json() {
        Ok(json) => json,
        Err(err) => {
            error!(%err, "property serialization failed");
            return PropertyError::TooLong.code();
        }
    };
    let available = *length;
    if available < 0 || (available as usize) < json.len() + 1 {
        return PropertyError::BufferTooSmall.code();
    }
    let out = std::slice::from_raw_parts_mut(prop_string as *mut u8, json.len() + 1);
    out[..json.len()].copy_from_slice(json.as_bytes());
    out[json.len()] = 0;
    *length = json.len() as c_int;
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    // The ABI shares one process-wide engine, so these checks run as a
    // single test to keep their ordering deterministic.
    #[test]
    fn test_queue_abi_roundtrip() {
        let data = [0u8; 80];
        let nonce = [0u8; 8];

        assert_eq!(cuckoo_has_processing_stopped(), 1);
        assert_eq!(cuckoo_is_queue_under_limit(), 1);

        let status = unsafe { cuckoo_push_to_input_queue(7, data.as_ptr(), 80, nonce.as_ptr()) };
        assert_eq!(status, 0);

        // Nothing solved yet, so the output queue is empty.
        let mut id = 0u32;
        let mut out = [0u32; PROOFSIZE];
        let mut size = 0u32;
        let mut out_nonce = [0u8; 8];
        let got = unsafe {
            cuckoo_read_from_output_queue(
                &mut id,
                out.as_mut_ptr(),
                &mut size,
                out_nonce.as_mut_ptr(),
            )
        };
        assert_eq!(got, 0);

        // Stop gates pushes with code 4 until reset.
        cuckoo_stop_processing();
        let status = unsafe { cuckoo_push_to_input_queue(8, data.as_ptr(), 80, nonce.as_ptr()) };
        assert_eq!(status, 4);
        assert_eq!(cuckoo_is_queue_under_limit(), 0);
        cuckoo_reset_processing();
        cuckoo_clear_queues();
        let status = unsafe { cuckoo_push_to_input_queue(9, data.as_ptr(), 80, nonce.as_ptr()) };
        assert_eq!(status, 0);
        cuckoo_clear_queues();
    }

    #[test]
    fn test_properties_json_abi() {
        let mut buf = vec![0 as c_char; 1024];
        let mut len = buf.len() as c_int;
        let code = unsafe { cuckoo_get_properties_as_json(buf.as_mut_ptr(), &mut len) };
        assert_eq!(code, 0);
        let bytes: Vec<u8> = buf[..len as usize].iter().map(|&b| b as u8).collect();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed.as_array().unwrap().len() >= 2);

        // A tiny buffer is refused with the buffer-too-small code.
        let mut small = [0 as c_char; 4];
        let mut small_len = small.len() as c_int;
        let code = unsafe { cuckoo_get_properties_as_json(small.as_mut_ptr(), &mut small_len) };
        assert_eq!(code, PropertyError::BufferTooSmall.code());
    }
}

//! # Quill POSIX port
//!
//! Hosted glue for developing and testing Quill applications on a
//! workstation: the std critical-section implementation, a thread-based
//! periodic tick source, a monotonic trace timestamp, and a pump that
//! drains the trace ring into a hosted backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use quill_qs::backend::{drain, TraceBackend, TraceError};
use quill_qs::Qs;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds since the first call; register as the QS timestamp source.
pub fn qs_get_time() -> u32 {
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u32
}

/// Thread-based periodic tick source driving one tick rate.
pub struct Ticker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Starts calling `quill_qf::tick(rate)` every `period` until stopped.
    pub fn start(rate: u8, period: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                thread::sleep(period);
                quill_qf::tick(rate);
            }
        });
        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Thread that pumps the trace ring into a backend at a fixed cadence.
pub struct TracePump {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), TraceError>>>,
}

impl TracePump {
    pub fn start<const N: usize>(
        qs: &'static Qs<N>,
        backend: Arc<dyn TraceBackend>,
        period: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            while flag.load(Ordering::Relaxed) {
                drain(qs, backend.as_ref())?;
                thread::sleep(period);
            }
            // Final sweep so shutdown does not strand buffered records.
            drain(qs, backend.as_ref())
        });
        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) -> Result<(), TraceError> {
        self.running.store(false, Ordering::Relaxed);
        match self.handle.take() {
            Some(handle) => handle.join().expect("trace pump panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TracePump {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

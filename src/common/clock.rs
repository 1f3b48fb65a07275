use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::common::{Error, Result};

/// Time source injected into jobs so tests can pin the clock.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
    fn cpu_nanos(&self) -> u64;
    /// Wall clock in seconds since the epoch.
    fn current_time(&self) -> Result<u64>;
}

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    fn cpu_nanos(&self) -> u64 {
        // Monotonic time stands in for per-thread cpu time; the engine only
        // reports deltas.
        self.start.elapsed().as_nanos() as u64
    }

    fn current_time(&self) -> Result<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|e| Error::Other(format!("clock drifted before epoch: {:?}", e)))
    }
}

/// A clock that only moves when told to. Test use.
#[derive(Default)]
pub struct ManualClock {
    micros: AtomicU64,
    seconds: AtomicU64,
    fail_current_time: std::sync::atomic::AtomicBool,
}

impl ManualClock {
    pub fn set_current_time(&self, secs: u64) {
        self.seconds.store(secs, Ordering::Release);
    }

    pub fn advance_micros(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }

    pub fn set_fail_current_time(&self, fail: bool) {
        self.fail_current_time.store(fail, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::Acquire)
    }

    fn cpu_nanos(&self) -> u64 {
        self.micros.load(Ordering::Acquire) * 1000
    }

    fn current_time(&self) -> Result<u64> {
        if self.fail_current_time.load(Ordering::Acquire) {
            return Err(Error::Other("manual clock unavailable".to_string()));
        }
        Ok(self.seconds.load(Ordering::Acquire))
    }
}

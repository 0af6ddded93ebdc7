use std::sync::Mutex;
use std::time::Instant;

/// Milliseconds elapsed since a trace began.
pub trait Clock: Send + Sync {
    fn elapsed_ms(&self) -> f64;
}

#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn elapsed_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock that only moves when told to. Used to pin timestamps in tests and
/// replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Mutex<f64>,
}

impl ManualClock {
    pub fn new(now_ms: f64) -> Self {
        Self {
            now_ms: Mutex::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: f64) {
        if let Ok(mut now) = self.now_ms.lock() {
            *now = now_ms;
        }
    }

    pub fn advance(&self, delta_ms: f64) {
        if let Ok(mut now) = self.now_ms.lock() {
            *now += delta_ms;
        }
    }
}

impl Clock for ManualClock {
    fn elapsed_ms(&self) -> f64 {
        self.now_ms.lock().map(|now| *now).unwrap_or_default()
    }
}

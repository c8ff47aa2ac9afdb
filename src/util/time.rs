//! Time utilities for the simulation loop

use std::time::{Duration, Instant};

/// Movement tick rate
pub const TICK_RATE_HZ: u32 = 60;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Nominal spacing between movement ticks
pub fn tick_duration() -> Duration {
    Duration::from_micros(1_000_000 / TICK_RATE_HZ as u64)
}

/// Measures wall-clock time between successive laps.
///
/// Uses tokio's clock so paused-time tests see deterministic deltas.
#[derive(Debug, Clone)]
pub struct LapTimer {
    last: tokio::time::Instant,
}

impl LapTimer {
    pub fn new() -> Self {
        Self {
            last: tokio::time::Instant::now(),
        }
    }

    /// Seconds since the previous lap (or construction), then restart
    pub fn lap_secs(&mut self) -> f64 {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        elapsed.as_secs_f64()
    }
}

impl Default for LapTimer {
    fn default() -> Self {
        Self::new()
    }
}

//! Heartbeat blinker.
//!
//! Toggles the status LED on a fixed period and bumps a global tick
//! counter. A stalled counter under an external watchdog means the
//! firmware stopped scheduling low-priority work.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::drivers::status_led::StatusLed;

pub const HEARTBEAT_PERIOD_MS: u64 = 500;

static HEARTBEAT_TICKS: AtomicU32 = AtomicU32::new(0);

/// Ticks since boot; wraps.
pub fn ticks() -> u32 {
    HEARTBEAT_TICKS.load(Ordering::Relaxed)
}

/// Blink until `shutdown` is raised. Runs as its own low-priority task.
pub fn run(shutdown: Arc<AtomicBool>) {
    let mut led = StatusLed::new();
    while !shutdown.load(Ordering::Relaxed) {
        led.toggle();
        HEARTBEAT_TICKS.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(HEARTBEAT_PERIOD_MS));
    }
    led.set(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_advances_while_running() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let before = ticks();
        let handle = {
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || run(shutdown))
        };
        // Two periods is enough for at least one tick.
        std::thread::sleep(Duration::from_millis(HEARTBEAT_PERIOD_MS * 2));
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert!(ticks().wrapping_sub(before) >= 1);
    }
}

//! Combined temperature sample and the single-slot hand-off channel.
//!
//! The sampler publishes at 10 ms granularity, the control task consumes
//! at 20 ms granularity; a queue would only add latency. The slot keeps
//! exactly the newest sample: `publish` overwrites and never blocks,
//! `take_latest` waits a bounded interval, and `try_take` lets the
//! consumer flush anything published while it was busy so it always acts
//! on the freshest reading. Staleness is preferred over queuing delay.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One time-stamped pair of temperature readings, produced once per
/// sampling cycle. Immutable once published; superseded, never merged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedSample {
    /// NTC thermistor reading (°C).
    pub system_c: f32,
    /// DS18B20 engine probe reading (°C). `NaN` while the probe is
    /// disconnected.
    pub engine_c: f32,
    /// Uptime at publish (ms).
    pub ts_ms: u32,
}

impl CombinedSample {
    /// Whether the engine reading can be trusted by the auto ramp.
    pub fn engine_valid(&self) -> bool {
        self.engine_c.is_finite()
    }
}

/// Capacity-1 overwrite channel (the `xQueueOverwrite` pattern).
pub struct SampleSlot<T> {
    slot: Mutex<Option<T>>,
    published: Condvar,
}

impl<T> Default for SampleSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SampleSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            published: Condvar::new(),
        }
    }

    /// Replace any unread value with `value`. Always succeeds
    /// immediately; the producer is never blocked by a slow consumer.
    pub fn publish(&self, value: T) {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(value);
        self.published.notify_one();
    }

    /// Take the most recent published value, waiting at most `timeout`
    /// for one to arrive. Returns `None` on timeout.
    pub fn take_latest(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let (next, _timed_out) = self
                .published
                .wait_timeout(guard, timeout)
                .unwrap_or_else(|e| e.into_inner());
            guard = next;
        }
        guard.take()
    }

    /// Non-blocking drain: the most recent value if one is pending.
    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn publish_overwrites_take_yields_newest() {
        let slot = SampleSlot::new();
        for i in 0..50u32 {
            slot.publish(i);
        }
        assert_eq!(slot.try_take(), Some(49));
        // No duplication: the value is consumed.
        assert_eq!(slot.try_take(), None);
    }

    #[test]
    fn take_latest_times_out_when_empty() {
        let slot: SampleSlot<u32> = SampleSlot::new();
        let start = std::time::Instant::now();
        assert_eq!(slot.take_latest(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn take_latest_wakes_on_publish() {
        let slot = Arc::new(SampleSlot::new());
        let producer = Arc::clone(&slot);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.publish(7u32);
        });
        assert_eq!(slot.take_latest(Duration::from_secs(2)), Some(7));
        t.join().unwrap();
    }

    #[test]
    fn sample_validity_tracks_nan() {
        let ok = CombinedSample {
            system_c: 40.0,
            engine_c: 80.0,
            ts_ms: 0,
        };
        assert!(ok.engine_valid());
        let bad = CombinedSample {
            engine_c: f32::NAN,
            ..ok
        };
        assert!(!bad.engine_valid());
    }
}

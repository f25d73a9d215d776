//! The two periodic tasks and their wiring.
//!
//! The sampler owns the sensors and publishes into the single-slot
//! sample channel; the control task drains it, evaluates the fan
//! decision on its own cadence, and drives the actuator. Each loop body
//! lives in a struct with a `tick(now_ms)` method so the timing logic
//! runs under host tests without threads.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::adapters::time::Esp32TimeAdapter;
use crate::control::{self, FanCommand};
use crate::drivers::pwm::FanPwm;
use crate::drivers::task_pin::{self, Core};
use crate::drivers::{heartbeat, hw_init};
use crate::pins;
use crate::sample::{CombinedSample, SampleSlot};
use crate::sensors::SensorHub;
use crate::status::{SharedStatus, StatusSnapshot};
use crate::store::ConfigStore;

/// Sampler task slice. Each pass is a timestamp check unless a sensor
/// interval elapsed.
pub const SAMPLER_SLICE_MS: u64 = 10;
/// Control task slice; decisions happen on `fan_control_interval`.
pub const CONTROL_SLICE_MS: u64 = 20;
/// Bounded wait for a fresh sample before reusing the previous one.
pub const SAMPLE_WAIT_MS: u64 = 50;

/// Sampler loop body: advance the sensor hub, publish the combined
/// sample.
pub struct SamplerTask {
    store: Arc<ConfigStore>,
    slot: Arc<SampleSlot<CombinedSample>>,
    hub: SensorHub,
}

impl SamplerTask {
    pub fn new(store: Arc<ConfigStore>, slot: Arc<SampleSlot<CombinedSample>>) -> Self {
        Self {
            store,
            slot,
            hub: SensorHub::new(),
        }
    }

    pub fn tick(&mut self, now_ms: u32) {
        let interval = self.store.snapshot().temp_sample_interval_ms;
        let sample = self.hub.poll(now_ms, interval);
        // Overwrite semantics: the control task only ever wants the
        // newest sample, a backlog has no value.
        self.slot.publish(sample);
    }
}

/// Control loop body: drain the slot, decide, actuate, publish status.
pub struct ControlTask {
    store: Arc<ConfigStore>,
    slot: Arc<SampleSlot<CombinedSample>>,
    pwm: Arc<Mutex<FanPwm>>,
    status: Arc<SharedStatus>,
    last_act_ms: u32,
    last_sample: Option<CombinedSample>,
    last_cmd: FanCommand,
}

impl ControlTask {
    pub fn new(
        store: Arc<ConfigStore>,
        slot: Arc<SampleSlot<CombinedSample>>,
        pwm: Arc<Mutex<FanPwm>>,
        status: Arc<SharedStatus>,
    ) -> Self {
        Self {
            store,
            slot,
            pwm,
            status,
            last_act_ms: 0,
            last_sample: None,
            last_cmd: FanCommand::OFF,
        }
    }

    /// One slice: pick up the newest sample if any, and act when the
    /// control interval has elapsed. `wait` bounds the block on an
    /// empty slot; tests pass `Duration::ZERO`.
    pub fn tick(&mut self, now_ms: u32, wait: Duration) {
        if let Some(sample) = self.slot.take_latest(wait) {
            self.last_sample = Some(sample);
        }

        let cfg = self.store.snapshot();
        if now_ms.wrapping_sub(self.last_act_ms) < cfg.fan_control_interval {
            return;
        }
        let Some(sample) = self.last_sample else {
            return;
        };
        self.last_act_ms = now_ms;

        let cmd = control::evaluate(&cfg, &sample);
        let cutoff = sample.system_c > cfg.system_temp_alert as f32;
        if self.store.latch_alarm(cutoff) && cutoff {
            warn!(
                "safety cutoff: system {:.1} °C > {} °C, fan forced off",
                sample.system_c, cfg.system_temp_alert
            );
        }

        {
            let mut pwm = self.pwm.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = pwm.write(cmd.duty) {
                warn!("fan duty write failed: {e}");
            }
        }
        if cmd != self.last_cmd {
            info!("fan -> {}% (duty {})", cmd.percent, cmd.duty);
            self.last_cmd = cmd;
        }

        self.status.publish(StatusSnapshot {
            system_c: sample.system_c,
            engine_c: sample.engine_c,
            ts_ms: sample.ts_ms,
            fan_mode: cfg.fan_mode,
            target_percent: cmd.percent,
            target_duty: cmd.duty,
            alarm_active: self.store.alarm_active(now_ms),
        });
    }
}

/// Handles to the running tasks plus the shared shutdown flag.
pub struct TaskSet {
    pub shutdown: Arc<AtomicBool>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl TaskSet {
    /// Raise the shutdown flag and join every task.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Spawn sampler (core 0), control (core 1) and heartbeat (core 0).
pub fn spawn_tasks(
    store: Arc<ConfigStore>,
    slot: Arc<SampleSlot<CombinedSample>>,
    pwm: Arc<Mutex<FanPwm>>,
    status: Arc<SharedStatus>,
    time: Arc<Esp32TimeAdapter>,
) -> TaskSet {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    {
        let mut task = SamplerTask::new(Arc::clone(&store), Arc::clone(&slot));
        let time = Arc::clone(&time);
        let shutdown = Arc::clone(&shutdown);
        handles.push(task_pin::spawn_on_core(
            Core::Pro,
            pins::SAMPLER_TASK_PRIORITY,
            8,
            "sensors\0",
            move || {
                while !shutdown.load(Ordering::Relaxed) {
                    task.tick(time.uptime_ms());
                    std::thread::sleep(Duration::from_millis(SAMPLER_SLICE_MS));
                }
            },
        ));
    }

    {
        let mut task = ControlTask::new(
            Arc::clone(&store),
            Arc::clone(&slot),
            Arc::clone(&pwm),
            Arc::clone(&status),
        );
        let time = Arc::clone(&time);
        let shutdown = Arc::clone(&shutdown);
        handles.push(task_pin::spawn_on_core(
            Core::App,
            pins::CONTROL_TASK_PRIORITY,
            8,
            "control\0",
            move || {
                while !shutdown.load(Ordering::Relaxed) {
                    task.tick(time.uptime_ms(), Duration::from_millis(SAMPLE_WAIT_MS));
                    std::thread::sleep(Duration::from_millis(CONTROL_SLICE_MS));
                }
                // Leave the fan off on the way out.
                let mut pwm = pwm.lock().unwrap_or_else(|e| e.into_inner());
                if let Err(e) = pwm.write(0) {
                    warn!("fan duty write failed: {e}");
                }
                hw_init::gpio_write(pins::STATUS_LED_GPIO, false);
            },
        ));
    }

    {
        let shutdown = Arc::clone(&shutdown);
        handles.push(task_pin::spawn_on_core(
            Core::Pro,
            pins::HEARTBEAT_TASK_PRIORITY,
            4,
            "heartbeat\0",
            move || heartbeat::run(shutdown),
        ));
    }

    TaskSet { shutdown, handles }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::config::ConfigUpdate;

    fn fixture() -> (
        Arc<ConfigStore>,
        Arc<SampleSlot<CombinedSample>>,
        Arc<Mutex<FanPwm>>,
        Arc<SharedStatus>,
    ) {
        let store = Arc::new(ConfigStore::new(Box::new(NullFile)));
        let slot = Arc::new(SampleSlot::new());
        let pwm = Arc::new(Mutex::new(FanPwm::new(0, 12_500, 8, false).unwrap()));
        let status = Arc::new(SharedStatus::new());
        (store, slot, pwm, status)
    }

    struct NullFile;
    impl crate::adapters::fs_store::SettingsFile for NullFile {
        fn read(&self) -> Result<String, crate::error::StorageError> {
            Err(crate::error::StorageError::OpenFailed("null".into()))
        }
        fn write(&mut self, _contents: &str) -> Result<(), crate::error::StorageError> {
            Ok(())
        }
        fn exists(&self) -> bool {
            false
        }
    }

    fn sample(system_c: f32, engine_c: f32, ts_ms: u32) -> CombinedSample {
        CombinedSample {
            system_c,
            engine_c,
            ts_ms,
        }
    }

    #[test]
    fn control_acts_only_on_its_interval() {
        let (store, slot, pwm, status) = fixture();
        let mut task = ControlTask::new(
            Arc::clone(&store),
            Arc::clone(&slot),
            Arc::clone(&pwm),
            Arc::clone(&status),
        );

        slot.publish(sample(40.0, 37.5, 1000));
        task.tick(1000, Duration::ZERO);
        assert_eq!(status.read().target_percent, 50);

        // Fresher, hotter sample arrives, but the interval (1000 ms)
        // has not elapsed: no new decision.
        slot.publish(sample(40.0, 50.0, 1500));
        task.tick(1500, Duration::ZERO);
        assert_eq!(status.read().target_percent, 50);

        task.tick(2000, Duration::ZERO);
        assert_eq!(status.read().target_percent, 100);
        assert_eq!(pwm.lock().unwrap().duty(), 255);
    }

    #[test]
    fn control_reuses_last_sample_when_slot_is_empty() {
        let (store, slot, pwm, status) = fixture();
        let mut task = ControlTask::new(
            Arc::clone(&store),
            Arc::clone(&slot),
            Arc::clone(&pwm),
            Arc::clone(&status),
        );

        slot.publish(sample(40.0, 37.5, 1000));
        task.tick(1000, Duration::ZERO);
        // Slot drained; a later tick still acts on the retained sample.
        task.tick(2000, Duration::ZERO);
        assert_eq!(status.read().target_percent, 50);
    }

    #[test]
    fn no_decision_before_the_first_sample() {
        let (store, slot, pwm, status) = fixture();
        let mut task = ControlTask::new(store, slot, Arc::clone(&pwm), Arc::clone(&status));
        task.tick(5000, Duration::ZERO);
        assert_eq!(status.read().target_percent, 0);
        assert_eq!(pwm.lock().unwrap().duty(), 0);
    }

    #[test]
    fn cutoff_latches_the_alarm_and_recovery_clears_it() {
        let (store, slot, pwm, status) = fixture();
        let mut task = ControlTask::new(
            Arc::clone(&store),
            Arc::clone(&slot),
            pwm,
            Arc::clone(&status),
        );

        slot.publish(sample(95.0, 40.0, 1000));
        task.tick(1000, Duration::ZERO);
        assert_eq!(status.read().target_percent, 0);
        assert!(store.snapshot().alarm_triggered);
        assert!(status.read().alarm_active);

        slot.publish(sample(60.0, 40.0, 2000));
        task.tick(2000, Duration::ZERO);
        assert!(!store.snapshot().alarm_triggered);
    }

    #[test]
    fn control_duty_tracks_resolution_change() {
        let (store, slot, pwm, status) = fixture();
        let mut task = ControlTask::new(
            Arc::clone(&store),
            Arc::clone(&slot),
            Arc::clone(&pwm),
            status,
        );

        slot.publish(sample(40.0, 50.0, 1000));
        task.tick(1000, Duration::ZERO);
        assert_eq!(pwm.lock().unwrap().duty(), 255);

        let update = ConfigUpdate {
            pwm_resolution_bits: Some(10),
            ..Default::default()
        };
        store.apply_update(&update, &pwm).unwrap();
        // Reconfiguration zeroed the duty; the next acted cycle
        // rewrites it at the new scale.
        assert_eq!(pwm.lock().unwrap().duty(), 0);
        task.tick(2000, Duration::ZERO);
        assert_eq!(pwm.lock().unwrap().duty(), 1023);
    }

    #[test]
    fn sampler_publishes_into_the_slot() {
        let (store, slot, _pwm, _status) = fixture();
        let _sim = crate::sensors::test_sim_lock();
        crate::sensors::thermistor::sim_set_adc_raw(2048);
        crate::sensors::engine_probe::sim_set_probe_connected(true);

        let mut task = SamplerTask::new(store, Arc::clone(&slot));
        task.tick(1000);
        let s = slot.try_take().unwrap();
        assert!((s.system_c - 25.0).abs() < 0.5);
        assert_eq!(s.ts_ms, 1000);
    }
}

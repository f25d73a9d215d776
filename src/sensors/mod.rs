//! Sensor hub — the sample producer.
//!
//! Both temperature paths are time-sliced inside one cooperative task:
//! each keeps its own "last ran at" timestamp and only advances when its
//! own interval has elapsed, so the slow one-wire settle never delays
//! the thermistor path. Whichever path has not completed its cycle
//! contributes its previous value to the combined sample.

pub mod engine_probe;
mod onewire;
pub mod thermistor;

use log::warn;

use crate::sample::CombinedSample;
use engine_probe::EngineProbe;
use thermistor::ThermistorSensor;

/// Serializes access to the process-global sim statics across every
/// test module that injects sensor values.
#[cfg(not(target_os = "espidf"))]
pub fn test_sim_lock() -> std::sync::MutexGuard<'static, ()> {
    static SIM_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    SIM_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SensorHub {
    thermistor: ThermistorSensor,
    probe: EngineProbe,
    last_thermistor_ms: u32,
    system_c: f32,
    engine_c: f32,
}

impl SensorHub {
    pub fn new() -> Self {
        Self {
            thermistor: ThermistorSensor::new(),
            probe: EngineProbe::new(),
            last_thermistor_ms: 0,
            system_c: 0.0,
            engine_c: 0.0,
        }
    }

    /// Advance both sampling paths and return the current combined
    /// sample. Called once per 10 ms task slice; most calls only check
    /// timestamps.
    pub fn poll(&mut self, now_ms: u32, sample_interval_ms: u32) -> CombinedSample {
        if now_ms.wrapping_sub(self.last_thermistor_ms) >= sample_interval_ms {
            self.last_thermistor_ms = now_ms;
            match self.thermistor.read() {
                Ok(r) => self.system_c = r.celsius,
                // Keep the previous reading; a transient ADC fault must
                // not masquerade as a temperature change.
                Err(e) => warn!("system sensor: {e}"),
            }
        }

        if let Some(result) = self.probe.poll(now_ms, sample_interval_ms) {
            match result {
                Ok(celsius) => self.engine_c = celsius,
                Err(e) => {
                    // Invalid reading propagates as NaN; the control
                    // task applies the fail-safe policy.
                    self.engine_c = f32::NAN;
                    warn!("engine probe: {e}");
                }
            }
        }

        CombinedSample {
            system_c: self.system_c,
            engine_c: self.engine_c,
            ts_ms: now_ms,
        }
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new()
    }
}

//! NTC thermistor system-temperature sensor (10 kOhm @ 25 C, B = 3950).
//!
//! Wired as the lower leg of a voltage divider under a fixed 10 kOhm
//! resistor, read via ADC1. Resistance is converted to temperature with
//! the Beta-parameter approximation
//! `1/T = 1/T0 + (1/Beta)·ln(R/R0)`. The downstream rotation thresholds
//! are tuned against exactly this linearisation, so the formula is not
//! to be swapped for a table or polynomial fit.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the oneshot ADC channel initialised by hw_init.
//! On host/test: reads from a static AtomicU16 for injection.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;
use crate::error::SensorError;
use crate::pins;

#[cfg(not(target_os = "espidf"))]
static SIM_ADC_RAW: AtomicU16 = AtomicU16::new(2048);
#[cfg(not(target_os = "espidf"))]
static SIM_ADC_FAIL: AtomicBool = AtomicBool::new(false);

/// Inject a raw ADC code for host-side tests and simulation.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_adc_raw(raw: u16) {
    SIM_ADC_RAW.store(raw, Ordering::Relaxed);
}

/// Simulate an ADC driver failure.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_adc_fail(fail: bool) {
    SIM_ADC_FAIL.store(fail, Ordering::Relaxed);
}

pub const V_REF: f32 = 3.30;
pub const ADC_MAX: f32 = 4095.0;
pub const R_FIXED: f32 = 10_000.0;
pub const NTC_BETA: f32 = 3950.0;
pub const NTC_R0: f32 = 10_000.0;
pub const NTC_T0_K: f32 = 298.15;

/// Divider denominator floor; keeps the resistance finite when the ADC
/// reads full scale.
const DENOM_EPS: f32 = 0.0001;

#[derive(Debug, Clone, Copy)]
pub struct ThermistorReading {
    pub raw: u16,
    pub celsius: f32,
}

pub struct ThermistorSensor {
    _adc_gpio: i32,
}

impl Default for ThermistorSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermistorSensor {
    pub fn new() -> Self {
        Self {
            _adc_gpio: pins::SYSTEM_TEMP_GPIO,
        }
    }

    pub fn read(&self) -> Result<ThermistorReading, SensorError> {
        let raw = self.read_adc().ok_or(SensorError::AdcReadFailed)?;
        Ok(ThermistorReading {
            raw,
            celsius: adc_to_celsius(raw),
        })
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> Option<u16> {
        hw_init::adc1_read(pins::SYSTEM_TEMP_ADC_CH)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> Option<u16> {
        if SIM_ADC_FAIL.load(Ordering::Relaxed) {
            None
        } else {
            Some(SIM_ADC_RAW.load(Ordering::Relaxed))
        }
    }
}

/// Raw ADC code → °C. Monotonically decreasing in `raw`: a hotter NTC
/// has less resistance and pulls the divider tap towards ground.
pub fn adc_to_celsius(raw: u16) -> f32 {
    let voltage = (f32::from(raw) * V_REF) / ADC_MAX;
    let denom = (V_REF - voltage).max(DENOM_EPS);
    let r_ntc = (voltage * R_FIXED) / denom;
    let inv_t = (1.0 / NTC_T0_K) + (1.0 / NTC_BETA) * (r_ntc / NTC_R0).ln();
    (1.0 / inv_t) - 273.15
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn adc_failure_surfaces_as_an_error() {
        let _sim = crate::sensors::test_sim_lock();
        sim_set_adc_fail(true);
        assert_eq!(
            ThermistorSensor::new().read().unwrap_err(),
            SensorError::AdcReadFailed
        );
        sim_set_adc_fail(false);
    }

    #[test]
    fn midpoint_divider_reads_25c() {
        // Equal divider legs: R_ntc == R_FIXED == R0, so T == T0.
        let c = adc_to_celsius(2048);
        assert!((c - 25.0).abs() < 0.5, "got {c}");
    }

    #[test]
    fn full_scale_is_guarded_and_finite() {
        let c = adc_to_celsius(4095);
        assert!(c.is_finite());
        // Clamped denominator → enormous resistance → very cold.
        assert!(c < -50.0);
    }

    #[test]
    fn zero_code_is_finite() {
        assert!(adc_to_celsius(0).is_finite());
    }

    #[test]
    fn hotter_means_lower_code() {
        // One quarter vs three quarters of full scale.
        assert!(adc_to_celsius(1024) > adc_to_celsius(3072));
    }
}

//! DS18B20 engine-temperature probe with the two-phase conversion
//! protocol.
//!
//! Phase 1 issues CONVERT T and records the request time; phase 2 reads
//! the scratchpad after [`CONVERSION_SETTLE_MS`] — a datasheet constant
//! for 12-bit conversions, independent of the sampling cadence. A
//! disconnected probe yields `Err(ProbeDisconnected)` and the
//! request/settle cycle restarts on the next cadence tick rather than
//! stalling.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: bit-banged one-wire transactions (see `onewire`).
//! On host/test: temperature and connection state injected via statics.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::error::SensorError;
#[cfg(target_os = "espidf")]
use crate::sensors::onewire;

/// 12-bit conversion time per the DS18B20 datasheet (max 750 ms).
pub const CONVERSION_SETTLE_MS: u32 = 750;

#[cfg(not(target_os = "espidf"))]
static SIM_MILLICELSIUS: AtomicI32 = AtomicI32::new(20_000);
#[cfg(not(target_os = "espidf"))]
static SIM_CONNECTED: AtomicBool = AtomicBool::new(true);

/// Inject the probe temperature for host-side tests and simulation.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_engine_temp(celsius: f32) {
    SIM_MILLICELSIUS.store((celsius * 1000.0) as i32, Ordering::Relaxed);
}

/// Simulate (dis)connecting the probe.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_probe_connected(connected: bool) {
    SIM_CONNECTED.store(connected, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the next cadence tick.
    Idle,
    /// CONVERT T issued; scratchpad read pending.
    Converting { since_ms: u32 },
}

pub struct EngineProbe {
    phase: Phase,
    last_request_ms: u32,
}

impl Default for EngineProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineProbe {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            last_request_ms: 0,
        }
    }

    /// Advance the request/settle state machine. Returns a completed
    /// reading when one is available, otherwise `None`. Never blocks —
    /// the settle time elapses across calls, not inside one.
    pub fn poll(&mut self, now_ms: u32, interval_ms: u32) -> Option<Result<f32, SensorError>> {
        match self.phase {
            Phase::Idle => {
                if now_ms.wrapping_sub(self.last_request_ms) >= interval_ms {
                    self.last_request_ms = now_ms;
                    match self.request_conversion() {
                        Ok(()) => {
                            self.phase = Phase::Converting { since_ms: now_ms };
                            None
                        }
                        // Disconnect during the request phase is a
                        // completed (failed) reading; the cycle retries
                        // on the next cadence tick.
                        Err(e) => Some(Err(e)),
                    }
                } else {
                    None
                }
            }
            Phase::Converting { since_ms } => {
                if now_ms.wrapping_sub(since_ms) >= CONVERSION_SETTLE_MS {
                    self.phase = Phase::Idle;
                    Some(self.read_scratchpad())
                } else {
                    None
                }
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn request_conversion(&mut self) -> Result<(), SensorError> {
        if !onewire::reset() {
            return Err(SensorError::ProbeDisconnected);
        }
        onewire::write_byte(0xCC); // SKIP ROM
        onewire::write_byte(0x44); // CONVERT T
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn read_scratchpad(&mut self) -> Result<f32, SensorError> {
        if !onewire::reset() {
            return Err(SensorError::ProbeDisconnected);
        }
        onewire::write_byte(0xCC); // SKIP ROM
        onewire::write_byte(0xBE); // READ SCRATCHPAD
        let mut scratch = [0u8; 9];
        for b in &mut scratch {
            *b = onewire::read_byte();
        }
        if crc8(&scratch[..8]) != scratch[8] {
            return Err(SensorError::ProbeCrcMismatch);
        }
        let raw = i16::from_le_bytes([scratch[0], scratch[1]]);
        Ok(f32::from(raw) / 16.0)
    }

    #[cfg(not(target_os = "espidf"))]
    fn request_conversion(&mut self) -> Result<(), SensorError> {
        if SIM_CONNECTED.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(SensorError::ProbeDisconnected)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_scratchpad(&mut self) -> Result<f32, SensorError> {
        if SIM_CONNECTED.load(Ordering::Relaxed) {
            Ok(SIM_MILLICELSIUS.load(Ordering::Relaxed) as f32 / 1000.0)
        } else {
            Err(SensorError::ProbeDisconnected)
        }
    }
}

/// Dallas/Maxim CRC8 (poly 0x31 reflected), covering scratchpad bytes
/// 0–7.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }
    crc
}

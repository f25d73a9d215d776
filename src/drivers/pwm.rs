//! Fan PWM actuator (LEDC).
//!
//! Owns one LEDC channel and its timer. Reconfiguration (channel,
//! frequency, resolution, polarity) tears the pair down and rebuilds
//! it; the programmed duty is lost in the process and the caller must
//! rewrite it. Polarity inversion lives here, not in the control logic.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: raw LEDC calls via hw_init.
//! On host/test: in-memory state; frequency requests run through the
//! same divider quantization the LEDC hardware applies.

use crate::drivers::hw_init;
use crate::error::ActuatorError;

/// LEDC source clock (APB).
const SRC_CLK_HZ: u64 = 80_000_000;

/// Divider limits: 18-bit value with 8 fractional bits, minimum 1.0.
const DIV_MIN: u64 = 1 << 8;
const DIV_MAX: u64 = (1 << 18) - 1;

/// Frequency the LEDC divider actually produces for a request, or an
/// error when no divider setting reaches it at this resolution.
pub fn quantize_frequency(requested_hz: u32, bits: u8) -> Result<u32, ActuatorError> {
    let unachievable = ActuatorError::FrequencyUnachievable { requested_hz };
    if requested_hz == 0 {
        return Err(unachievable);
    }
    let denom = u64::from(requested_hz) << bits;
    let div = ((SRC_CLK_HZ << 8) + denom / 2) / denom;
    if !(DIV_MIN..=DIV_MAX).contains(&div) {
        return Err(unachievable);
    }
    Ok(((SRC_CLK_HZ << 8) / (div << bits)) as u32)
}

pub struct FanPwm {
    channel: u32,
    freq_hz: u32,
    resolution_bits: u8,
    invert: bool,
    duty: u32,
}

impl FanPwm {
    pub fn new(channel: u32, freq_hz: u32, bits: u8, invert: bool) -> Result<Self, ActuatorError> {
        let mut pwm = Self {
            channel,
            freq_hz: 0,
            resolution_bits: bits,
            invert,
            duty: 0,
        };
        pwm.reconfigure(channel, freq_hz, bits, invert)?;
        Ok(pwm)
    }

    /// Rebuild the timer+channel pair. The duty register is reset to 0;
    /// the caller rewrites the current command afterwards.
    pub fn reconfigure(
        &mut self,
        channel: u32,
        freq_hz: u32,
        bits: u8,
        invert: bool,
    ) -> Result<(), ActuatorError> {
        let achieved = quantize_frequency(freq_hz, bits)?;
        hw_init::ledc_configure(channel, freq_hz, bits, invert)
            .map_err(|_| ActuatorError::PwmReconfigureFailed)?;
        self.channel = channel;
        self.freq_hz = achieved;
        self.resolution_bits = bits;
        self.invert = invert;
        self.duty = 0;
        Ok(())
    }

    /// Retarget the timer without touching channel/resolution/polarity.
    /// Returns the frequency the divider actually achieved.
    pub fn set_frequency(&mut self, hz: u32) -> Result<u32, ActuatorError> {
        let achieved = quantize_frequency(hz, self.resolution_bits)?;
        // Prefer the hardware's own answer when there is one; the host
        // backend reports 0 and the divider model stands in for it.
        let achieved = match hw_init::ledc_retune(self.channel, hz) {
            Ok(hw) if hw != 0 => hw,
            Ok(_) => achieved,
            Err(_) => {
                return Err(ActuatorError::FrequencyUnachievable { requested_hz: hz });
            }
        };
        self.freq_hz = achieved;
        Ok(achieved)
    }

    /// Program a raw duty, clamped to the resolution's full scale.
    pub fn write(&mut self, duty: u32) -> Result<(), ActuatorError> {
        let duty = duty.min(self.max_duty());
        hw_init::ledc_set(self.channel, duty).map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.duty = duty;
        Ok(())
    }

    pub fn max_duty(&self) -> u32 {
        (1u32 << self.resolution_bits) - 1
    }

    pub fn duty(&self) -> u32 {
        self.duty
    }

    pub fn frequency_hz(&self) -> u32 {
        self.freq_hz
    }

    pub fn resolution_bits(&self) -> u8 {
        self.resolution_bits
    }

    pub fn inverted(&self) -> bool {
        self.invert
    }
}

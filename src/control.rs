//! Fan control decision logic.
//!
//! Evaluated fresh every control cycle — no persistent state machine
//! object beyond the configuration snapshot and the previous command.
//! Branch priority:
//!
//! 1. Safety cutoff: system temperature above `system_temp_alert`
//!    forces 0% regardless of mode.
//! 2. Auto: linear ramp of the engine temperature between the rotation
//!    thresholds.
//! 3. Manual: the override level, or 0% when the override is off.
//!
//! Rounding policy is round-half-away-from-zero (`f32::round`) for both
//! percent and duty; midpoint duties round up (0.5·255 → 128).

use crate::config::{FanConfig, FanMode};
use crate::sample::CombinedSample;

/// Fail-safe speed commanded in auto mode while the engine reading is
/// invalid: enough airflow to keep a hot engine safe without trusting a
/// ramp that has no input. See the error-handling design notes.
pub const INVALID_READING_FAILSAFE_PERCENT: u8 = 30;

/// One control-cycle output: the percentage and its duty expression at
/// the configured resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanCommand {
    pub percent: u8,
    pub duty: u32,
}

impl FanCommand {
    pub const OFF: Self = Self {
        percent: 0,
        duty: 0,
    };

    fn from_percent(percent: u8, max_duty: u32) -> Self {
        Self {
            percent,
            duty: (f32::from(percent) / 100.0 * max_duty as f32).round() as u32,
        }
    }
}

/// Evaluate one control cycle against a configuration snapshot.
pub fn evaluate(cfg: &FanConfig, sample: &CombinedSample) -> FanCommand {
    let max_duty = cfg.max_duty();

    // Safety cutoff wins over everything, including manual override.
    if sample.system_c > cfg.system_temp_alert as f32 {
        return FanCommand::OFF;
    }

    match cfg.fan_mode {
        FanMode::Auto => {
            if !sample.engine_valid() {
                return FanCommand::from_percent(INVALID_READING_FAILSAFE_PERCENT, max_duty);
            }
            // validate() guarantees min < max; the subtraction cannot
            // be zero here.
            let span = (cfg.max_rotation_temp - cfg.min_rotation_temp) as f32;
            let ratio = ((sample.engine_c - cfg.min_rotation_temp as f32) / span).clamp(0.0, 1.0);
            FanCommand {
                percent: (ratio * 100.0).round() as u8,
                duty: (ratio * max_duty as f32).round() as u32,
            }
        }
        FanMode::Manual => {
            if cfg.manual_on {
                FanCommand::from_percent(cfg.manual_percent, max_duty)
            } else {
                FanCommand::OFF
            }
        }
    }
}

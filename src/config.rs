//! Fan controller configuration.
//!
//! `FanConfig` is the one logically-shared mutable object in the system:
//! the network layer and serial console write it, the control task reads
//! it every cycle (and latches the alarm flag back into it). All access
//! goes through [`ConfigStore`](crate::store::ConfigStore) — nothing
//! outside that module holds a long-lived reference.
//!
//! Updates arrive as a field-keyed [`ConfigUpdate`] (absent fields keep
//! their current value, matching the original settings-document
//! semantics) and are validated before they replace anything.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fan control mode. Changing it takes effect on the next control
/// cycle; there are no transition side effects beyond re-evaluating the
/// branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FanMode {
    #[default]
    Auto,
    Manual,
}

impl FanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }
}

/// Authoritative controller configuration.
///
/// Deserialization defaults missing fields, so a settings document
/// written by an older firmware still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    // --- General ---
    pub hostname: String,

    // --- Temperature thresholds (°C) ---
    /// Engine temperature at which the auto ramp starts rotating.
    pub min_rotation_temp: i32,
    /// Engine temperature at which the auto ramp reaches 100%.
    pub max_rotation_temp: i32,
    /// System temperature above which the safety cutoff forces 0 duty.
    pub system_temp_alert: i32,

    // --- Sampling cadence ---
    /// Thermistor read interval (milliseconds).
    pub temp_sample_interval_ms: u32,

    // --- PWM ---
    pub pwm_freq_hz: u32,
    pub pwm_channel: u8,
    /// Bounds the valid duty range to `[0, 2^bits − 1]`.
    pub pwm_resolution_bits: u8,
    pub invert_pwm: bool,

    // --- Control ---
    /// Control decision interval (milliseconds).
    pub fan_control_interval: u32,
    pub fan_mode: FanMode,
    pub manual_on: bool,
    /// Manual override level, 0–100.
    pub manual_percent: u8,

    // --- Alarm ---
    /// Snooze window length (ms); 0 disables snoozing.
    pub deactivate_alarm_time_ms: u32,
    /// Latched by the control task while the safety cutoff is engaged.
    pub alarm_triggered: bool,
    /// Uptime (ms) of the most recent snooze request.
    pub reactivate_alarm_counter: u32,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            hostname: "enginefan".into(),

            min_rotation_temp: 25,
            max_rotation_temp: 50,
            system_temp_alert: 90,

            temp_sample_interval_ms: 1000,

            pwm_freq_hz: 12_500,
            pwm_channel: 0,
            pwm_resolution_bits: 8,
            invert_pwm: false,

            fan_control_interval: 1000,
            fan_mode: FanMode::Auto,
            manual_on: false,
            manual_percent: 0,

            deactivate_alarm_time_ms: 0,
            alarm_triggered: false,
            reactivate_alarm_counter: 0,
        }
    }
}

impl FanConfig {
    /// Maximum duty value at the configured resolution.
    pub fn max_duty(&self) -> u32 {
        (1u32 << self.pwm_resolution_bits) - 1
    }

    /// Range-check every field. Called on every apply and on load, so a
    /// corrupt or hand-edited settings document can never reach the
    /// control task.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_rotation_temp >= self.max_rotation_temp {
            return Err(ConfigError::DegenerateThresholds);
        }
        if !(-40..=150).contains(&self.min_rotation_temp) {
            return Err(ConfigError::ValidationFailed(
                "min_rotation_temp must be -40–150 °C",
            ));
        }
        if !(-40..=150).contains(&self.max_rotation_temp) {
            return Err(ConfigError::ValidationFailed(
                "max_rotation_temp must be -40–150 °C",
            ));
        }
        if !(0..=150).contains(&self.system_temp_alert) {
            return Err(ConfigError::ValidationFailed(
                "system_temp_alert must be 0–150 °C",
            ));
        }
        if !(10..=60_000).contains(&self.temp_sample_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "temp_sample_interval_ms must be 10–60000",
            ));
        }
        if !(1..=1_000_000).contains(&self.pwm_freq_hz) {
            return Err(ConfigError::ValidationFailed(
                "pwm_freq_hz must be 1–1000000",
            ));
        }
        if self.pwm_channel > 7 {
            return Err(ConfigError::ValidationFailed("pwm_channel must be 0–7"));
        }
        if !(1..=14).contains(&self.pwm_resolution_bits) {
            return Err(ConfigError::ValidationFailed(
                "pwm_resolution_bits must be 1–14",
            ));
        }
        if !(20..=60_000).contains(&self.fan_control_interval) {
            return Err(ConfigError::ValidationFailed(
                "fan_control_interval must be 20–60000",
            ));
        }
        if self.manual_percent > 100 {
            return Err(ConfigError::ValidationFailed(
                "manual_percent must be 0–100",
            ));
        }
        Ok(())
    }

    /// Merge a field-keyed update into a copy of `self` and validate the
    /// result. `manual_percent` is clamped rather than rejected (the
    /// original firmware constrained it at every entry point); every
    /// other out-of-range field rejects the whole update, retaining the
    /// prior configuration.
    pub fn with_update(&self, update: &ConfigUpdate) -> Result<Self, ConfigError> {
        let mut next = self.clone();

        if let Some(ref v) = update.hostname {
            next.hostname = v.clone();
        }
        if let Some(v) = update.min_rotation_temp {
            next.min_rotation_temp = v;
        }
        if let Some(v) = update.max_rotation_temp {
            next.max_rotation_temp = v;
        }
        if let Some(v) = update.system_temp_alert {
            next.system_temp_alert = v;
        }
        if let Some(v) = update.temp_sample_interval_ms {
            next.temp_sample_interval_ms = v;
        }
        if let Some(v) = update.pwm_freq_hz {
            next.pwm_freq_hz = v;
        }
        if let Some(v) = update.pwm_channel {
            next.pwm_channel = v;
        }
        if let Some(v) = update.pwm_resolution_bits {
            next.pwm_resolution_bits = v;
        }
        if let Some(v) = update.invert_pwm {
            next.invert_pwm = v;
        }
        if let Some(v) = update.fan_control_interval {
            next.fan_control_interval = v;
        }
        if let Some(v) = update.fan_mode {
            next.fan_mode = v;
        }
        if let Some(v) = update.manual_on {
            next.manual_on = v;
        }
        if let Some(v) = update.manual_percent {
            next.manual_percent = v.min(100);
        }
        if let Some(v) = update.deactivate_alarm_time_ms {
            next.deactivate_alarm_time_ms = v;
        }

        next.validate()?;
        Ok(next)
    }
}

/// Field-keyed partial update, as posted by the network layer or built
/// by the serial console. Absent fields keep their current value.
///
/// The alarm latch and snooze timestamp are deliberately not settable
/// here — they are observed state owned by the control task and the
/// snooze operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub hostname: Option<String>,
    pub min_rotation_temp: Option<i32>,
    pub max_rotation_temp: Option<i32>,
    pub system_temp_alert: Option<i32>,
    pub temp_sample_interval_ms: Option<u32>,
    pub pwm_freq_hz: Option<u32>,
    pub pwm_channel: Option<u8>,
    pub pwm_resolution_bits: Option<u8>,
    pub invert_pwm: Option<bool>,
    pub fan_control_interval: Option<u32>,
    pub fan_mode: Option<FanMode>,
    pub manual_on: Option<bool>,
    pub manual_percent: Option<u8>,
    pub deactivate_alarm_time_ms: Option<u32>,
}

impl ConfigUpdate {
    /// Parse an update from a JSON document (the HTTP body format).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = FanConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.min_rotation_temp < c.max_rotation_temp);
        assert!(c.system_temp_alert > c.max_rotation_temp);
        assert_eq!(c.max_duty(), 255);
    }

    #[test]
    fn serde_roundtrip() {
        let c = FanConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: FanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn fan_mode_serializes_uppercase() {
        let json = serde_json::to_string(&FanMode::Auto).unwrap();
        assert_eq!(json, "\"AUTO\"");
        let m: FanMode = serde_json::from_str("\"MANUAL\"").unwrap();
        assert_eq!(m, FanMode::Manual);
    }

    #[test]
    fn update_merges_only_present_fields() {
        let base = FanConfig::default();
        let update = ConfigUpdate {
            manual_percent: Some(40),
            fan_mode: Some(FanMode::Manual),
            ..Default::default()
        };
        let next = base.with_update(&update).unwrap();
        assert_eq!(next.manual_percent, 40);
        assert_eq!(next.fan_mode, FanMode::Manual);
        // Untouched fields retained.
        assert_eq!(next.min_rotation_temp, base.min_rotation_temp);
        assert_eq!(next.pwm_freq_hz, base.pwm_freq_hz);
    }

    #[test]
    fn manual_percent_is_clamped_not_rejected() {
        let base = FanConfig::default();
        let update = ConfigUpdate {
            manual_percent: Some(250),
            ..Default::default()
        };
        let next = base.with_update(&update).unwrap();
        assert_eq!(next.manual_percent, 100);
    }

    #[test]
    fn degenerate_thresholds_rejected_at_apply_time() {
        let base = FanConfig::default();
        let update = ConfigUpdate {
            min_rotation_temp: Some(50),
            max_rotation_temp: Some(50),
            ..Default::default()
        };
        assert_eq!(
            base.with_update(&update),
            Err(ConfigError::DegenerateThresholds)
        );
    }

    #[test]
    fn out_of_range_resolution_rejected() {
        let base = FanConfig::default();
        let update = ConfigUpdate {
            pwm_resolution_bits: Some(20),
            ..Default::default()
        };
        assert!(matches!(
            base.with_update(&update),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn full_serialized_config_applies_as_update() {
        // apply(serialize(config)) == config — field for field.
        let cfg = FanConfig {
            min_rotation_temp: 30,
            max_rotation_temp: 70,
            fan_mode: FanMode::Manual,
            manual_on: true,
            manual_percent: 66,
            pwm_resolution_bits: 10,
            ..Default::default()
        };

        let json = serde_json::to_string(&cfg).unwrap();
        let update = ConfigUpdate::from_json(&json).unwrap();
        let rebuilt = FanConfig::default().with_update(&update).unwrap();
        // Alarm observation fields are not carried by updates; they keep
        // their defaults, which equal cfg's defaults here.
        assert_eq!(rebuilt, cfg);
    }

    #[test]
    fn unknown_mode_string_fails_parse() {
        assert!(ConfigUpdate::from_json("{\"fan_mode\":\"TURBO\"}").is_err());
    }
}

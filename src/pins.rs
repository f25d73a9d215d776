//! GPIO pin map for the EngineFan controller board (ESP32-S3).
//!
//! Single source of truth — drivers take these constants, never raw
//! numbers.

/// NTC thermistor divider tap (system temperature), ADC1 input.
pub const SYSTEM_TEMP_GPIO: i32 = 6;

/// ADC1 channel for [`SYSTEM_TEMP_GPIO`] (GPIO6 = ADC1_CH5 on the S3).
pub const SYSTEM_TEMP_ADC_CH: u32 = 5;

/// DS18B20 one-wire data line (engine temperature probe).
pub const ENGINE_PROBE_GPIO: i32 = 7;

/// Fan PWM output (LEDC).
pub const FAN_PWM_GPIO: i32 = 8;

/// Heartbeat / status LED.
pub const STATUS_LED_GPIO: i32 = 35;

// FreeRTOS task priorities (0 = idle). The control loop outranks the
// sampler so a slow sensor read never delays a safety decision.
pub const SAMPLER_TASK_PRIORITY: u8 = 5;
pub const CONTROL_TASK_PRIORITY: u8 = 6;
pub const HEARTBEAT_TASK_PRIORITY: u8 = 1;

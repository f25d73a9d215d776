//! Live status snapshot.
//!
//! The control task publishes here after every acted cycle; the console
//! (and any future network layer) reads it without touching the control
//! path. Serializes to the `/api/sensors` JSON shape.

use std::sync::Mutex;

use serde::Serialize;

use crate::config::FanMode;

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct StatusSnapshot {
    /// System (board) temperature, °C.
    pub system_c: f32,
    /// Engine probe temperature, °C. NaN while the reading is invalid.
    pub engine_c: f32,
    /// Sample timestamp, ms since boot.
    pub ts_ms: u32,
    pub fan_mode: FanMode,
    /// Last commanded fan level.
    pub target_percent: u8,
    /// Last commanded duty at the configured resolution.
    pub target_duty: u32,
    pub alarm_active: bool,
}

/// Mutex-guarded snapshot cell, shared between tasks.
#[derive(Default)]
pub struct SharedStatus {
    cell: Mutex<StatusSnapshot>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    pub fn read(&self) -> StatusSnapshot {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }
}

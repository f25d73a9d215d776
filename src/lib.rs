//! EngineFan firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module, so the sensor →
//! slot → control → actuator pipeline runs unmodified under host tests.

#![deny(unused_must_use)]

pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod sample;
pub mod status;
pub mod store;
pub mod tasks;

pub mod pins;

// Hardware-facing modules; the actual register access is cfg-guarded
// inside, with in-memory backends for the host.
pub mod adapters;
pub mod drivers;
pub mod sensors;

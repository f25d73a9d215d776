//! Shared configuration store.
//!
//! One mutex-guarded [`FanConfig`] plus its settings document. All
//! readers take a [`snapshot`](ConfigStore::snapshot) (copy-out) and all
//! writers go through the apply cycle, so no caller ever holds the lock
//! across hardware or filesystem work it does not own.
//!
//! ## Apply cycle
//!
//! merge update → validate → reconfigure PWM if its parameters changed
//! → rewrite the manual duty → commit → persist. In manual mode the
//! duty is rewritten at apply time, not on the next control cycle — an
//! operator turning the override knob must not wait out the control
//! interval. A rejected update or failed reconfiguration retains the
//! prior configuration; a failed persist keeps the new configuration in
//! RAM and logs — the controller keeps running from memory.
//!
//! ## Persistence
//!
//! The document is only written when its serialized form differs from
//! the last write, so repeated applies of identical settings do not
//! wear the flash. The configuration and the settings file sit behind
//! separate locks: flash I/O happens under the file lock only, so the
//! control task's snapshot never stalls behind a write in flight.

use std::sync::{Mutex, MutexGuard};

use log::{info, warn};

use crate::adapters::fs_store::SettingsFile;
use crate::config::{ConfigUpdate, FanConfig, FanMode};
use crate::drivers::pwm::FanPwm;
use crate::error::{Error, Result, StorageError};

/// Outcome of the boot-time settings load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Document read and validated.
    LoadedOk,
    /// No document existed; defaults written.
    DefaultsCreated,
    /// Document exists but could not be opened; running on defaults
    /// without touching it.
    OpenFailed,
    /// Document was unreadable or invalid; defaults recreated over it.
    ParseErrorDefaultsRecreated,
}

struct PersistState {
    /// Serialized form of the last successful write, for the diff-aware
    /// save.
    last_saved: Option<String>,
    file: Box<dyn SettingsFile>,
}

pub struct ConfigStore {
    cfg: Mutex<FanConfig>,
    persist: Mutex<PersistState>,
}

impl ConfigStore {
    pub fn new(file: Box<dyn SettingsFile>) -> Self {
        Self {
            cfg: Mutex::new(FanConfig::default()),
            persist: Mutex::new(PersistState {
                last_saved: None,
                file,
            }),
        }
    }

    fn cfg_lock(&self) -> MutexGuard<'_, FanConfig> {
        self.cfg.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist_state(&self) -> MutexGuard<'_, PersistState> {
        self.persist.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the settings document, falling back to (and recreating)
    /// defaults when it is missing or damaged.
    pub fn load(&self) -> LoadStatus {
        let mut ps = self.persist_state();

        if !ps.file.exists() {
            info!("settings: no document, creating defaults");
            if let Err(e) = write_doc(&mut ps, &FanConfig::default()) {
                warn!("settings: writing defaults failed: {e}");
            }
            return LoadStatus::DefaultsCreated;
        }

        let doc = match ps.file.read() {
            Ok(doc) => doc,
            Err(e) => {
                warn!("settings: {e}; running on defaults");
                return LoadStatus::OpenFailed;
            }
        };

        match serde_json::from_str::<FanConfig>(&doc) {
            Ok(cfg) if cfg.validate().is_ok() => {
                info!("settings: loaded \"{}\"", cfg.hostname);
                ps.last_saved = Some(doc);
                drop(ps);
                *self.cfg_lock() = cfg;
                LoadStatus::LoadedOk
            }
            Ok(_) | Err(_) => {
                warn!("settings: document invalid, recreating defaults");
                ps.last_saved = None;
                if let Err(e) = write_doc(&mut ps, &FanConfig::default()) {
                    warn!("settings: rewriting defaults failed: {e}");
                }
                drop(ps);
                *self.cfg_lock() = FanConfig::default();
                LoadStatus::ParseErrorDefaultsRecreated
            }
        }
    }

    /// Copy-out of the current configuration.
    pub fn snapshot(&self) -> FanConfig {
        self.cfg_lock().clone()
    }

    /// Run the apply cycle for a field-keyed update. Returns the
    /// committed configuration.
    pub fn apply_update(&self, update: &ConfigUpdate, pwm: &Mutex<FanPwm>) -> Result<FanConfig> {
        let committed = {
            let mut cfg = self.cfg_lock();
            let mut candidate = cfg.with_update(update).map_err(Error::Config)?;

            let pwm_changed = candidate.pwm_freq_hz != cfg.pwm_freq_hz
                || candidate.pwm_channel != cfg.pwm_channel
                || candidate.pwm_resolution_bits != cfg.pwm_resolution_bits
                || candidate.invert_pwm != cfg.invert_pwm;

            if pwm_changed || candidate.fan_mode == FanMode::Manual {
                let mut pwm = pwm.lock().unwrap_or_else(|e| e.into_inner());
                if pwm_changed {
                    pwm.reconfigure(
                        u32::from(candidate.pwm_channel),
                        candidate.pwm_freq_hz,
                        candidate.pwm_resolution_bits,
                        candidate.invert_pwm,
                    )
                    .map_err(Error::Actuator)?;
                    // The timer quantizes; persist what the hardware
                    // runs at.
                    candidate.pwm_freq_hz = pwm.frequency_hz();
                }

                // Manual mode acts at apply time, whether or not the
                // PWM parameters changed — the operator's override must
                // not sit behind the control interval. Auto duty is
                // rewritten by the next control cycle.
                if candidate.fan_mode == FanMode::Manual {
                    let duty = if candidate.manual_on {
                        (f32::from(candidate.manual_percent) / 100.0
                            * candidate.max_duty() as f32)
                            .round() as u32
                    } else {
                        0
                    };
                    pwm.write(duty).map_err(Error::Actuator)?;
                }
            }

            *cfg = candidate.clone();
            candidate
        };

        if let Err(e) = self.persist_current() {
            warn!("settings: persist after apply failed: {e}");
        }
        Ok(committed)
    }

    /// Retarget the PWM frequency and persist the value the divider
    /// actually achieved.
    pub fn set_frequency(&self, hz: u32, pwm: &Mutex<FanPwm>) -> Result<u32> {
        let achieved = {
            let mut cfg = self.cfg_lock();
            let achieved = pwm
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .set_frequency(hz)
                .map_err(Error::Actuator)?;
            cfg.pwm_freq_hz = achieved;
            achieved
        };
        if let Err(e) = self.persist_current() {
            warn!("settings: persist after retune failed: {e}");
        }
        Ok(achieved)
    }

    /// Factory reset: defaults in RAM, on flash, and on the actuator.
    pub fn reset_defaults(&self, pwm: &Mutex<FanPwm>) -> Result<FanConfig> {
        let defaults = FanConfig::default();
        {
            let mut cfg = self.cfg_lock();
            let mut pwm = pwm.lock().unwrap_or_else(|e| e.into_inner());
            pwm.reconfigure(
                u32::from(defaults.pwm_channel),
                defaults.pwm_freq_hz,
                defaults.pwm_resolution_bits,
                defaults.invert_pwm,
            )
            .map_err(Error::Actuator)?;
            *cfg = defaults.clone();
        }
        if let Err(e) = self.persist_current() {
            warn!("settings: persist after reset failed: {e}");
        }
        Ok(defaults)
    }

    /// Force a save now, surfacing the error (console `save` command).
    pub fn persist(&self) -> core::result::Result<(), StorageError> {
        self.persist_current()
    }

    // --- Alarm bookkeeping -------------------------------------------

    /// Latch or clear the alarm flag from the control task. Returns
    /// `true` when the flag actually changed.
    pub fn latch_alarm(&self, triggered: bool) -> bool {
        {
            let mut cfg = self.cfg_lock();
            if cfg.alarm_triggered == triggered {
                return false;
            }
            cfg.alarm_triggered = triggered;
        }
        if let Err(e) = self.persist_current() {
            warn!("settings: persist after alarm latch failed: {e}");
        }
        true
    }

    /// Start the snooze window at `now_ms`.
    pub fn snooze_alarm(&self, now_ms: u32) {
        self.cfg_lock().reactivate_alarm_counter = now_ms;
        if let Err(e) = self.persist_current() {
            warn!("settings: persist after snooze failed: {e}");
        }
    }

    /// Whether the alarm should be signalled at `now_ms`: latched and
    /// outside the snooze window.
    pub fn alarm_active(&self, now_ms: u32) -> bool {
        let cfg = self.cfg_lock();
        if !cfg.alarm_triggered {
            return false;
        }
        let snoozed = cfg.deactivate_alarm_time_ms > 0
            && now_ms.wrapping_sub(cfg.reactivate_alarm_counter) < cfg.deactivate_alarm_time_ms;
        !snoozed
    }

    /// Diff-aware save of whatever configuration is current when the
    /// file lock is acquired. The configuration lock is taken only for
    /// the copy-out, never across the write, so the control task's
    /// snapshot never waits on flash I/O.
    fn persist_current(&self) -> core::result::Result<(), StorageError> {
        let mut ps = self.persist_state();
        let cfg = self.cfg_lock().clone();
        write_doc(&mut ps, &cfg)
    }
}

fn write_doc(
    ps: &mut PersistState,
    cfg: &FanConfig,
) -> core::result::Result<(), StorageError> {
    let doc = serde_json::to_string_pretty(cfg)
        .map_err(|e| StorageError::ParseError(e.to_string()))?;
    if ps.last_saved.as_deref() == Some(doc.as_str()) {
        return Ok(());
    }
    ps.file.write(&doc)?;
    ps.last_saved = Some(doc);
    Ok(())
}

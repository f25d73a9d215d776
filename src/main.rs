//! EngineFan Firmware — Main Entry Point
//!
//! Wiring only: mount storage, load settings, build the shared objects,
//! spawn the sampler/control/heartbeat tasks, then serve the serial
//! console from the main task.
//!
//! ```text
//!  sampler (core 0)          control (core 1)
//!  ┌─────────────┐  slot  ┌──────────────────┐
//!  │ thermistor  │ ─────▶ │ safety / auto /  │ ──▶ fan PWM
//!  │ + DS18B20   │  (1)   │ manual decision  │ ──▶ status cell
//!  └─────────────┘        └──────────────────┘
//!         ▲ snapshot               ▲ snapshot
//!         └──────── ConfigStore ───┴──── console (main task)
//! ```
#![deny(unused_must_use)]

use std::io::BufRead;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{info, warn};

use enginefan::adapters::fs_store::{FsSettingsFile, SETTINGS_PATH};
use enginefan::adapters::time::Esp32TimeAdapter;
use enginefan::console::Console;
use enginefan::drivers::{hw_init, pwm::FanPwm};
use enginefan::error::Error;
use enginefan::sample::SampleSlot;
use enginefan::status::SharedStatus;
use enginefan::store::ConfigStore;
use enginefan::tasks;

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!(
        "EngineFan v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt; the
        // watchdog resets us after its timeout.
        log::error!("HAL init failed: {e} — halting");
        #[allow(clippy::empty_loop)]
        loop {}
    }

    if let Err(e) = mount_storage() {
        warn!("storage mount failed ({e}); settings will not persist");
    }

    // Settings document → authoritative configuration.
    let store = Arc::new(ConfigStore::new(Box::new(FsSettingsFile::new(
        SETTINGS_PATH,
    ))));
    let load_status = store.load();
    info!("settings: {load_status:?}");
    let cfg = store.snapshot();

    // Actuator at the persisted parameters, fan off until the first
    // control decision.
    let pwm = FanPwm::new(
        u32::from(cfg.pwm_channel),
        cfg.pwm_freq_hz,
        cfg.pwm_resolution_bits,
        cfg.invert_pwm,
    )
    .map_err(Error::Actuator)?;
    let pwm = Arc::new(Mutex::new(pwm));

    let slot = Arc::new(SampleSlot::new());
    let status = Arc::new(SharedStatus::new());
    let time = Arc::new(Esp32TimeAdapter::new());

    let _tasks = tasks::spawn_tasks(
        Arc::clone(&store),
        slot,
        Arc::clone(&pwm),
        Arc::clone(&status),
        Arc::clone(&time),
    );

    info!("system ready; console on UART0 (type 'help')");

    // Console loop owns the main task.
    let console = Console::new(store, pwm, status, time);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("console read failed: {e}");
                std::thread::sleep(std::time::Duration::from_millis(250));
                continue;
            }
        };
        let reply = console.handle_line(&line);
        if !reply.is_empty() {
            println!("{reply}");
        }
    }
    Ok(())
}

/// Mount the SPIFFS data partition at `/spiffs`.
#[cfg(target_os = "espidf")]
fn mount_storage() -> Result<(), Error> {
    use esp_idf_svc::sys::{esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register, ESP_OK};

    let base_path = c"/spiffs";
    let conf = esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
        ..Default::default()
    };
    // SAFETY: called once from main before any filesystem access; the
    // conf struct and path literal outlive the call.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK {
        return Err(Error::Init("SPIFFS mount failed"));
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn mount_storage() -> Result<(), Error> {
    Ok(())
}

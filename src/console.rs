//! Serial console command processor.
//!
//! Line in, reply out — no I/O here. `main()` feeds it from the UART;
//! tests feed it strings. It operates on the shared store, actuator and
//! status exactly like the network layer would, so every command path
//! exercises the same apply cycle.

use std::sync::{Arc, Mutex};

use crate::adapters::time::Esp32TimeAdapter;
use crate::config::{ConfigUpdate, FanMode};
use crate::drivers::pwm::FanPwm;
use crate::status::SharedStatus;
use crate::store::ConfigStore;

/// Fields accepted by `set`. `ConfigUpdate` ignores unknown JSON keys
/// (whole-document applies carry extra fields), so the console checks
/// names itself to catch typos.
const SETTABLE_FIELDS: &[&str] = &[
    "hostname",
    "min_rotation_temp",
    "max_rotation_temp",
    "system_temp_alert",
    "temp_sample_interval_ms",
    "pwm_freq_hz",
    "pwm_channel",
    "pwm_resolution_bits",
    "invert_pwm",
    "fan_control_interval",
    "fan_mode",
    "manual_on",
    "manual_percent",
    "deactivate_alarm_time_ms",
];

const HELP: &str = "\
commands:
  help                    this list
  status                  live readings and fan command (JSON)
  get                     current configuration (JSON)
  set <field> <value>     apply one configuration field
  fan_mode <AUTO|MANUAL>  switch control mode
  set_pwm <0-100>         manual override level (switches to MANUAL)
  set_pwm_freq <hz>       retarget the PWM timer
  snooze                  silence the alarm for the configured window
  uptime                  time since boot
  save                    force-write the settings document
  defaults                factory reset";

pub struct Console {
    store: Arc<ConfigStore>,
    pwm: Arc<Mutex<FanPwm>>,
    status: Arc<SharedStatus>,
    time: Arc<Esp32TimeAdapter>,
}

impl Console {
    pub fn new(
        store: Arc<ConfigStore>,
        pwm: Arc<Mutex<FanPwm>>,
        status: Arc<SharedStatus>,
        time: Arc<Esp32TimeAdapter>,
    ) -> Self {
        Self {
            store,
            pwm,
            status,
            time,
        }
    }

    /// Process one input line and produce the reply text.
    pub fn handle_line(&self, line: &str) -> String {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return String::new();
        };
        let args: Vec<&str> = parts.collect();

        match cmd {
            "help" => HELP.to_string(),
            "status" => match serde_json::to_string_pretty(&self.status.read()) {
                Ok(json) => json,
                Err(e) => format!("error: {e}"),
            },
            "get" => match serde_json::to_string_pretty(&self.store.snapshot()) {
                Ok(json) => json,
                Err(e) => format!("error: {e}"),
            },
            "set" => self.cmd_set(&args),
            "fan_mode" => self.cmd_fan_mode(&args),
            "set_pwm" => self.cmd_set_pwm(&args),
            "set_pwm_freq" => self.cmd_set_pwm_freq(&args),
            "snooze" => {
                self.store.snooze_alarm(self.time.uptime_ms());
                "alarm snoozed".to_string()
            }
            "uptime" => format_uptime(self.time.uptime_secs()),
            "save" => match self.store.persist() {
                Ok(()) => "saved".to_string(),
                Err(e) => format!("error: {e}"),
            },
            "defaults" => match self.store.reset_defaults(&self.pwm) {
                Ok(_) => "defaults restored".to_string(),
                Err(e) => format!("error: {e}"),
            },
            other => format!("unknown command '{other}' (try 'help')"),
        }
    }

    fn cmd_set(&self, args: &[&str]) -> String {
        let [field, value] = args else {
            return "usage: set <field> <value>".to_string();
        };
        if !SETTABLE_FIELDS.contains(field) {
            return format!("unknown field '{field}'");
        }

        // Accept bare strings where the value is not valid JSON
        // (hostname, unquoted mode names).
        let value_json: serde_json::Value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String((*value).to_string()));
        let doc = serde_json::json!({ *field: value_json });

        let update: ConfigUpdate = match serde_json::from_value(doc) {
            Ok(u) => u,
            Err(e) => return format!("error: {e}"),
        };
        match self.store.apply_update(&update, &self.pwm) {
            Ok(cfg) => match serde_json::to_value(&cfg) {
                Ok(serde_json::Value::Object(map)) => match map.get(*field) {
                    Some(v) => format!("{field} = {v}"),
                    None => "ok".to_string(),
                },
                _ => "ok".to_string(),
            },
            Err(e) => format!("error: {e}"),
        }
    }

    fn cmd_fan_mode(&self, args: &[&str]) -> String {
        let mode = match args {
            ["AUTO"] => FanMode::Auto,
            ["MANUAL"] => FanMode::Manual,
            _ => return "usage: fan_mode <AUTO|MANUAL>".to_string(),
        };
        let update = ConfigUpdate {
            fan_mode: Some(mode),
            ..Default::default()
        };
        match self.store.apply_update(&update, &self.pwm) {
            Ok(cfg) => format!("fan_mode = {}", cfg.fan_mode.as_str()),
            Err(e) => format!("error: {e}"),
        }
    }

    fn cmd_set_pwm(&self, args: &[&str]) -> String {
        let percent: u8 = match args {
            [v] => match v.parse() {
                Ok(p) => p,
                Err(_) => return "usage: set_pwm <0-100>".to_string(),
            },
            _ => return "usage: set_pwm <0-100>".to_string(),
        };
        // The override implies manual mode, like the original firmware's
        // slider did.
        let update = ConfigUpdate {
            fan_mode: Some(FanMode::Manual),
            manual_on: Some(percent > 0),
            manual_percent: Some(percent),
            ..Default::default()
        };
        match self.store.apply_update(&update, &self.pwm) {
            Ok(cfg) => format!("manual {}%", cfg.manual_percent),
            Err(e) => format!("error: {e}"),
        }
    }

    fn cmd_set_pwm_freq(&self, args: &[&str]) -> String {
        let hz: u32 = match args {
            [v] => match v.parse() {
                Ok(hz) => hz,
                Err(_) => return "usage: set_pwm_freq <hz>".to_string(),
            },
            _ => return "usage: set_pwm_freq <hz>".to_string(),
        };
        match self.store.set_frequency(hz, &self.pwm) {
            Ok(achieved) => format!("pwm_freq_hz = {achieved}"),
            Err(e) => format!("error: {e}"),
        }
    }
}

/// `"1d 2h 30m 5s"`, dropping leading zero units.
pub fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let mins = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if days > 0 || hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    if days > 0 || hours > 0 || mins > 0 {
        out.push_str(&format!("{mins}m "));
    }
    out.push_str(&format!("{secs}s"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs_store::SettingsFile;
    use crate::error::StorageError;

    struct NullFile;
    impl SettingsFile for NullFile {
        fn read(&self) -> Result<String, StorageError> {
            Err(StorageError::OpenFailed("null".into()))
        }
        fn write(&mut self, _contents: &str) -> Result<(), StorageError> {
            Ok(())
        }
        fn exists(&self) -> bool {
            false
        }
    }

    fn console() -> Console {
        let store = Arc::new(ConfigStore::new(Box::new(NullFile)));
        store.load();
        Console::new(
            store,
            Arc::new(Mutex::new(FanPwm::new(0, 12_500, 8, false).unwrap())),
            Arc::new(SharedStatus::new()),
            Arc::new(Esp32TimeAdapter::new()),
        )
    }

    #[test]
    fn set_applies_and_echoes_the_field() {
        let c = console();
        assert_eq!(c.handle_line("set manual_percent 40"), "manual_percent = 40");
        assert_eq!(c.store.snapshot().manual_percent, 40);
    }

    #[test]
    fn set_hostname_takes_a_bare_string() {
        let c = console();
        let reply = c.handle_line("set hostname garagefan");
        assert_eq!(reply, "hostname = \"garagefan\"");
        assert_eq!(c.store.snapshot().hostname, "garagefan");
    }

    #[test]
    fn set_rejects_unknown_fields() {
        let c = console();
        assert!(c.handle_line("set bogus 1").starts_with("unknown field"));
    }

    #[test]
    fn set_surfaces_validation_errors() {
        let c = console();
        let reply = c.handle_line("set min_rotation_temp 60");
        assert!(reply.starts_with("error:"), "got {reply}");
        // Prior configuration retained.
        assert_eq!(c.store.snapshot().min_rotation_temp, 25);
    }

    #[test]
    fn fan_mode_switches() {
        let c = console();
        assert_eq!(c.handle_line("fan_mode MANUAL"), "fan_mode = MANUAL");
        assert_eq!(c.store.snapshot().fan_mode, FanMode::Manual);
        assert!(c.handle_line("fan_mode turbo").starts_with("usage:"));
    }

    #[test]
    fn set_pwm_implies_manual_mode() {
        let c = console();
        assert_eq!(c.handle_line("set_pwm 30"), "manual 30%");
        let cfg = c.store.snapshot();
        assert_eq!(cfg.fan_mode, FanMode::Manual);
        assert!(cfg.manual_on);
        assert_eq!(cfg.manual_percent, 30);
        // Zero turns the override off.
        c.handle_line("set_pwm 0");
        assert!(!c.store.snapshot().manual_on);
    }

    #[test]
    fn set_pwm_freq_reports_achieved() {
        let c = console();
        let reply = c.handle_line("set_pwm_freq 21000");
        let achieved = c.store.snapshot().pwm_freq_hz;
        assert_eq!(reply, format!("pwm_freq_hz = {achieved}"));
        assert_ne!(achieved, 21_000);
    }

    #[test]
    fn get_and_status_emit_json() {
        let c = console();
        assert!(c.handle_line("get").contains("\"hostname\""));
        assert!(c.handle_line("status").contains("\"target_percent\""));
    }

    #[test]
    fn unknown_command_suggests_help() {
        let c = console();
        assert!(c.handle_line("reboot").contains("unknown command"));
        assert!(c.handle_line("help").contains("set_pwm_freq"));
        assert_eq!(c.handle_line("   "), "");
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(65), "1m 5s");
        assert_eq!(format_uptime(3_605), "1h 0m 5s");
        assert_eq!(format_uptime(95_405), "1d 2h 30m 5s");
        assert_eq!(format_uptime(0), "0s");
    }
}

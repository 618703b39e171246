//! alarmd configuration
//!
//! Loaded through `common::config_loader`: defaults, then
//! `config/alarmd.{toml,yaml,json}` or `--config`, then `ALARMD_*` env vars
//! (`ALARMD_LOG__LEVEL=debug`).

use std::path::{Path, PathBuf};

use alarm_scheduler::clock::{DEFAULT_MAX_YEAR, DEFAULT_MIN_YEAR};
use alarm_scheduler::{DayMask, SystemAlarmSpec, TimeField, DEFAULT_POLL_MS, MAX_ALARMS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::actions;

pub const SERVICE_NAME: &str = "alarmd";

/// Upper bound on the poll period; anything slower could skip a minute
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmdConfig {
    /// Scheduler poll period
    pub poll_interval_ms: u64,
    /// JSON file holding the customizable alarms
    pub store_path: PathBuf,
    pub log: LoggingConfig,
    pub clock: ClockConfig,
    /// Registered in order at startup, before stored alarms are loaded
    pub system_alarms: Vec<SystemAlarmConfig>,
}

impl Default for AlarmdConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_MS,
            store_path: PathBuf::from("data/customizable_alarms.json"),
            log: LoggingConfig::default(),
            clock: ClockConfig::default(),
            system_alarms: vec![SystemAlarmConfig {
                interval_minutes: 1,
                action: actions::HEARTBEAT.to_string(),
                ..SystemAlarmConfig::default()
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or filter directive
    pub level: String,
    /// Log directory; `ALARMD_LOG_DIR` overrides it
    pub dir: Option<String>,
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            file_enabled: true,
        }
    }
}

/// System clock plausibility window and probe cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub min_year: i32,
    pub max_year: i32,
    pub probe_interval_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
            probe_interval_secs: 10,
        }
    }
}

/// One system alarm. Hour and minute take a number or `"*"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemAlarmConfig {
    pub day_mask: DayMask,
    pub hour: TimeField,
    pub minute: TimeField,
    pub interval_minutes: u16,
    /// Action label, see [`actions::KNOWN_ACTIONS`]
    pub action: String,
    pub parameter: u16,
    pub enabled: bool,
}

impl Default for SystemAlarmConfig {
    fn default() -> Self {
        Self {
            day_mask: DayMask::ALL,
            hour: TimeField::Any,
            minute: TimeField::Any,
            interval_minutes: 0,
            action: actions::LOG.to_string(),
            parameter: 0,
            enabled: true,
        }
    }
}

impl SystemAlarmConfig {
    pub fn to_spec(&self) -> SystemAlarmSpec {
        SystemAlarmSpec::new(self.day_mask, self.hour, self.minute)
            .interval(self.interval_minutes)
            .parameter(self.parameter)
            .enabled(self.enabled)
    }

    fn validate(&self, position: usize) -> Result<()> {
        if let TimeField::At(hour) = self.hour {
            if hour > 23 {
                bail!("system_alarms[{}]: hour must be 0-23 or \"*\", got {}", position, hour);
            }
        }
        if let TimeField::At(minute) = self.minute {
            if minute > 59 {
                bail!(
                    "system_alarms[{}]: minute must be 0-59 or \"*\", got {}",
                    position,
                    minute
                );
            }
        }
        if self.day_mask.bits() > DayMask::ALL.bits() {
            bail!(
                "system_alarms[{}]: day_mask 0x{:02X} has bits above Saturday",
                position,
                self.day_mask.bits()
            );
        }
        if !actions::is_known(&self.action) {
            bail!(
                "system_alarms[{}]: unknown action '{}' (expected one of {})",
                position,
                self.action,
                actions::KNOWN_ACTIONS.join(", ")
            );
        }
        Ok(())
    }
}

impl AlarmdConfig {
    /// Defaults < file < env
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let config: Self = common::config_loader::load_config(SERVICE_NAME, config_file)
            .context("Failed to load alarmd configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            bail!(
                "poll_interval_ms must be 1-{}, got {}",
                MAX_POLL_INTERVAL_MS,
                self.poll_interval_ms
            );
        }
        if self.store_path.as_os_str().is_empty() {
            bail!("store_path must not be empty");
        }
        if self.clock.min_year > self.clock.max_year {
            bail!(
                "clock.min_year ({}) is after clock.max_year ({})",
                self.clock.min_year,
                self.clock.max_year
            );
        }
        if self.clock.probe_interval_secs == 0 {
            bail!("clock.probe_interval_secs must be positive");
        }
        if self.system_alarms.len() > MAX_ALARMS {
            bail!(
                "{} system alarms configured, table holds {}",
                self.system_alarms.len(),
                MAX_ALARMS
            );
        }
        for (position, alarm) in self.system_alarms.iter().enumerate() {
            alarm.validate(position)?;
        }
        Ok(())
    }

    /// Default configuration rendered as YAML
    pub fn generate_default_config() -> String {
        serde_yaml::to_string(&Self::default())
            .unwrap_or_else(|_| "# Failed to generate config file".to_string())
    }
}

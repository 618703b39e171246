//! Offline management commands
//!
//! Each command builds the same alarm table the service would, applies one
//! change and lets the store write the file back.

use alarm_scheduler::{
    Alarm, AlarmListing, AlarmSnapshot, AlarmStore, ClockSource, ClockStatus, CustomAlarmSpec, DayMask,
    SystemClock, TimeField,
};
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;

use crate::actions::{self, DeviceContext};
use crate::config::AlarmdConfig;
use crate::service::new_store;

/// Fields of a customizable alarm on the command line
#[derive(Debug, Clone, Default, Args)]
pub struct AlarmFields {
    /// Alarm name (max 49 chars)
    #[arg(long)]
    pub name: Option<String>,

    /// Free text description (max 99 chars)
    #[arg(long)]
    pub description: Option<String>,

    /// Days: "all", "weekdays", "weekend" or a list like "mon,wed,fri"
    #[arg(long, value_parser = parse_days)]
    pub days: Option<DayMask>,

    /// Hour 0-23
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=23))]
    pub hour: Option<u8>,

    /// Minute 0-59
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=59))]
    pub minute: Option<u8>,

    /// Action label (LOG, HEARTBEAT, RELAY_ON, RELAY_OFF)
    #[arg(long)]
    pub action: Option<String>,

    /// Value passed to the action, e.g. relay channel
    #[arg(long)]
    pub parameter: Option<u16>,

    /// Create or leave the alarm disabled
    #[arg(long)]
    pub disabled: bool,
}

impl AlarmFields {
    /// New alarm from the flags; name, hour and minute are required
    fn to_new_spec(&self) -> Result<CustomAlarmSpec> {
        let name = self.name.clone().context("--name is required")?;
        let hour = self.hour.context("--hour is required")?;
        let minute = self.minute.context("--minute is required")?;

        Ok(
            CustomAlarmSpec::new(name, self.days.unwrap_or(DayMask::ALL), hour, minute)
                .description(self.description.clone().unwrap_or_default())
                .type_label(self.action.clone().unwrap_or_else(|| actions::LOG.to_string()))
                .parameter(self.parameter.unwrap_or(0))
                .enabled(!self.disabled),
        )
    }

    /// Updated alarm: unset fields keep their current value
    fn merge_into(&self, current: &Alarm<DeviceContext>) -> CustomAlarmSpec {
        let meta = current.meta();
        let mut spec = CustomAlarmSpec::new(
            self.name.clone().unwrap_or_else(|| meta.name.clone()),
            self.days.unwrap_or(current.day_mask()),
            0,
            0,
        )
        .description(
            self.description
                .clone()
                .unwrap_or_else(|| meta.description.clone()),
        )
        .type_label(self.action.clone().unwrap_or_else(|| meta.type_label.clone()))
        .parameter(self.parameter.unwrap_or(current.parameter()))
        .enabled(current.enabled() && !self.disabled);

        spec.hour = self.hour.map_or(current.hour(), TimeField::At);
        spec.minute = self.minute.map_or(current.minute(), TimeField::At);
        spec
    }
}

/// Parse a day list for `--days`
pub fn parse_days(value: &str) -> std::result::Result<DayMask, String> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "all" | "every" | "daily" => return Ok(DayMask::ALL),
        "weekdays" => return Ok(DayMask::WEEKDAYS),
        "weekend" => return Ok(DayMask::WEEKEND),
        _ => {},
    }

    let mut mask = DayMask::from_bits(0);
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let weekday = match part {
            "sun" | "sunday" => 0,
            "mon" | "monday" => 1,
            "tue" | "tuesday" => 2,
            "wed" | "wednesday" => 3,
            "thu" | "thursday" => 4,
            "fri" | "friday" => 5,
            "sat" | "saturday" => 6,
            other => return Err(format!("unknown day '{}'", other)),
        };
        mask = mask | DayMask::from_weekday(weekday);
    }
    if mask.is_empty() {
        return Err("no days given".to_string());
    }
    Ok(mask)
}

/// Unlike service start-up, a file that cannot be read is an error here:
/// the next save would overwrite it.
fn open_store(config: &AlarmdConfig) -> Result<AlarmStore<DeviceContext>> {
    let mut store = new_store(config)?;
    store
        .load_customizables(actions::resolve_record)
        .with_context(|| format!("Failed to read {}", config.store_path.display()))?;
    Ok(store)
}

fn snapshot_now(store: &AlarmStore<DeviceContext>, config: &AlarmdConfig) -> AlarmSnapshot {
    let clock = SystemClock::with_year_window(
        ClockStatus::synced(),
        config.clock.min_year,
        config.clock.max_year,
    );
    AlarmSnapshot::capture(store, clock.local_time())
}

fn alarm_for(
    store: &AlarmStore<DeviceContext>,
    web_id: i32,
) -> Result<(usize, &Alarm<DeviceContext>)> {
    let index = store.find_by_web_id(web_id)?;
    let alarm = store
        .get(index)
        .with_context(|| format!("Alarm slot {} vanished", index))?;
    Ok((index, alarm))
}

fn listing_for(store: &AlarmStore<DeviceContext>, web_id: i32) -> Result<AlarmListing> {
    let (index, alarm) = alarm_for(store, web_id)?;
    Ok(AlarmListing::from_alarm(index, alarm))
}

fn print_row(row: &AlarmListing) {
    let state = if row.enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };
    let id = if row.customizable {
        row.id.to_string()
    } else {
        "-".to_string()
    };
    let name = if row.customizable {
        row.name.as_str()
    } else {
        "(system)"
    };
    let every = if row.interval_minutes > 0 {
        format!("every {}min", row.interval_minutes)
    } else {
        String::new()
    };
    println!(
        "{:>4} {:>4}  {:<24} {:<16} {:>5} {:<12} {:>5}  {:<9} {}",
        id,
        row.index,
        name,
        row.day_name,
        row.time_text,
        row.action,
        row.parameter,
        state,
        every
    );
}

pub fn list(config: &AlarmdConfig, json: bool, customizable_only: bool) -> Result<()> {
    let store = open_store(config)?;
    let snapshot = snapshot_now(&store, config);

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!(
        "{:>4} {:>4}  {:<24} {:<16} {:>5} {:<12} {:>5}  {:<9}",
        "ID", "SLOT", "NAME", "DAYS", "TIME", "ACTION", "PARAM", "STATE"
    );
    for row in snapshot
        .alarms
        .iter()
        .filter(|row| row.customizable || !customizable_only)
    {
        print_row(row);
    }
    println!(
        "{}/{} slots used",
        snapshot.stats.total, snapshot.stats.max_alarms
    );
    Ok(())
}

pub fn stats(config: &AlarmdConfig, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let stats = snapshot_now(&store, config).stats;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Total alarms:   {}", stats.total);
    println!("  system:       {}", stats.system);
    println!("  customizable: {}", stats.customizable);
    println!("  enabled:      {}", stats.enabled);
    println!("  disabled:     {}", stats.disabled);
    println!("Free slots:     {}/{}", stats.free_slots, stats.max_alarms);
    println!("Next web id:    {}", stats.next_web_id);
    match stats.current_time {
        Some(now) => println!(
            "Current time:   {:02}:{:02} (weekday {}, day {})",
            now.hour, now.minute, now.weekday, now.year_day
        ),
        None => println!("Current time:   {}", "not synchronized".yellow()),
    }
    Ok(())
}

pub fn add(config: &AlarmdConfig, fields: &AlarmFields) -> Result<()> {
    let spec = fields.to_new_spec()?;
    if !actions::is_known(&spec.type_label) {
        eprintln!(
            "{} action '{}' is unknown, the alarm will not do anything",
            "WARN".yellow(),
            spec.type_label
        );
    }
    let action = actions::resolve(&spec.type_label);

    let mut store = open_store(config)?;
    let index = store.add_customizable(spec, action)?;
    let alarm = store
        .get(index)
        .with_context(|| format!("Alarm slot {} vanished", index))?;
    let row = AlarmListing::from_alarm(index, alarm);

    println!("{} Added alarm {}", "OK".green(), row.id);
    print_row(&row);
    Ok(())
}

pub fn modify(config: &AlarmdConfig, web_id: i32, fields: &AlarmFields) -> Result<()> {
    let mut store = open_store(config)?;
    let (_, current) = alarm_for(&store, web_id)?;
    let spec = fields.merge_into(current);
    let action = actions::resolve(&spec.type_label);

    store.modify_customizable(web_id, spec, action)?;

    println!("{} Modified alarm {}", "OK".green(), web_id);
    print_row(&listing_for(&store, web_id)?);
    Ok(())
}

pub fn delete(config: &AlarmdConfig, web_id: i32) -> Result<()> {
    let mut store = open_store(config)?;
    store.delete_customizable(web_id)?;
    println!("{} Deleted alarm {}", "OK".green(), web_id);
    Ok(())
}

pub fn set_enabled(config: &AlarmdConfig, web_id: i32, enabled: bool) -> Result<()> {
    let mut store = open_store(config)?;
    store.set_enabled(web_id, enabled)?;
    println!(
        "{} Alarm {} {}",
        "OK".green(),
        web_id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Validate the configuration and the store file without changing anything
pub fn check(config: &AlarmdConfig, print_default: bool) -> Result<()> {
    if print_default {
        print!("{}", AlarmdConfig::generate_default_config());
        return Ok(());
    }

    print!("Configuration ... ");
    if let Err(e) = config.validate() {
        println!("{}", "FAIL".red());
        eprintln!("  {} {:#}", "ERROR".red(), e);
        bail!("configuration invalid");
    }
    println!("{}", "OK".green());

    print!("Alarm table   ... ");
    let store = open_store(config)?;
    let inert = store
        .customizable()
        .filter(|alarm| alarm.action().is_none())
        .count();
    println!(
        "{} ({} system, {} customizable, {} free)",
        "OK".green(),
        store.count() - store.customizable().count(),
        store.customizable().count(),
        store.free_slots()
    );
    if inert > 0 {
        println!(
            "  {} {} stored alarms have an unknown action",
            "WARN".yellow(),
            inert
        );
    }
    Ok(())
}

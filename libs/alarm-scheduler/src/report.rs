//! Diagnostic snapshot of the alarm table
//!
//! Read-only export for management surfaces (web UI, CLI). Rendering is up
//! to the caller; every type here is `Serialize`.

use serde::Serialize;
use tracing::debug;

use crate::clock::WallClockTime;
use crate::store::{AlarmStore, MAX_ALARMS};
use crate::types::Alarm;

/// Clock reading at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentTime {
    pub hour: u8,
    pub minute: u8,
    pub weekday: u8,
    pub year_day: u16,
}

impl From<WallClockTime> for CurrentTime {
    fn from(now: WallClockTime) -> Self {
        Self {
            hour: now.hour,
            minute: now.minute,
            weekday: now.weekday,
            year_day: now.year_day,
        }
    }
}

/// Table-level counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmStats {
    pub total: usize,
    pub system: usize,
    pub customizable: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub free_slots: usize,
    pub max_alarms: usize,
    pub next_web_id: i32,
    /// `None` while the clock is unsynchronized
    pub current_time: Option<CurrentTime>,
}

impl AlarmStats {
    pub fn collect<C>(store: &AlarmStore<C>, now: Option<WallClockTime>) -> Self {
        let customizable = store.customizable().count();
        let enabled = store.iter().filter(|a| a.enabled()).count();
        Self {
            total: store.count(),
            system: store.count() - customizable,
            customizable,
            enabled,
            disabled: store.count() - enabled,
            free_slots: store.free_slots(),
            max_alarms: MAX_ALARMS,
            next_web_id: store.next_web_id(),
            current_time: now.map(CurrentTime::from),
        }
    }
}

/// One row of the alarm listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmListing {
    /// Web id, -1 for system alarms
    pub id: i32,
    /// Current slot; changes when earlier alarms are deleted
    pub index: usize,
    pub name: String,
    pub description: String,
    /// Legacy single-day code (0 = every day)
    pub day: u8,
    pub day_mask: u8,
    pub day_name: String,
    pub time_text: String,
    pub interval_minutes: u16,
    /// Type label
    pub action: String,
    /// Bound callback shape, "none" when inert
    pub callback: String,
    pub parameter: u16,
    pub enabled: bool,
    pub customizable: bool,
}

impl AlarmListing {
    pub fn from_alarm<C>(index: usize, alarm: &Alarm<C>) -> Self {
        Self {
            id: alarm.web_id(),
            index,
            name: alarm.meta().name.clone(),
            description: alarm.meta().description.clone(),
            day: alarm.day_mask().legacy_day(),
            day_mask: alarm.day_mask().bits(),
            day_name: alarm.day_mask().summary(),
            time_text: alarm.time_text(),
            interval_minutes: alarm.interval_minutes(),
            action: alarm.meta().type_label.clone(),
            callback: alarm
                .action()
                .map_or("none", |action| action.label())
                .to_string(),
            parameter: alarm.parameter(),
            enabled: alarm.enabled(),
            customizable: alarm.is_customizable(),
        }
    }
}

/// Counters plus per-alarm rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmSnapshot {
    pub stats: AlarmStats,
    pub alarms: Vec<AlarmListing>,
}

impl AlarmSnapshot {
    pub fn capture<C>(store: &AlarmStore<C>, now: Option<WallClockTime>) -> Self {
        Self {
            stats: AlarmStats::collect(store, now),
            alarms: store
                .iter()
                .enumerate()
                .map(|(index, alarm)| AlarmListing::from_alarm(index, alarm))
                .collect(),
        }
    }

    /// Rows of customizable alarms only, as shown to web clients
    pub fn customizable(&self) -> impl Iterator<Item = &AlarmListing> {
        self.alarms.iter().filter(|a| a.customizable)
    }
}

/// Dump every slot at debug level
pub fn log_all_alarms<C>(store: &AlarmStore<C>) {
    debug!(
        "Alarm table: {}/{} used, next web id {}",
        store.count(),
        MAX_ALARMS,
        store.next_web_id()
    );
    for (index, alarm) in store.iter().enumerate() {
        debug!(
            "  #{} id={} '{}' type={} days={} time={} every={}min param={} enabled={} callback={}",
            index,
            alarm.web_id(),
            alarm.meta().name,
            alarm.meta().type_label,
            alarm.day_mask().summary(),
            alarm.time_text(),
            alarm.interval_minutes(),
            alarm.parameter(),
            alarm.enabled(),
            alarm.action().map_or("none", |a| a.label())
        );
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::store::{CustomAlarmSpec, SystemAlarmSpec};
    use crate::types::{AlarmAction, DayMask, TimeField};

    #[test]
    fn test_snapshot_counts_and_rows() {
        let mut store: AlarmStore = AlarmStore::default();
        store
            .add_external0(SystemAlarmSpec::every(15), || {})
            .unwrap();
        store
            .add_external(
                SystemAlarmSpec::new(DayMask::WEEKEND, TimeField::Any, TimeField::At(30))
                    .enabled(false),
                |_| {},
            )
            .unwrap();
        store
            .add_customizable(
                CustomAlarmSpec::new("Lights off", DayMask::FRIDAY, 23, 5)
                    .type_label("RELAY_OFF")
                    .parameter(2),
                Some(AlarmAction::external(|_| {})),
            )
            .unwrap();

        let now = WallClockTime::new(5, 40, 23, 5, 1_700_000_000);
        let snapshot = AlarmSnapshot::capture(&store, Some(now));

        assert_eq!(snapshot.stats.total, 3);
        assert_eq!(snapshot.stats.system, 2);
        assert_eq!(snapshot.stats.customizable, 1);
        assert_eq!(snapshot.stats.enabled, 2);
        assert_eq!(snapshot.stats.disabled, 1);
        assert_eq!(snapshot.stats.free_slots, MAX_ALARMS - 3);
        assert_eq!(snapshot.stats.next_web_id, 2);
        assert_eq!(snapshot.stats.current_time.unwrap().weekday, 5);

        let row = snapshot.customizable().next().unwrap();
        assert_eq!(row.id, 1);
        assert_eq!(row.index, 2);
        assert_eq!(row.day, 6);
        assert_eq!(row.day_name, "Friday");
        assert_eq!(row.time_text, "23:05");
        assert_eq!(row.action, "RELAY_OFF");
        assert_eq!(row.callback, "external");

        assert_eq!(snapshot.alarms[0].time_text, "*:*");
        assert_eq!(snapshot.alarms[1].day_name, "Sun,Sat");

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["stats"]["next_web_id"], 2);
        assert!(json["alarms"].as_array().unwrap().len() == 3);
    }

    #[test]
    fn test_stats_without_clock() {
        let store: AlarmStore = AlarmStore::default();
        let stats = AlarmStats::collect(&store, None);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.next_web_id, 1);
        assert!(stats.current_time.is_none());
    }
}

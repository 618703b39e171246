//! Alarm Store - fixed-capacity alarm table
//!
//! Holds system alarms (registered once at startup, only enabled/disabled
//! afterwards) and customizable alarms (created, edited and deleted at
//! runtime, addressed by web id). Deletion compacts the table, so array
//! indexes are not stable handles for customizable alarms.

use tracing::{debug, info, warn};

use crate::error::{AlarmError, PersistenceError, Result};
use crate::persistence::{AlarmPersistence, AlarmRecord, NullPersistence};
use crate::types::{Alarm, AlarmAction, AlarmMeta, DayMask, DedupCache, TimeField};

/// Total slots shared by system and customizable alarms
pub const MAX_ALARMS: usize = 16;

/// Schedule of a system alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemAlarmSpec {
    pub day_mask: DayMask,
    pub hour: TimeField,
    pub minute: TimeField,
    pub interval_minutes: u16,
    pub parameter: u16,
    pub enabled: bool,
}

impl SystemAlarmSpec {
    /// Enabled, non-interval alarm with parameter 0
    pub fn new(day_mask: DayMask, hour: TimeField, minute: TimeField) -> Self {
        Self {
            day_mask,
            hour,
            minute,
            interval_minutes: 0,
            parameter: 0,
            enabled: true,
        }
    }

    pub fn every(interval_minutes: u16) -> Self {
        Self::new(DayMask::ALL, TimeField::Any, TimeField::Any).interval(interval_minutes)
    }

    pub fn interval(mut self, interval_minutes: u16) -> Self {
        self.interval_minutes = interval_minutes;
        self
    }

    pub fn parameter(mut self, parameter: u16) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Fields of a customizable alarm, as sent by a management client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomAlarmSpec {
    pub name: String,
    pub description: String,
    pub day_mask: DayMask,
    pub hour: TimeField,
    pub minute: TimeField,
    pub type_label: String,
    pub parameter: u16,
    pub enabled: bool,
}

impl CustomAlarmSpec {
    pub fn new(name: impl Into<String>, day_mask: DayMask, hour: u8, minute: u8) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            day_mask,
            hour: TimeField::At(hour),
            minute: TimeField::At(minute),
            type_label: "CUSTOM".to_string(),
            parameter: 0,
            enabled: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn type_label(mut self, type_label: impl Into<String>) -> Self {
        self.type_label = type_label.into();
        self
    }

    pub fn parameter(mut self, parameter: u16) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Customizable alarms need a name and a fixed, in-range time
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AlarmError::InvalidAlarm("name must not be empty".into()));
        }
        match self.hour {
            TimeField::At(h) if h <= 23 => {},
            other => {
                return Err(AlarmError::InvalidAlarm(format!(
                    "hour must be 0-23, got {}",
                    other
                )))
            },
        }
        match self.minute {
            TimeField::At(m) if m <= 59 => {},
            other => {
                return Err(AlarmError::InvalidAlarm(format!(
                    "minute must be 0-59, got {}",
                    other
                )))
            },
        }
        Ok(())
    }
}

/// Fixed-capacity ordered alarm collection
pub struct AlarmStore<C = ()> {
    alarms: Vec<Alarm<C>>,
    persistence: Box<dyn AlarmPersistence>,
}

impl<C> Default for AlarmStore<C> {
    fn default() -> Self {
        Self::new(NullPersistence)
    }
}

impl<C> AlarmStore<C> {
    pub fn new(persistence: impl AlarmPersistence + 'static) -> Self {
        Self {
            alarms: Vec::with_capacity(MAX_ALARMS),
            persistence: Box::new(persistence),
        }
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn count(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.alarms.len() >= MAX_ALARMS
    }

    pub fn free_slots(&self) -> usize {
        MAX_ALARMS.saturating_sub(self.alarms.len())
    }

    pub fn get(&self, index: usize) -> Option<&Alarm<C>> {
        self.alarms.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alarm<C>> {
        self.alarms.iter()
    }

    pub fn customizable(&self) -> impl Iterator<Item = &Alarm<C>> {
        self.alarms.iter().filter(|a| a.customizable)
    }

    /// Index of the customizable alarm with this web id
    pub fn find_by_web_id(&self, web_id: i32) -> Result<usize> {
        self.alarms
            .iter()
            .position(|a| a.customizable && a.web_id == web_id)
            .ok_or(AlarmError::NotFound(web_id))
    }

    /// Id the next customizable alarm will receive: highest live id + 1
    pub fn next_web_id(&self) -> i32 {
        self.customizable()
            .map(|a| a.web_id)
            .max()
            .unwrap_or(0)
            .max(0)
            + 1
    }

    pub(crate) fn alarms_mut(&mut self) -> &mut [Alarm<C>] {
        &mut self.alarms
    }

    // ------------------------------------------------------------------
    // System alarms
    // ------------------------------------------------------------------

    /// Append a system alarm. No dedup by time or action is attempted.
    pub fn insert_system(&mut self, spec: SystemAlarmSpec, action: AlarmAction<C>) -> Result<usize> {
        self.ensure_capacity()?;

        let parameter = if action.takes_parameter() {
            spec.parameter
        } else {
            0
        };
        let index = self.alarms.len();
        debug!(
            "Registered system alarm #{}: mask=0x{:02X} {}:{} every={}min action={} param={}",
            index,
            spec.day_mask.bits(),
            spec.hour,
            spec.minute,
            spec.interval_minutes,
            action.label(),
            parameter
        );

        self.alarms.push(Alarm {
            enabled: spec.enabled,
            day_mask: spec.day_mask.normalized(),
            hour: spec.hour,
            minute: spec.minute,
            interval_minutes: spec.interval_minutes,
            cache: DedupCache::NEVER,
            action: Some(action),
            parameter,
            meta: AlarmMeta::system(),
            customizable: false,
            web_id: -1,
        });
        Ok(index)
    }

    pub fn add_member(&mut self, spec: SystemAlarmSpec, method: fn(&mut C, u16)) -> Result<usize> {
        self.insert_system(spec, AlarmAction::Member(method))
    }

    pub fn add_external<F>(&mut self, spec: SystemAlarmSpec, f: F) -> Result<usize>
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        self.insert_system(spec, AlarmAction::external(f))
    }

    /// Parameterless variant; the stored parameter is always 0
    pub fn add_external0<F>(&mut self, spec: SystemAlarmSpec, f: F) -> Result<usize>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert_system(spec, AlarmAction::external0(f))
    }

    /// Enable/disable by index (system alarms). Returns false if out of range.
    pub fn set_enabled_at(&mut self, index: usize, enabled: bool) -> bool {
        match self.alarms.get_mut(index) {
            Some(alarm) => {
                alarm.set_enabled(enabled);
                true
            },
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Customizable alarms
    // ------------------------------------------------------------------

    /// Create a customizable alarm and persist the customizable set
    pub fn add_customizable(
        &mut self,
        spec: CustomAlarmSpec,
        action: Option<AlarmAction<C>>,
    ) -> Result<usize> {
        self.ensure_capacity()?;
        spec.validate()?;

        let web_id = self.next_web_id();
        let index = self.alarms.len();
        self.alarms.push(Alarm {
            enabled: spec.enabled,
            day_mask: spec.day_mask.normalized(),
            hour: spec.hour,
            minute: spec.minute,
            interval_minutes: 0,
            cache: DedupCache::NEVER,
            action,
            parameter: spec.parameter,
            meta: AlarmMeta::new(&spec.name, &spec.description, &spec.type_label),
            customizable: true,
            web_id,
        });

        info!(
            "Added alarm '{}' (web id {}) at {:02}:{:02}",
            self.alarms[index].meta.name,
            web_id,
            spec.hour.raw(),
            spec.minute.raw()
        );
        self.persist();
        Ok(index)
    }

    /// Overwrite a customizable alarm; its dedup cache starts over
    pub fn modify_customizable(
        &mut self,
        web_id: i32,
        spec: CustomAlarmSpec,
        action: Option<AlarmAction<C>>,
    ) -> Result<()> {
        let index = self.locate_customizable(web_id)?;
        let action = action.ok_or(AlarmError::InvalidCallback(web_id))?;
        spec.validate()?;

        let alarm = &mut self.alarms[index];
        alarm.enabled = spec.enabled;
        alarm.day_mask = spec.day_mask.normalized();
        alarm.hour = spec.hour;
        alarm.minute = spec.minute;
        alarm.action = Some(action);
        alarm.parameter = spec.parameter;
        alarm.meta = AlarmMeta::new(&spec.name, &spec.description, &spec.type_label);
        // A new time must not inherit a window fired under the old one
        alarm.cache.reset();

        info!("Modified alarm '{}' (web id {})", alarm.meta.name, web_id);
        self.persist();
        Ok(())
    }

    /// Remove a customizable alarm; later entries shift down one slot
    pub fn delete_customizable(&mut self, web_id: i32) -> Result<()> {
        let index = self.locate_customizable(web_id)?;
        let removed = self.alarms.remove(index);

        info!(
            "Deleted alarm '{}' (web id {}) from slot {}",
            removed.meta.name, web_id, index
        );
        self.persist();
        Ok(())
    }

    /// Enable or disable a customizable alarm; enabling clears its cache
    pub fn set_enabled(&mut self, web_id: i32, enabled: bool) -> Result<()> {
        let index = self.locate_customizable(web_id)?;
        if self.alarms[index].set_enabled(enabled) {
            info!(
                "Alarm web id {} {}",
                web_id,
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.persist();
        Ok(())
    }

    /// Forget every fired window (e.g. after a large clock jump)
    pub fn reset_all_cache(&mut self) {
        for alarm in &mut self.alarms {
            alarm.cache.reset();
        }
        debug!("Reset dedup cache of {} alarms", self.alarms.len());
    }

    /// Drop every alarm, system ones included. Nothing is persisted.
    pub fn clear(&mut self) {
        self.alarms.clear();
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn customizable_records(&self) -> Vec<AlarmRecord> {
        self.customizable().map(AlarmRecord::from_alarm).collect()
    }

    /// Write the customizable set. Failures are logged, never returned:
    /// the in-memory table stays authoritative.
    pub fn persist(&self) {
        let records = self.customizable_records();
        if let Err(e) = self.persistence.save(&records) {
            warn!("Failed to persist {} alarms: {}", records.len(), e);
        }
    }

    /// Replace the customizable alarms with the persisted set.
    ///
    /// System alarms are kept. Invalid or duplicate records are skipped;
    /// loading stops when the table is full. `resolve` binds an action to
    /// each record by its type label; records it rejects load inert.
    /// On a read/parse failure the table is left untouched.
    pub fn load_customizables<F>(&mut self, mut resolve: F) -> std::result::Result<usize, PersistenceError>
    where
        F: FnMut(&AlarmRecord) -> Option<AlarmAction<C>>,
    {
        let records = self.persistence.load()?;
        self.alarms.retain(|a| !a.customizable);

        let mut loaded = 0;
        for record in records {
            if let Err(reason) = record.validate() {
                debug!("Skipping stored alarm id {}: {}", record.id, reason);
                continue;
            }
            if self.find_by_web_id(record.id).is_ok() {
                warn!("Skipping duplicate stored alarm id {}", record.id);
                continue;
            }
            if self.is_full() {
                warn!(
                    "Alarm table full, {} stored alarms not loaded",
                    MAX_ALARMS
                );
                break;
            }

            let action = resolve(&record);
            if action.is_none() {
                debug!(
                    "No action for stored alarm id {} (type '{}'), loading inert",
                    record.id, record.action
                );
            }
            let day_mask = record.resolved_day_mask().unwrap_or(DayMask::ALL);
            self.alarms.push(Alarm {
                enabled: record.enabled,
                day_mask,
                hour: TimeField::At(record.hour),
                minute: TimeField::At(record.minute),
                interval_minutes: 0,
                cache: DedupCache::NEVER,
                action,
                parameter: record.parameter,
                meta: AlarmMeta::new(&record.name, &record.description, &record.action),
                customizable: true,
                web_id: record.id,
            });
            loaded += 1;
        }

        info!("Loaded {} customizable alarms", loaded);
        Ok(loaded)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn ensure_capacity(&self) -> Result<()> {
        if self.is_full() {
            warn!("Alarm table full ({} alarms)", MAX_ALARMS);
            return Err(AlarmError::CapacityExceeded { max: MAX_ALARMS });
        }
        Ok(())
    }

    /// Index for a web-id mutation; system alarms (web id -1) are refused
    fn locate_customizable(&self, web_id: i32) -> Result<usize> {
        match self.alarms.iter().position(|a| a.web_id == web_id) {
            Some(index) if self.alarms[index].customizable => Ok(index),
            Some(_) => Err(AlarmError::NotCustomizable(web_id)),
            None => Err(AlarmError::NotFound(web_id)),
        }
    }
}

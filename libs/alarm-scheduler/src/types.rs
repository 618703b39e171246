//! Alarm type definitions
//!
//! Core types for alarm matching and dispatch:
//! - DayMask: weekday bit set (bit 0 = Sunday)
//! - TimeField: hour/minute value or wildcard
//! - AlarmAction: the three callback shapes an alarm can fire
//! - DedupCache: last fired window, used to suppress duplicate firing
//! - Alarm: one scheduled rule as held by the store

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::WallClockTime;

/// Raw wire value meaning "any hour" / "any minute"
pub const WILDCARD: u8 = 255;

/// Maximum characters kept for an alarm name
pub const NAME_MAX: usize = 49;
/// Maximum characters kept for an alarm description
pub const DESCRIPTION_MAX: usize = 99;
/// Maximum characters kept for an alarm type label
pub const TYPE_LABEL_MAX: usize = 19;

/// Type label carried by alarms registered at startup
pub const SYSTEM_LABEL: &str = "SYSTEM";

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

// ============================================================================
// Day mask
// ============================================================================

/// Weekday set, bit `i` = weekday `i` (0 = Sunday .. 6 = Saturday)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMask(u8);

impl DayMask {
    pub const SUNDAY: DayMask = DayMask(1 << 0);
    pub const MONDAY: DayMask = DayMask(1 << 1);
    pub const TUESDAY: DayMask = DayMask(1 << 2);
    pub const WEDNESDAY: DayMask = DayMask(1 << 3);
    pub const THURSDAY: DayMask = DayMask(1 << 4);
    pub const FRIDAY: DayMask = DayMask(1 << 5);
    pub const SATURDAY: DayMask = DayMask(1 << 6);
    pub const WEEKDAYS: DayMask = DayMask(0x3E);
    pub const WEEKEND: DayMask = DayMask(0x41);
    pub const ALL: DayMask = DayMask(0x7F);

    /// Build from raw bits, ignoring bit 7
    pub const fn from_bits(bits: u8) -> Self {
        DayMask(bits & 0x7F)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Mask with only `weekday` set; empty for out-of-range input
    pub fn from_weekday(weekday: u8) -> Self {
        if weekday <= 6 {
            DayMask(1 << weekday)
        } else {
            DayMask(0)
        }
    }

    pub fn contains_weekday(self, weekday: u8) -> bool {
        weekday <= 6 && self.0 & (1 << weekday) != 0
    }

    pub fn is_all(self) -> bool {
        self.0 == Self::ALL.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// An empty mask on creation means every day
    pub fn normalized(self) -> Self {
        if self.is_empty() {
            Self::ALL
        } else {
            self
        }
    }

    /// Single-day code used by the persisted document and web clients:
    /// 0 = every day, 1..=7 = first set weekday + 1.
    pub fn legacy_day(self) -> u8 {
        if self.is_all() || self.is_empty() {
            return 0;
        }
        (0..7u8)
            .find(|d| self.contains_weekday(*d))
            .map_or(0, |d| d + 1)
    }

    pub fn from_legacy_day(day: u8) -> Option<Self> {
        match day {
            0 => Some(Self::ALL),
            1..=7 => Some(DayMask(1 << (day - 1))),
            _ => None,
        }
    }

    /// Human-readable day list, e.g. "Every day", "Monday", "Mon,Wed,Fri"
    pub fn summary(self) -> String {
        if self.is_all() {
            return "Every day".to_string();
        }
        let days: Vec<&str> = (0..7u8)
            .filter(|d| self.contains_weekday(*d))
            .map(|d| DAY_NAMES[d as usize])
            .collect();
        match days.as_slice() {
            [] => "Never".to_string(),
            [single] => (*single).to_string(),
            many => many
                .iter()
                .map(|name| &name[..3])
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl BitOr for DayMask {
    type Output = DayMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        DayMask(self.0 | rhs.0)
    }
}

// ============================================================================
// Hour / minute field
// ============================================================================

/// Hour or minute selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    /// Matches every value
    Any,
    /// Matches exactly this value
    At(u8),
}

impl TimeField {
    /// Checked hour: 0..=23, or [`WILDCARD`] for any
    pub fn hour(value: u8) -> Option<Self> {
        Self::checked(value, 23)
    }

    /// Checked minute: 0..=59, or [`WILDCARD`] for any
    pub fn minute(value: u8) -> Option<Self> {
        Self::checked(value, 59)
    }

    fn checked(value: u8, max: u8) -> Option<Self> {
        match value {
            WILDCARD => Some(TimeField::Any),
            v if v <= max => Some(TimeField::At(v)),
            _ => None,
        }
    }

    pub fn matches(self, current: u8) -> bool {
        match self {
            TimeField::Any => true,
            TimeField::At(v) => v == current,
        }
    }

    pub fn is_any(self) -> bool {
        matches!(self, TimeField::Any)
    }

    /// Wire value, [`WILDCARD`] for any
    pub fn raw(self) -> u8 {
        match self {
            TimeField::Any => WILDCARD,
            TimeField::At(v) => v,
        }
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeField::Any => write!(f, "*"),
            TimeField::At(v) => write!(f, "{:02}", v),
        }
    }
}

impl Serialize for TimeField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimeField::Any => serializer.serialize_str("*"),
            TimeField::At(v) => serializer.serialize_u8(*v),
        }
    }
}

impl<'de> Deserialize<'de> for TimeField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u8),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(WILDCARD) => Ok(TimeField::Any),
            Raw::Number(v) => Ok(TimeField::At(v)),
            Raw::Text(s) if s.trim() == "*" => Ok(TimeField::Any),
            Raw::Text(s) => s
                .trim()
                .parse::<u8>()
                .map(|v| {
                    if v == WILDCARD {
                        TimeField::Any
                    } else {
                        TimeField::At(v)
                    }
                })
                .map_err(|_| serde::de::Error::custom(format!("invalid time field: {}", s))),
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// What an alarm does when it fires
///
/// `C` is the host context handed to [`AlarmAction::Member`] callbacks,
/// the equivalent of a bound method on the scheduler owner.
pub enum AlarmAction<C = ()> {
    /// Method-like callback on the host context, with parameter
    Member(fn(&mut C, u16)),
    /// Free callback with parameter
    External(Arc<dyn Fn(u16) + Send + Sync>),
    /// Free callback without parameter
    External0(Arc<dyn Fn() + Send + Sync>),
}

impl<C> AlarmAction<C> {
    pub fn external<F>(f: F) -> Self
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        AlarmAction::External(Arc::new(f))
    }

    pub fn external0<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        AlarmAction::External0(Arc::new(f))
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlarmAction::Member(_) => "member",
            AlarmAction::External(_) => "external",
            AlarmAction::External0(_) => "external0",
        }
    }

    pub fn takes_parameter(&self) -> bool {
        !matches!(self, AlarmAction::External0(_))
    }

    pub(crate) fn invoke(&self, ctx: &mut C, parameter: u16) {
        match self {
            AlarmAction::Member(f) => f(ctx, parameter),
            AlarmAction::External(f) => f(parameter),
            AlarmAction::External0(f) => f(),
        }
    }
}

impl<C> Clone for AlarmAction<C> {
    fn clone(&self) -> Self {
        match self {
            AlarmAction::Member(f) => AlarmAction::Member(*f),
            AlarmAction::External(f) => AlarmAction::External(Arc::clone(f)),
            AlarmAction::External0(f) => AlarmAction::External0(Arc::clone(f)),
        }
    }
}

impl<C> fmt::Debug for AlarmAction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AlarmAction").field(&self.label()).finish()
    }
}

// ============================================================================
// Dedup cache
// ============================================================================

/// Last fired window of an alarm
///
/// Never persisted; starts at the sentinel values after creation,
/// re-enable, modification or a global reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupCache {
    pub last_year_day: i16,
    pub last_minute: u8,
    pub last_hour: u8,
    /// Epoch seconds of the last firing, 0 = never
    pub last_execution: i64,
}

impl DedupCache {
    pub const NEVER: DedupCache = DedupCache {
        last_year_day: -1,
        last_minute: 255,
        last_hour: 255,
        last_execution: 0,
    };

    pub fn reset(&mut self) {
        *self = Self::NEVER;
    }

    pub fn is_never_fired(&self) -> bool {
        self.last_execution == 0
    }

    pub fn record(&mut self, now: &WallClockTime) {
        self.last_year_day = now.year_day as i16;
        self.last_minute = now.minute;
        self.last_hour = now.hour;
        self.last_execution = now.epoch;
    }

    /// Whether the window containing `now` has already fired.
    ///
    /// Fixed-hour alarms key on (day, minute); wildcard-hour alarms also
    /// need the hour since they match once per hour.
    pub fn fired_in(&self, now: &WallClockTime, include_hour: bool) -> bool {
        let same_minute =
            self.last_year_day == now.year_day as i16 && self.last_minute == now.minute;
        if include_hour {
            same_minute && self.last_hour == now.hour
        } else {
            same_minute
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::NEVER
    }
}

// ============================================================================
// Presentation metadata
// ============================================================================

/// Name, description and type label shown by management surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmMeta {
    pub name: String,
    pub description: String,
    pub type_label: String,
}

impl AlarmMeta {
    /// Build metadata, truncating each field to its bound
    pub fn new(name: &str, description: &str, type_label: &str) -> Self {
        Self {
            name: truncate_chars(name, NAME_MAX),
            description: truncate_chars(description, DESCRIPTION_MAX),
            type_label: truncate_chars(type_label, TYPE_LABEL_MAX),
        }
    }

    pub fn system() -> Self {
        Self::new("", "", SYSTEM_LABEL)
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value.to_string(),
    }
}

// ============================================================================
// Alarm record
// ============================================================================

/// One scheduled rule
///
/// Fields are only changed through [`crate::AlarmStore`] and the scheduler.
pub struct Alarm<C = ()> {
    pub(crate) enabled: bool,
    pub(crate) day_mask: DayMask,
    pub(crate) hour: TimeField,
    pub(crate) minute: TimeField,
    pub(crate) interval_minutes: u16,
    pub(crate) cache: DedupCache,
    pub(crate) action: Option<AlarmAction<C>>,
    pub(crate) parameter: u16,
    pub(crate) meta: AlarmMeta,
    pub(crate) customizable: bool,
    pub(crate) web_id: i32,
}

impl<C> Alarm<C> {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn day_mask(&self) -> DayMask {
        self.day_mask
    }

    pub fn hour(&self) -> TimeField {
        self.hour
    }

    pub fn minute(&self) -> TimeField {
        self.minute
    }

    /// 0 = fixed/wildcard alarm, otherwise repeat period in minutes
    pub fn interval_minutes(&self) -> u16 {
        self.interval_minutes
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    pub fn action(&self) -> Option<&AlarmAction<C>> {
        self.action.as_ref()
    }

    pub fn parameter(&self) -> u16 {
        self.parameter
    }

    pub fn meta(&self) -> &AlarmMeta {
        &self.meta
    }

    pub fn is_customizable(&self) -> bool {
        self.customizable
    }

    /// Stable handle of a customizable alarm, -1 for system alarms
    pub fn web_id(&self) -> i32 {
        self.web_id
    }

    /// `HH:MM` with `*` for wildcard fields
    pub fn time_text(&self) -> String {
        format!("{}:{}", self.hour, self.minute)
    }

    /// Returns true when the flag changed. Re-enabling clears the cache.
    pub(crate) fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.enabled == enabled {
            return false;
        }
        if enabled {
            self.cache.reset();
        }
        self.enabled = enabled;
        true
    }
}

impl<C> Clone for Alarm<C> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            day_mask: self.day_mask,
            hour: self.hour,
            minute: self.minute,
            interval_minutes: self.interval_minutes,
            cache: self.cache,
            action: self.action.clone(),
            parameter: self.parameter,
            meta: self.meta.clone(),
            customizable: self.customizable,
            web_id: self.web_id,
        }
    }
}

impl<C> fmt::Debug for Alarm<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alarm")
            .field("web_id", &self.web_id)
            .field("name", &self.meta.name)
            .field("enabled", &self.enabled)
            .field("day_mask", &self.day_mask)
            .field("time", &self.time_text())
            .field("interval_minutes", &self.interval_minutes)
            .field("action", &self.action)
            .field("parameter", &self.parameter)
            .field("customizable", &self.customizable)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_day_mask_normalization_and_weekdays() {
        assert_eq!(DayMask::from_bits(0).normalized(), DayMask::ALL);
        assert_eq!(DayMask::MONDAY.normalized(), DayMask::MONDAY);
        assert!(DayMask::ALL.contains_weekday(0));
        assert!(DayMask::ALL.contains_weekday(6));
        assert!(!DayMask::ALL.contains_weekday(7));
        assert!(DayMask::WEEKDAYS.contains_weekday(1));
        assert!(!DayMask::WEEKDAYS.contains_weekday(0));
        assert_eq!(DayMask::from_weekday(3), DayMask::WEDNESDAY);
        assert!(DayMask::from_weekday(9).is_empty());
    }

    #[test]
    fn test_day_mask_legacy_code() {
        assert_eq!(DayMask::ALL.legacy_day(), 0);
        assert_eq!(DayMask::SUNDAY.legacy_day(), 1);
        assert_eq!(DayMask::SATURDAY.legacy_day(), 7);
        // First set weekday wins for multi-day masks
        assert_eq!((DayMask::TUESDAY | DayMask::FRIDAY).legacy_day(), 3);

        assert_eq!(DayMask::from_legacy_day(0), Some(DayMask::ALL));
        assert_eq!(DayMask::from_legacy_day(2), Some(DayMask::MONDAY));
        assert_eq!(DayMask::from_legacy_day(8), None);
    }

    #[test]
    fn test_day_mask_summary() {
        assert_eq!(DayMask::ALL.summary(), "Every day");
        assert_eq!(DayMask::THURSDAY.summary(), "Thursday");
        assert_eq!(
            (DayMask::MONDAY | DayMask::WEDNESDAY | DayMask::FRIDAY).summary(),
            "Mon,Wed,Fri"
        );
        assert_eq!(DayMask::default().summary(), "Never");
    }

    #[test]
    fn test_time_field_ranges() {
        assert_eq!(TimeField::hour(23), Some(TimeField::At(23)));
        assert_eq!(TimeField::hour(24), None);
        assert_eq!(TimeField::hour(WILDCARD), Some(TimeField::Any));
        assert_eq!(TimeField::minute(59), Some(TimeField::At(59)));
        assert_eq!(TimeField::minute(60), None);

        assert!(TimeField::Any.matches(17));
        assert!(TimeField::At(8).matches(8));
        assert!(!TimeField::At(8).matches(9));
        assert_eq!(TimeField::Any.raw(), WILDCARD);
        assert_eq!(TimeField::At(7).to_string(), "07");
        assert_eq!(TimeField::Any.to_string(), "*");
    }

    #[test]
    fn test_time_field_serde() {
        let any: TimeField = serde_json::from_str("\"*\"").unwrap();
        assert_eq!(any, TimeField::Any);
        let wire_any: TimeField = serde_json::from_str("255").unwrap();
        assert_eq!(wire_any, TimeField::Any);
        let at: TimeField = serde_json::from_str("\"30\"").unwrap();
        assert_eq!(at, TimeField::At(30));
        assert!(serde_json::from_str::<TimeField>("\"noon\"").is_err());
        assert_eq!(serde_json::to_string(&TimeField::At(5)).unwrap(), "5");
    }

    #[test]
    fn test_meta_truncates_on_char_boundary() {
        let long_name = "é".repeat(80);
        let meta = AlarmMeta::new(&long_name, "desc", "IRRIGATION_CONTROLLER_LONG");
        assert_eq!(meta.name.chars().count(), NAME_MAX);
        assert_eq!(meta.type_label.chars().count(), TYPE_LABEL_MAX);
        assert_eq!(AlarmMeta::system().type_label, SYSTEM_LABEL);
    }

    #[test]
    fn test_action_invoke_variants() {
        use std::sync::atomic::{AtomicU16, Ordering};

        let seen = Arc::new(AtomicU16::new(0));
        let seen_ext = Arc::clone(&seen);
        let external: AlarmAction<Vec<u16>> =
            AlarmAction::external(move |p| seen_ext.store(p, Ordering::SeqCst));
        let member: AlarmAction<Vec<u16>> = AlarmAction::Member(|ctx, p| ctx.push(p));

        let mut ctx = Vec::new();
        external.invoke(&mut ctx, 42);
        member.invoke(&mut ctx, 7);

        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(ctx, vec![7]);
        assert_eq!(member.label(), "member");
        assert!(!AlarmAction::<()>::external0(|| {}).takes_parameter());
    }
}

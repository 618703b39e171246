//! Clock sources
//!
//! The scheduler never reads the system time directly. It asks a
//! [`ClockSource`], which returns `None` until the device clock is trusted
//! (e.g. before the first time sync after boot).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Datelike, Local, TimeDelta, TimeZone, Timelike, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Default plausibility window for the device clock (inclusive years)
pub const DEFAULT_MIN_YEAR: i32 = 2020;
pub const DEFAULT_MAX_YEAR: i32 = 2050;

/// Broken-down local time as seen by one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WallClockTime {
    /// 0..=23
    pub hour: u8,
    /// 0..=59
    pub minute: u8,
    /// 0 = Sunday .. 6 = Saturday
    pub weekday: u8,
    /// 0-based day of year
    pub year_day: u16,
    /// Seconds since the Unix epoch
    pub epoch: i64,
}

impl WallClockTime {
    pub fn new(weekday: u8, year_day: u16, hour: u8, minute: u8, epoch: i64) -> Self {
        Self {
            hour,
            minute,
            weekday,
            year_day,
            epoch,
        }
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            weekday: dt.weekday().num_days_from_sunday() as u8,
            year_day: dt.ordinal0() as u16,
            epoch: dt.timestamp(),
        }
    }
}

/// Source of local wall-clock time
pub trait ClockSource: Send + Sync {
    /// Current local time, or `None` while the clock is not synchronized
    fn local_time(&self) -> Option<WallClockTime>;
}

/// Shared "clock is synchronized" flag
///
/// Handed to whatever performs time sync (NTP task, RTC driver) and to the
/// clock that the scheduler reads.
#[derive(Debug, Clone, Default)]
pub struct ClockStatus {
    synced: Arc<AtomicBool>,
}

impl ClockStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synced() -> Self {
        let status = Self::new();
        status.mark_synced();
        status
    }

    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    pub fn mark_unsynced(&self) {
        self.synced.store(false, Ordering::Release);
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

// ============================================================================
// System clock
// ============================================================================

/// Local system time gated by a [`ClockStatus`] and a plausible-year window
#[derive(Debug, Clone)]
pub struct SystemClock {
    status: ClockStatus,
    min_year: i32,
    max_year: i32,
}

impl SystemClock {
    pub fn new(status: ClockStatus) -> Self {
        Self::with_year_window(status, DEFAULT_MIN_YEAR, DEFAULT_MAX_YEAR)
    }

    pub fn with_year_window(status: ClockStatus, min_year: i32, max_year: i32) -> Self {
        Self {
            status,
            min_year,
            max_year,
        }
    }

    pub fn status(&self) -> &ClockStatus {
        &self.status
    }

    pub fn is_plausible<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        (self.min_year..=self.max_year).contains(&dt.year())
    }

    /// Re-check the system clock and update the status flag.
    ///
    /// A clock that falls back out of the window (RTC reset) is marked
    /// unsynced again. Returns the resulting state.
    pub fn probe(&self) -> bool {
        let now = Local::now();
        let plausible = self.is_plausible(&now);
        let was_synced = self.status.is_synced();

        if plausible && !was_synced {
            self.status.mark_synced();
            info!("Clock synchronized: {}", now.format("%Y-%m-%d %H:%M:%S"));
        } else if !plausible && was_synced {
            self.status.mark_unsynced();
            warn!(
                "Clock left plausible window {}..={}: {}",
                self.min_year,
                self.max_year,
                now.format("%Y-%m-%d %H:%M:%S")
            );
        }
        plausible
    }
}

impl ClockSource for SystemClock {
    fn local_time(&self) -> Option<WallClockTime> {
        if !self.status.is_synced() {
            return None;
        }
        let now = Local::now();
        self.is_plausible(&now)
            .then(|| WallClockTime::from_datetime(&now))
    }
}

// ============================================================================
// Manual clock
// ============================================================================

/// Settable clock for tests and simulations
///
/// Holds a UTC instant that is reported as local time; unset = unsynced.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Option<DateTime<Utc>>>,
}

impl ManualClock {
    /// Clock that reports "not synchronized"
    pub fn unsynced() -> Self {
        Self::default()
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(Some(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    pub fn clear(&self) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Move the clock; no-op while unsynced
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = now.as_mut() {
            *current += by;
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(TimeDelta::minutes(minutes));
    }
}

impl ClockSource for ManualClock {
    fn local_time(&self) -> Option<WallClockTime> {
        self.now
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(WallClockTime::from_datetime)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_from_datetime() {
        // 2024-01-01 was a Monday
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 8, 30, 15).unwrap();
        let t = WallClockTime::from_datetime(&dt);
        assert_eq!(t.hour, 8);
        assert_eq!(t.minute, 30);
        assert_eq!(t.weekday, 1);
        assert_eq!(t.year_day, 0);
        assert_eq!(t.epoch, dt.timestamp());
    }

    #[test]
    fn test_manual_clock_lifecycle() {
        let clock = ManualClock::unsynced();
        assert!(clock.local_time().is_none());

        // Advancing an unsynced clock does nothing
        clock.advance_minutes(10);
        assert!(clock.local_time().is_none());

        clock.set(Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 0).unwrap());
        clock.advance_minutes(1);
        let t = clock.local_time().unwrap();
        assert_eq!((t.hour, t.minute), (0, 0));
        // Saturday -> Sunday
        assert_eq!(t.weekday, 0);

        clock.clear();
        assert!(clock.local_time().is_none());
    }

    #[test]
    fn test_system_clock_gated_by_status() {
        let status = ClockStatus::new();
        let clock = SystemClock::new(status.clone());
        assert!(clock.local_time().is_none());

        status.mark_synced();
        // Host clock is inside the default window in any sane CI
        assert!(clock.local_time().is_some());
    }

    #[test]
    fn test_system_clock_rejects_implausible_years() {
        let status = ClockStatus::synced();
        let clock = SystemClock::with_year_window(status.clone(), 1990, 1999);

        assert!(!clock.is_plausible(&Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()));
        assert!(clock.is_plausible(&Utc.with_ymd_and_hms(1995, 6, 1, 0, 0, 0).unwrap()));
        assert!(clock.local_time().is_none());

        // Probe notices the clock is outside the window
        assert!(!clock.probe());
        assert!(!status.is_synced());
    }
}

//! Alarm Scheduler - minute-window alarm evaluation
//!
//! Each poll reads the clock once and walks the store in index order:
//! - Fixed/wildcard alarms fire once per matching window
//! - Interval alarms anchor on their first match, then fire on elapsed time
//!
//! A poll without a trusted clock is skipped entirely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::{ClockSource, WallClockTime};
use crate::report::AlarmSnapshot;
use crate::store::AlarmStore;
use crate::types::Alarm;

/// Default poll interval (1s), well under the one-minute resolution
pub const DEFAULT_POLL_MS: u64 = 1000;

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Clock unavailable, nothing evaluated
    Skipped,
    /// Full pass done; indexes of the alarms that fired
    Evaluated { fired: Vec<usize> },
}

impl PollOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, PollOutcome::Skipped)
    }

    pub fn fired(&self) -> &[usize] {
        match self {
            PollOutcome::Skipped => &[],
            PollOutcome::Evaluated { fired } => fired,
        }
    }
}

/// Whether `alarm` should fire at `now`. Does not touch the cache.
pub fn evaluate<C>(alarm: &Alarm<C>, now: &WallClockTime) -> bool {
    if !alarm.enabled() {
        return false;
    }
    if !alarm.day_mask().contains_weekday(now.weekday) {
        return false;
    }

    let cache = alarm.cache();
    if alarm.interval_minutes() > 0 {
        if cache.is_never_fired() {
            // Anchor: wildcard fields accept whatever minute this poll lands on
            alarm.hour().matches(now.hour) && alarm.minute().matches(now.minute)
        } else {
            now.epoch - cache.last_execution >= i64::from(alarm.interval_minutes()) * 60
        }
    } else {
        if !(alarm.hour().matches(now.hour) && alarm.minute().matches(now.minute)) {
            return false;
        }
        // Wildcard hour: window is (day, hour, minute). Fixed hour: (day, minute).
        !cache.fired_in(now, alarm.hour().is_any())
    }
}

/// Run one pass over `store` at `now`, firing due alarms
pub fn poll_at<C>(store: &mut AlarmStore<C>, now: Option<WallClockTime>, ctx: &mut C) -> PollOutcome {
    let Some(now) = now else {
        debug!("Clock not synchronized, poll skipped");
        return PollOutcome::Skipped;
    };

    let mut fired = Vec::new();
    for (index, alarm) in store.alarms_mut().iter_mut().enumerate() {
        if !evaluate(alarm, &now) {
            continue;
        }

        match alarm.action.as_ref() {
            Some(action) => {
                debug!(
                    "Firing alarm #{} ({}) at {:02}:{:02} action={} param={}",
                    index,
                    alarm.meta.type_label,
                    now.hour,
                    now.minute,
                    action.label(),
                    alarm.parameter
                );
                action.invoke(ctx, alarm.parameter);
            },
            None => debug!("Alarm #{} matched but has no action bound", index),
        }

        alarm.cache.record(&now);
        fired.push(index);
    }

    PollOutcome::Evaluated { fired }
}

/// Scheduler - owns the alarm store and its clock
pub struct AlarmScheduler<C = ()> {
    store: AlarmStore<C>,
    clock: Arc<dyn ClockSource>,
    poll_interval: Duration,
}

impl<C> AlarmScheduler<C> {
    pub fn new(store: AlarmStore<C>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            store,
            clock,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn store(&self) -> &AlarmStore<C> {
        &self.store
    }

    /// Mutable store access for CRUD between polls
    pub fn store_mut(&mut self) -> &mut AlarmStore<C> {
        &mut self.store
    }

    pub fn into_store(self) -> AlarmStore<C> {
        self.store
    }

    pub fn local_time(&self) -> Option<WallClockTime> {
        self.clock.local_time()
    }

    pub fn snapshot(&self) -> AlarmSnapshot {
        AlarmSnapshot::capture(&self.store, self.local_time())
    }

    /// Read the clock and evaluate every alarm once.
    /// Fired windows survive clock steps; hosts call
    /// `store_mut().reset_all_cache()` to forget them.
    pub fn poll(&mut self, ctx: &mut C) -> PollOutcome {
        let now = self.clock.local_time();
        poll_at(&mut self.store, now, ctx)
    }

    /// Poll on a fixed cadence until `shutdown` is notified
    pub async fn run(&mut self, ctx: &mut C, shutdown: Arc<Notify>) {
        info!(
            "Starting alarm scheduler: {} alarms, {}ms poll",
            self.store.count(),
            self.poll_interval.as_millis()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.poll(ctx);
                    if !outcome.fired().is_empty() {
                        info!("Alarms fired: {:?}", outcome.fired());
                    }
                }
                _ = shutdown.notified() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Alarm scheduler stopped");
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::SystemAlarmSpec;
    use crate::types::{DayMask, TimeField};
    use chrono::{TimeZone, Utc};

    fn record(ctx: &mut Vec<u16>, p: u16) {
        ctx.push(p);
    }

    // 2024-01-01 is a Monday
    fn monday(hour: u32, minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_poll_skipped_without_clock() {
        let mut store: AlarmStore<Vec<u16>> = AlarmStore::default();
        store.add_member(SystemAlarmSpec::every(1), record).unwrap();
        let mut ctx = Vec::new();

        let outcome = poll_at(&mut store, None, &mut ctx);
        assert!(outcome.is_skipped());
        assert!(ctx.is_empty());
        assert!(store.get(0).unwrap().cache().is_never_fired());
    }

    #[test]
    fn test_disabled_and_wrong_day_skip() {
        let mut store: AlarmStore<Vec<u16>> = AlarmStore::default();
        let at_eight = SystemAlarmSpec::new(DayMask::ALL, TimeField::At(8), TimeField::At(0));
        store.add_member(at_eight.enabled(false), record).unwrap();
        store
            .add_member(
                SystemAlarmSpec::new(DayMask::TUESDAY, TimeField::At(8), TimeField::At(0)),
                record,
            )
            .unwrap();

        let now = WallClockTime::from_datetime(&monday(8, 0));
        let mut ctx = Vec::new();
        assert!(poll_at(&mut store, Some(now), &mut ctx).fired().is_empty());
    }

    #[test]
    fn test_alarms_fire_in_index_order_independently() {
        let mut store: AlarmStore<Vec<u16>> = AlarmStore::default();
        let spec = SystemAlarmSpec::new(DayMask::ALL, TimeField::Any, TimeField::At(0));
        store.add_member(spec.parameter(1), record).unwrap();
        store.add_member(spec.parameter(2), record).unwrap();
        store.add_member(spec.parameter(3).enabled(false), record).unwrap();
        store.add_member(spec.parameter(4), record).unwrap();

        let mut ctx = Vec::new();
        let outcome = poll_at(&mut store, Some(WallClockTime::from_datetime(&monday(5, 0))), &mut ctx);
        assert_eq!(outcome.fired(), &[0, 1, 3]);
        assert_eq!(ctx, vec![1, 2, 4]);
    }

    #[test]
    fn test_backward_step_does_not_refire_window() {
        let clock = Arc::new(ManualClock::at(monday(9, 0)));
        let mut store: AlarmStore<Vec<u16>> = AlarmStore::default();
        store
            .add_member(
                SystemAlarmSpec::new(DayMask::ALL, TimeField::At(9), TimeField::At(0)),
                record,
            )
            .unwrap();
        let mut scheduler = AlarmScheduler::new(store, clock.clone());
        let mut ctx = Vec::new();

        assert_eq!(scheduler.poll(&mut ctx).fired(), &[0]);

        clock.advance_minutes(3);
        assert!(scheduler.poll(&mut ctx).fired().is_empty());

        // Stepped back into the 09:00 minute, already fired today
        clock.set(monday(9, 0) + chrono::TimeDelta::seconds(10));
        assert!(scheduler.poll(&mut ctx).fired().is_empty());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_interval_keeps_anchor_after_backward_step() {
        let clock = Arc::new(ManualClock::at(monday(8, 0)));
        let mut store: AlarmStore<Vec<u16>> = AlarmStore::default();
        store
            .add_member(
                SystemAlarmSpec::new(DayMask::ALL, TimeField::At(8), TimeField::At(0))
                    .interval(30),
                record,
            )
            .unwrap();
        let mut scheduler = AlarmScheduler::new(store, clock.clone());
        let mut ctx = Vec::new();

        assert_eq!(scheduler.poll(&mut ctx).fired(), &[0]);
        clock.set(monday(8, 30));
        assert_eq!(scheduler.poll(&mut ctx).fired(), &[0]);

        clock.set(monday(8, 35));
        assert!(scheduler.poll(&mut ctx).fired().is_empty());
        clock.set(monday(8, 31));
        assert!(scheduler.poll(&mut ctx).fired().is_empty());

        // Elapsed time from the 08:30 fire still drives the next ones
        let mut fired_at = Vec::new();
        for half_hours in 0..30u32 {
            let minutes = 9 * 60 + half_hours * 30;
            clock.set(monday(minutes / 60, minutes % 60));
            if !scheduler.poll(&mut ctx).fired().is_empty() {
                fired_at.push((minutes / 60, minutes % 60));
            }
        }
        assert_eq!(fired_at.len(), 30);
        assert_eq!(fired_at[0], (9, 0));
        assert_eq!(fired_at[29], (23, 30));
        assert_eq!(ctx.len(), 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::at(monday(12, 0)));
        let mut store: AlarmStore<Vec<u16>> = AlarmStore::default();
        store
            .add_member(SystemAlarmSpec::every(1).parameter(9), record)
            .unwrap();
        let mut scheduler =
            AlarmScheduler::new(store, clock).with_poll_interval(Duration::from_millis(10));

        let shutdown = Arc::new(Notify::new());
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            trigger.notify_one();
        });

        let mut ctx = Vec::new();
        scheduler.run(&mut ctx, shutdown).await;

        // Wildcard interval alarm anchors on the first tick only
        assert_eq!(ctx, vec![9]);
    }
}
